use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Produces a fresh seed for runs where the admin did not supply one.
pub fn generate_seed() -> u64 {
    OsRng.next_u64()
}

/// Seeded Fisher-Yates shuffle.
///
/// The same `(items, seed)` pair yields the same order on every platform: the
/// ChaCha8 stream is fully specified and indices are drawn as `u64`, never as
/// pointer-width integers.
pub fn shuffle<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ordered = items.to_vec();

    for i in (1..ordered.len()).rev() {
        let j = rng.gen_range(0..=i as u64) as usize;
        ordered.swap(i, j);
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<u64> {
        (1..=n).collect()
    }

    #[test]
    fn same_seed_same_order() {
        let input = ids(25);
        assert_eq!(shuffle(&input, 42), shuffle(&input, 42));
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let input = ids(40);
        let mut output = shuffle(&input, 7);
        output.sort_unstable();
        assert_eq!(output, input);
    }

    #[test]
    fn different_seeds_usually_differ() {
        let input = ids(30);
        let distinct = (0..8u64)
            .map(|seed| shuffle(&input, seed))
            .collect::<std::collections::HashSet<_>>();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn recorded_seeds_keep_their_order() {
        let input = ids(10);
        assert_eq!(shuffle(&input, 42), vec![1, 7, 4, 8, 9, 5, 6, 3, 2, 10]);
        assert_eq!(shuffle(&input, 7), vec![6, 7, 1, 5, 3, 9, 8, 4, 10, 2]);
        assert_eq!(shuffle(&input, 0), vec![3, 2, 10, 6, 9, 4, 7, 1, 5, 8]);
    }

    /// Forty items consume more than one ChaCha block buffer.
    #[test]
    fn recorded_seed_across_block_refill() {
        assert_eq!(
            shuffle(&ids(40), 2025),
            vec![
                9, 16, 13, 20, 2, 23, 18, 32, 24, 27, 4, 33, 12, 7, 34, 15, 28, 5, 26, 8, 35, 19,
                21, 29, 1, 25, 17, 38, 37, 14, 40, 39, 31, 6, 10, 36, 3, 11, 30, 22,
            ]
        );
    }

    #[test]
    fn handles_trivial_inputs() {
        assert!(shuffle::<u64>(&[], 1).is_empty());
        assert_eq!(shuffle(&[9u64], 1), vec![9]);
    }
}
