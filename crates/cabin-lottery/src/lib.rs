//! Cabin lottery: snake-draft allocation of vacation periods and apartments.

pub mod config;
pub mod error;
pub mod lottery;
pub mod telemetry;

pub use error::AppError;
pub use lottery::{
    lottery_router, CabinLotteryService, DrawingResult, DrawingStatus, InMemoryLotteryStore,
    LotteryError,
};
