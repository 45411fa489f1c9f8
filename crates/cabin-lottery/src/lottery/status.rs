use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawingStatus {
    /// Admin is still editing; invisible to participants.
    Draft,
    /// Accepting wishes.
    Open,
    /// Wishes frozen, ready to draw.
    Locked,
    /// At least one execution exists, none published.
    Drawn,
    /// One execution is the official result.
    Published,
}

impl DrawingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Open => "OPEN",
            Self::Locked => "LOCKED",
            Self::Drawn => "DRAWN",
            Self::Published => "PUBLISHED",
        }
    }

    /// Resolves the status after `action`, or `None` when the action is illegal here.
    ///
    /// This is the only place lifecycle rules live. Gate-only actions such as
    /// `SubmitWishes` map a legal status onto itself.
    pub const fn next(self, action: DrawingAction) -> Option<DrawingStatus> {
        use DrawingAction as A;
        use DrawingStatus as S;

        match (action, self) {
            (A::Open, S::Draft) => Some(S::Open),
            (A::Lock, S::Open) => Some(S::Locked),
            (A::Unlock, S::Locked) => Some(S::Open),
            (A::RevertToDraft, S::Open | S::Locked | S::Drawn | S::Published) => Some(S::Draft),
            (A::RevertToLocked, S::Drawn | S::Published) => Some(S::Locked),
            (A::Draw, S::Locked | S::Drawn) => Some(S::Drawn),
            (A::Publish, S::Drawn) => Some(S::Published),
            (A::SubmitWishes, S::Open) => Some(S::Open),
            (A::EditPeriods, S::Draft | S::Open) => Some(self),
            _ => None,
        }
    }

    pub fn apply(self, action: DrawingAction) -> Result<DrawingStatus, StateConflict> {
        self.next(action).ok_or(StateConflict {
            action,
            status: self,
        })
    }

    pub const fn permits(self, action: DrawingAction) -> bool {
        self.next(action).is_some()
    }
}

impl fmt::Display for DrawingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything that is gated by the drawing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingAction {
    Open,
    Lock,
    Unlock,
    RevertToDraft,
    RevertToLocked,
    Draw,
    Publish,
    SubmitWishes,
    EditPeriods,
}

impl DrawingAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::RevertToDraft => "revert to draft",
            Self::RevertToLocked => "revert to locked",
            Self::Draw => "draw",
            Self::Publish => "publish",
            Self::SubmitWishes => "submit wishes",
            Self::EditPeriods => "edit periods",
        }
    }
}

/// Raised when an action is attempted in a status that forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} while drawing is {status}", action.label())]
pub struct StateConflict {
    pub action: DrawingAction,
    pub status: DrawingStatus,
}
