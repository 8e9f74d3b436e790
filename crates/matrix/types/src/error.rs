//! Error types for the matrix engine

use crate::member::MemberKey;
use crate::reward::RewardId;
use thiserror::Error;

/// Errors surfaced by matrix operations
#[derive(Debug, Clone, Error)]
pub enum MatrixError {
    /// Referenced member is absent from the directory
    #[error("unknown member: {0}")]
    UnknownMember(MemberKey),

    /// Referenced sponsor is absent from the directory
    #[error("unknown sponsor: {0}")]
    UnknownSponsor(MemberKey),

    /// Member already occupies a matrix slot
    #[error("member already placed: {0}")]
    MemberAlreadyPlaced(MemberKey),

    /// Member already registered in the directory
    #[error("member already registered: {0}")]
    MemberAlreadyRegistered(MemberKey),

    /// A reward with the same (source, level, recipient) key exists
    #[error("duplicate reward for source {source_member} level {level} recipient {recipient}")]
    DuplicateReward {
        source_member: MemberKey,
        level: u8,
        recipient: MemberKey,
    },

    /// Reward record not found
    #[error("reward not found: {0}")]
    RewardNotFound(RewardId),

    /// Claim attempted by someone other than the recipient
    #[error("member {claimer} is not the recipient of reward {reward}")]
    NotRewardRecipient { reward: RewardId, claimer: MemberKey },

    /// Level outside the configured schedule
    #[error("invalid membership level: {0}")]
    InvalidLevel(u8),

    /// Level schedule failed validation
    #[error("invalid level schedule: {0}")]
    InvalidSchedule(String),

    /// Illegal reward lifecycle transition
    #[error("reward {reward}: illegal transition {from} -> {to}")]
    InvalidTransition {
        reward: RewardId,
        from: String,
        to: String,
    },

    /// A placement ancestor exceeded three children; concurrency bug
    #[error("capacity invariant violated under {0}")]
    CapacityInvariantViolation(MemberKey),
}

/// Result type for matrix operations
pub type MatrixResult<T> = Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MatrixError::UnknownSponsor(MemberKey::new("0xAB"));
        assert_eq!(err.to_string(), "unknown sponsor: 0xab");

        let err = MatrixError::InvalidLevel(42);
        assert_eq!(err.to_string(), "invalid membership level: 42");

        let err = MatrixError::DuplicateReward {
            source_member: MemberKey::new("0xs"),
            level: 2,
            recipient: MemberKey::new("0xr"),
        };
        assert!(err.to_string().contains("level 2"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MatrixError>();
    }
}
