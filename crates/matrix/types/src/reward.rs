//! Reward records and their lifecycle
//!
//! A reward is issued to exactly one ancestor per purchase event. It is
//! either immediately claimable or pending behind a countdown; terminal
//! states are claimed and expired-redistributed, after which the record
//! is immutable. Records are never deleted.

use crate::error::{MatrixError, MatrixResult};
use crate::member::MemberKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// USDT amount in cents
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Amount(pub u64);

impl Amount {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn new(cents: u64) -> Self {
        Self(cents)
    }

    /// Construct from whole USDT
    pub fn from_usdt(usdt: u64) -> Self {
        Self(usdt * 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02} USDT", self.0 / 100, self.0 % 100)
    }
}

/// Unique reward record identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewardId(pub String);

impl RewardId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RewardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a reward record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewardStatus {
    /// Waiting on the recipient to qualify before the countdown lapses
    Pending,
    /// Qualified; waiting on the recipient's claim
    Claimable,
    /// Claimed by the recipient (terminal)
    Claimed,
    /// Countdown lapsed unqualified; rolled up or forfeited (terminal)
    ExpiredRedistributed,
}

impl RewardStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RewardStatus::Claimed | RewardStatus::ExpiredRedistributed
        )
    }
}

impl std::fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RewardStatus::Pending => "pending",
            RewardStatus::Claimable => "claimable",
            RewardStatus::Claimed => "claimed",
            RewardStatus::ExpiredRedistributed => "expired_redistributed",
        };
        write!(f, "{}", label)
    }
}

/// Idempotency key: one reward per (source, trigger level, recipient)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewardKey {
    pub source_member: MemberKey,
    pub trigger_level: u8,
    pub recipient: MemberKey,
}

/// One monetary reward flowing to one ancestor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub id: RewardId,
    /// Who the reward is for
    pub recipient: MemberKey,
    /// Whose purchase triggered it
    pub source_member: MemberKey,
    /// The purchased level that triggered it
    pub trigger_level: u8,
    /// Owned level the recipient must hold for this reward; fixed at
    /// creation (the level-1 sequence rule bakes its escalation in here)
    pub required_level: u8,
    pub amount: Amount,
    pub status: RewardStatus,
    /// Countdown deadline; set iff status is pending
    pub pending_until: Option<DateTime<Utc>>,
    /// Roll-up target; set iff expired with a redistribution
    pub redistributed_to: Option<MemberKey>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl RewardRecord {
    /// Create an immediately claimable reward
    pub fn claimable(
        recipient: MemberKey,
        source_member: MemberKey,
        trigger_level: u8,
        required_level: u8,
        amount: Amount,
    ) -> Self {
        Self {
            id: RewardId::generate(),
            recipient,
            source_member,
            trigger_level,
            required_level,
            amount,
            status: RewardStatus::Claimable,
            pending_until: None,
            redistributed_to: None,
            created_at: Utc::now(),
            claimed_at: None,
        }
    }

    /// Create a pending reward with a countdown deadline
    pub fn pending(
        recipient: MemberKey,
        source_member: MemberKey,
        trigger_level: u8,
        required_level: u8,
        amount: Amount,
        pending_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RewardId::generate(),
            recipient,
            source_member,
            trigger_level,
            required_level,
            amount,
            status: RewardStatus::Pending,
            pending_until: Some(pending_until),
            redistributed_to: None,
            created_at: Utc::now(),
            claimed_at: None,
        }
    }

    /// The idempotency key for this record
    pub fn key(&self) -> RewardKey {
        RewardKey {
            source_member: self.source_member.clone(),
            trigger_level: self.trigger_level,
            recipient: self.recipient.clone(),
        }
    }

    /// The countdown has lapsed relative to `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RewardStatus::Pending
            && self.pending_until.map(|until| until < now).unwrap_or(false)
    }

    /// pending -> claimable (recipient qualified in time or at sweep)
    pub fn mark_claimable(&mut self) -> MatrixResult<()> {
        self.expect_status(RewardStatus::Pending, RewardStatus::Claimable)?;
        self.status = RewardStatus::Claimable;
        self.pending_until = None;
        Ok(())
    }

    /// claimable -> claimed
    pub fn mark_claimed(&mut self, at: DateTime<Utc>) -> MatrixResult<()> {
        self.expect_status(RewardStatus::Claimable, RewardStatus::Claimed)?;
        self.status = RewardStatus::Claimed;
        self.claimed_at = Some(at);
        Ok(())
    }

    /// pending -> expired_redistributed, optionally stamping the roll-up target
    pub fn mark_redistributed(&mut self, target: Option<MemberKey>) -> MatrixResult<()> {
        self.expect_status(RewardStatus::Pending, RewardStatus::ExpiredRedistributed)?;
        self.status = RewardStatus::ExpiredRedistributed;
        self.pending_until = None;
        self.redistributed_to = target;
        Ok(())
    }

    fn expect_status(&self, expected: RewardStatus, target: RewardStatus) -> MatrixResult<()> {
        if self.status != expected {
            return Err(MatrixError::InvalidTransition {
                reward: self.id.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }
}
