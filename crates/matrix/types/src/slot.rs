//! Matrix slots: fixed positions in the shared ternary placement tree
//!
//! Each member occupies exactly one slot. The placement ancestor can
//! differ from the direct sponsor after spillover; reward attribution
//! follows the placement chain, so both references are kept.

use crate::member::MemberKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum children under one placement ancestor
pub const MAX_MATRIX_CHILDREN: usize = 3;

/// One of the three child slots under a placement ancestor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    First,
    Second,
    Third,
}

impl Position {
    /// 1-based slot index
    pub fn index(&self) -> u8 {
        match self {
            Position::First => 1,
            Position::Second => 2,
            Position::Third => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Position::First),
            2 => Some(Position::Second),
            3 => Some(Position::Third),
            _ => None,
        }
    }

    /// All positions in fill order
    pub fn all() -> [Position; MAX_MATRIX_CHILDREN] {
        [Position::First, Position::Second, Position::Third]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// A member's fixed position in the global matrix
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixSlot {
    /// The placed member
    pub member: MemberKey,
    /// Who introduced the member (reward attribution reference)
    pub direct_sponsor: MemberKey,
    /// The matrix node actually placed under; `None` only for the root
    pub placement_ancestor: Option<MemberKey>,
    /// Child slot under the placement ancestor; `None` only for the root
    pub position: Option<Position>,
    /// Placement landed under a deeper ancestor than the sponsor
    pub spillover: bool,
    /// When the slot was written
    pub joined_at: DateTime<Utc>,
}

impl MatrixSlot {
    /// Create a slot attached under `ancestor` at `position`
    pub fn new(
        member: MemberKey,
        direct_sponsor: MemberKey,
        ancestor: MemberKey,
        position: Position,
    ) -> Self {
        let spillover = ancestor != direct_sponsor;
        Self {
            member,
            direct_sponsor,
            placement_ancestor: Some(ancestor),
            position: Some(position),
            spillover,
            joined_at: Utc::now(),
        }
    }

    /// Create the parentless root slot
    pub fn root(member: MemberKey) -> Self {
        Self {
            direct_sponsor: member.clone(),
            member,
            placement_ancestor: None,
            position: None,
            spillover: false,
            joined_at: Utc::now(),
        }
    }

    pub fn with_joined_at(mut self, at: DateTime<Utc>) -> Self {
        self.joined_at = at;
        self
    }

    pub fn is_root(&self) -> bool {
        self.placement_ancestor.is_none()
    }
}
