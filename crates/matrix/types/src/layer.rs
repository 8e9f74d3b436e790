//! Layer snapshots: cached downline views of the sponsorship graph
//!
//! Layers count depth in the direct-referral graph, not the matrix tree.
//! Snapshots are recomputed wholesale and overwritten per (member, layer);
//! they are never patched incrementally.

use crate::member::MemberKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deepest layer tracked in the sponsorship graph
pub const MAX_LAYER_DEPTH: u8 = 19;

/// Cached set of descendants at one sponsorship-graph depth
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    /// Whose downline this is
    pub member: MemberKey,
    /// Depth in the sponsorship graph, 1..=19
    pub layer: u8,
    /// Descendant members at exactly this depth
    pub members: Vec<MemberKey>,
    /// When the snapshot was computed
    pub computed_at: DateTime<Utc>,
}

impl LayerSnapshot {
    pub fn new(member: MemberKey, layer: u8, members: Vec<MemberKey>) -> Self {
        Self {
            member,
            layer,
            members,
            computed_at: Utc::now(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Theoretical ternary capacity of this layer (3^layer)
    pub fn capacity(&self) -> u64 {
        3u64.saturating_pow(self.layer as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_count() {
        let snapshot = LayerSnapshot::new(
            MemberKey::new("0xroot"),
            1,
            vec![MemberKey::new("0xa"), MemberKey::new("0xb")],
        );
        assert_eq!(snapshot.member_count(), 2);
    }

    #[test]
    fn test_layer_capacity() {
        let root = MemberKey::new("0xroot");
        assert_eq!(LayerSnapshot::new(root.clone(), 1, vec![]).capacity(), 3);
        assert_eq!(LayerSnapshot::new(root.clone(), 2, vec![]).capacity(), 9);
        assert_eq!(
            LayerSnapshot::new(root, MAX_LAYER_DEPTH, vec![]).capacity(),
            1_162_261_467
        );
    }
}
