//! Matrix domain types
//!
//! Pure data structures for the tiered membership matrix: member identity
//! and directory records, ternary placement slots, sponsorship-layer
//! snapshots, reward records with their lifecycle, and the data-driven
//! per-level reward rule table. No I/O lives here; the engine crate owns
//! storage and orchestration.

mod error;
mod layer;
mod member;
mod reward;
mod rules;
mod slot;

pub use error::{MatrixError, MatrixResult};
pub use layer::{LayerSnapshot, MAX_LAYER_DEPTH};
pub use member::{MemberKey, MemberRecord};
pub use reward::{Amount, RewardId, RewardKey, RewardRecord, RewardStatus};
pub use rules::{LevelRule, LevelSchedule, SequenceRule};
pub use slot::{MatrixSlot, Position, MAX_MATRIX_CHILDREN};
