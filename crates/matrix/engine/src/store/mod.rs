//! Persistence traits for the matrix engine
//!
//! Three stores back the engine: the matrix tree, the layer snapshot
//! cache, and the reward ledger. The traits are written against the
//! concurrency contract the engine needs — `try_attach` serializes the
//! capacity check with the slot write per ancestor, `try_insert` enforces
//! the reward idempotency key, and the ledger transitions are
//! compare-and-swap on status.

mod memory;

pub use memory::{InMemoryLayerStore, InMemoryMatrixStore, InMemoryRewardLedger};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matrix_types::{LayerSnapshot, MatrixResult, MatrixSlot, MemberKey, RewardId, RewardRecord, RewardStatus};

/// Outcome of a conditional attach attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Slot written; the member now occupies it
    Attached(MatrixSlot),
    /// The ancestor already has three children; caller must pick another
    AncestorFull,
}

/// The global ternary placement tree
#[async_trait]
pub trait MatrixStore: Send + Sync {
    /// Fetch a member's slot
    async fn slot(&self, member: &MemberKey) -> MatrixResult<Option<MatrixSlot>>;

    /// Children of an ancestor, position-ordered
    async fn children(&self, ancestor: &MemberKey) -> MatrixResult<Vec<MemberKey>>;

    /// All placed members in join order (spillover scan order)
    async fn members_by_join_order(&self) -> MatrixResult<Vec<MemberKey>>;

    /// Write the parentless root slot; fails if the member is placed
    async fn insert_root(&self, slot: MatrixSlot) -> MatrixResult<()>;

    /// Atomically attach `member` under `ancestor` at its next free
    /// position. The capacity check and the slot write are one unit;
    /// losing a race for the last position yields `AncestorFull`, never
    /// a fourth child. Fails with `MemberAlreadyPlaced` if the member
    /// already holds a slot.
    async fn try_attach(
        &self,
        member: MemberKey,
        direct_sponsor: MemberKey,
        ancestor: MemberKey,
    ) -> MatrixResult<AttachOutcome>;

    /// Number of placed members
    async fn len(&self) -> MatrixResult<usize>;
}

/// Cache of derived sponsorship-layer snapshots
#[async_trait]
pub trait LayerStore: Send + Sync {
    /// Overwrite a member's snapshots wholesale
    async fn replace_layers(
        &self,
        member: &MemberKey,
        layers: Vec<LayerSnapshot>,
    ) -> MatrixResult<()>;

    /// All stored snapshots for a member, layer-ordered
    async fn layers(&self, member: &MemberKey) -> MatrixResult<Vec<LayerSnapshot>>;

    /// A single layer snapshot
    async fn layer(&self, member: &MemberKey, layer: u8) -> MatrixResult<Option<LayerSnapshot>>;
}

/// Append-mostly reward ledger with CAS status transitions
#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Insert a record, unique on its `RewardKey`; duplicates fail with
    /// `DuplicateReward` and leave the ledger untouched.
    async fn try_insert(&self, record: RewardRecord) -> MatrixResult<RewardRecord>;

    /// Fetch one record
    async fn reward(&self, id: &RewardId) -> MatrixResult<Option<RewardRecord>>;

    /// Records for a recipient, newest first, optionally status-filtered
    async fn rewards_for(
        &self,
        recipient: &MemberKey,
        status: Option<RewardStatus>,
    ) -> MatrixResult<Vec<RewardRecord>>;

    /// Pending records whose countdown lapsed before `now`
    async fn pending_expired(&self, now: DateTime<Utc>) -> MatrixResult<Vec<RewardRecord>>;

    /// How many rewards (any status) a recipient has been issued for a
    /// given trigger level; drives the level-1 sequence rule
    async fn count_level_triggers(
        &self,
        recipient: &MemberKey,
        trigger_level: u8,
    ) -> MatrixResult<u32>;

    /// CAS pending -> claimable. `Ok(false)` when the record was no
    /// longer pending (lost race), which is not an error.
    async fn promote_to_claimable(&self, id: &RewardId) -> MatrixResult<bool>;

    /// claimable -> claimed; illegal states surface `InvalidTransition`
    async fn mark_claimed(&self, id: &RewardId, at: DateTime<Utc>) -> MatrixResult<RewardRecord>;

    /// CAS pending -> expired_redistributed, stamping the roll-up target.
    /// `Ok(false)` when the record was no longer pending.
    async fn expire_redistribute(
        &self,
        id: &RewardId,
        target: Option<MemberKey>,
    ) -> MatrixResult<bool>;
}
