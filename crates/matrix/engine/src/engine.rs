//! Engine facade
//!
//! Wires the directory, stores, and sub-engines together behind one
//! handle. Calling services go through this surface; the sub-engines
//! stay internal so the concurrency contract cannot be bypassed.

use crate::config::EngineConfig;
use crate::directory::{InMemoryDirectory, MemberDirectory};
use crate::layers::{LayerDeriver, TeamStats};
use crate::placement::PlacementEngine;
use crate::rewards::{RewardEngine, RewardSummary};
use crate::store::{
    InMemoryLayerStore, InMemoryMatrixStore, InMemoryRewardLedger, LayerStore, MatrixStore,
    RewardLedger,
};
use crate::sweeper::{ExpirySweeper, SweepOutcome};
use matrix_types::{
    LayerSnapshot, MatrixError, MatrixResult, MatrixSlot, MemberKey, MemberRecord, RewardId,
    RewardRecord, RewardStatus,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The matrix placement & reward distribution engine
pub struct MatrixEngine {
    directory: Arc<dyn MemberDirectory>,
    matrix: Arc<dyn MatrixStore>,
    layers_store: Arc<dyn LayerStore>,
    ledger: Arc<dyn RewardLedger>,
    placement: PlacementEngine,
    layers: LayerDeriver,
    rewards: RewardEngine,
    sweeper: Arc<ExpirySweeper>,
}

impl MatrixEngine {
    /// Assemble an engine over caller-provided collaborators
    pub fn new(
        config: EngineConfig,
        directory: Arc<dyn MemberDirectory>,
        matrix: Arc<dyn MatrixStore>,
        layers_store: Arc<dyn LayerStore>,
        ledger: Arc<dyn RewardLedger>,
    ) -> Self {
        let config = Arc::new(config);
        let placement = PlacementEngine::new(Arc::clone(&directory), Arc::clone(&matrix));
        let layers = LayerDeriver::new(
            Arc::clone(&config),
            Arc::clone(&directory),
            Arc::clone(&layers_store),
        );
        let rewards = RewardEngine::new(
            Arc::clone(&config),
            Arc::clone(&directory),
            Arc::clone(&matrix),
            Arc::clone(&ledger),
        );
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::clone(&config),
            Arc::clone(&directory),
            Arc::clone(&matrix),
            Arc::clone(&ledger),
        ));

        Self {
            directory,
            matrix,
            layers_store,
            ledger,
            placement,
            layers,
            rewards,
            sweeper,
        }
    }

    /// Engine over fresh in-memory stores; useful for tests and embedding
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemoryMatrixStore::new()),
            Arc::new(InMemoryLayerStore::new()),
            Arc::new(InMemoryRewardLedger::new()),
        )
    }

    // --- Member lifecycle ---

    /// Register a new member sponsored by an existing one
    pub async fn register_member(
        &self,
        member: &MemberKey,
        sponsor: &MemberKey,
    ) -> MatrixResult<MemberRecord> {
        if self.directory.member(sponsor).await?.is_none() {
            return Err(MatrixError::UnknownSponsor(sponsor.clone()));
        }
        let record = MemberRecord::new(member.clone(), sponsor.clone());
        self.directory.register(record.clone()).await?;
        Ok(record)
    }

    /// Seed the company root: directory record plus parentless matrix slot
    pub async fn seed_root(&self, member: &MemberKey) -> MatrixResult<MatrixSlot> {
        self.directory
            .register(MemberRecord::root(member.clone()))
            .await?;
        self.placement.seed_root(member).await
    }

    // --- Core operations ---

    /// Find and write a matrix slot for a newly activated member
    pub async fn place(
        &self,
        new_member: &MemberKey,
        sponsor: &MemberKey,
    ) -> MatrixResult<MatrixSlot> {
        self.placement.place(new_member, sponsor).await
    }

    /// Recompute a member's sponsorship layers
    pub async fn derive_layers(&self, member: &MemberKey) -> MatrixResult<Vec<LayerSnapshot>> {
        self.layers.derive_layers(member).await
    }

    /// Distribute rewards for one successful level purchase
    pub async fn on_level_purchase(
        &self,
        member: &MemberKey,
        level: u8,
    ) -> MatrixResult<Vec<RewardRecord>> {
        self.rewards.on_level_purchase(member, level).await
    }

    /// Claim a claimable reward
    pub async fn claim(
        &self,
        reward_id: &RewardId,
        claimer: &MemberKey,
    ) -> MatrixResult<RewardRecord> {
        self.rewards.claim(reward_id, claimer).await
    }

    /// Settle lapsed pending rewards once
    pub async fn sweep(&self) -> MatrixResult<SweepOutcome> {
        self.sweeper.sweep().await
    }

    /// Run the expiry sweep on a fixed period until the handle is dropped
    pub fn spawn_sweeper(&self, period: std::time::Duration) -> JoinHandle<()> {
        Arc::clone(&self.sweeper).spawn_periodic(period)
    }

    // --- Query accessors ---

    pub async fn member(&self, member: &MemberKey) -> MatrixResult<Option<MemberRecord>> {
        self.directory.member(member).await
    }

    pub async fn slot(&self, member: &MemberKey) -> MatrixResult<Option<MatrixSlot>> {
        self.matrix.slot(member).await
    }

    /// Stored layer snapshots (derive_layers refreshes them)
    pub async fn layers(&self, member: &MemberKey) -> MatrixResult<Vec<LayerSnapshot>> {
        self.layers_store.layers(member).await
    }

    pub async fn team_stats(&self, member: &MemberKey) -> MatrixResult<TeamStats> {
        self.layers.team_stats(member).await
    }

    pub async fn rewards(
        &self,
        recipient: &MemberKey,
        status: Option<RewardStatus>,
    ) -> MatrixResult<Vec<RewardRecord>> {
        self.ledger.rewards_for(recipient, status).await
    }

    pub async fn reward_summary(&self, recipient: &MemberKey) -> MatrixResult<RewardSummary> {
        self.rewards.summary(recipient).await
    }
}
