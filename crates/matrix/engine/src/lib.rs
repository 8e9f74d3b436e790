//! Matrix placement & reward distribution engine
//!
//! The runtime for the tiered membership matrix: places each newly
//! activated member into the shared ternary tree (with deterministic
//! spillover), derives 19-layer downline snapshots from the sponsorship
//! graph, issues per-purchase rewards against a data-driven rule table,
//! and sweeps lapsed pending rewards up to the nearest qualified
//! ancestor.
//!
//! The engine is a library: it talks to a member directory and three
//! stores through async traits and never blocks on anything but store
//! I/O. In-memory store implementations are included for embedding and
//! tests.

mod chain;
mod config;
mod directory;
mod engine;
mod layers;
mod placement;
mod rewards;
mod store;
mod sweeper;

pub use config::EngineConfig;
pub use directory::{InMemoryDirectory, MemberDirectory};
pub use engine::MatrixEngine;
pub use layers::{LayerDeriver, TeamStats};
pub use placement::PlacementEngine;
pub use rewards::{RewardEngine, RewardSummary};
pub use store::{
    AttachOutcome, InMemoryLayerStore, InMemoryMatrixStore, InMemoryRewardLedger, LayerStore,
    MatrixStore, RewardLedger,
};
pub use sweeper::{ExpirySweeper, SweepOutcome};
