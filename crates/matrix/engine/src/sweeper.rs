//! Expiry sweeper
//!
//! Walks the pending rewards whose countdown lapsed and settles each one:
//! a recipient who qualified since creation keeps the reward (promoted to
//! claimable), otherwise the amount rolls up to the nearest currently
//! qualified matrix ancestor, and with no such ancestor it is forfeited.
//! Every transition is a compare-and-swap on the pending status, so the
//! sweep can run concurrently with purchases and re-runs are no-ops.

use crate::chain::ancestor_chain;
use crate::config::EngineConfig;
use crate::directory::MemberDirectory;
use crate::store::{MatrixStore, RewardLedger};
use chrono::Utc;
use matrix_types::{MatrixError, MatrixResult, MemberKey, RewardRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counts from one sweep pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Expired records re-issued to a qualified ancestor
    pub reallocated: u32,
    /// Expired records with no qualified ancestor anywhere up the chain
    pub forfeited: u32,
    /// Recipients who qualified between the deadline and the sweep
    pub requalified: u32,
}

/// Settles lapsed pending rewards
pub struct ExpirySweeper {
    config: Arc<EngineConfig>,
    directory: Arc<dyn MemberDirectory>,
    matrix: Arc<dyn MatrixStore>,
    ledger: Arc<dyn RewardLedger>,
}

impl ExpirySweeper {
    pub fn new(
        config: Arc<EngineConfig>,
        directory: Arc<dyn MemberDirectory>,
        matrix: Arc<dyn MatrixStore>,
        ledger: Arc<dyn RewardLedger>,
    ) -> Self {
        Self {
            config,
            directory,
            matrix,
            ledger,
        }
    }

    /// One sweep pass over all lapsed pending records
    pub async fn sweep(&self) -> MatrixResult<SweepOutcome> {
        let now = Utc::now();
        let lapsed = self.ledger.pending_expired(now).await?;
        let mut outcome = SweepOutcome::default();

        for record in lapsed {
            // Qualification is re-evaluated now, not read from creation
            // time: a recipient who upgraded just in time keeps the reward.
            if self.recipient_qualifies_now(&record).await? {
                if self.ledger.promote_to_claimable(&record.id).await? {
                    outcome.requalified += 1;
                    info!(
                        reward = %record.id,
                        recipient = %record.recipient,
                        "lapsed reward kept, recipient qualified before sweep"
                    );
                }
                continue;
            }

            match self.nearest_qualified_ancestor(&record).await? {
                Some(ancestor) => {
                    // CAS first so a concurrent claimable flip wins
                    if !self
                        .ledger
                        .expire_redistribute(&record.id, Some(ancestor.clone()))
                        .await?
                    {
                        continue;
                    }
                    self.reissue(&record, &ancestor).await?;
                    outcome.reallocated += 1;
                }
                None => {
                    if self.ledger.expire_redistribute(&record.id, None).await? {
                        outcome.forfeited += 1;
                        info!(
                            reward = %record.id,
                            recipient = %record.recipient,
                            "reward forfeited, no qualified ancestor up to the root"
                        );
                    }
                }
            }
        }

        if outcome != SweepOutcome::default() {
            info!(
                reallocated = outcome.reallocated,
                forfeited = outcome.forfeited,
                requalified = outcome.requalified,
                "expiry sweep settled records"
            );
        }
        Ok(outcome)
    }

    /// Spawn a background task sweeping on a fixed period
    pub fn spawn_periodic(self: Arc<Self>, period: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = self.sweep().await {
                    warn!(%error, "expiry sweep failed, will retry next tick");
                }
            }
        })
    }

    async fn recipient_qualifies_now(&self, record: &RewardRecord) -> MatrixResult<bool> {
        Ok(self
            .directory
            .member(&record.recipient)
            .await?
            .map(|member| member.owns_level_at_least(record.required_level))
            .unwrap_or(false))
    }

    /// Nearest matrix ancestor of the original recipient who satisfies
    /// the record's qualification rule right now
    async fn nearest_qualified_ancestor(
        &self,
        record: &RewardRecord,
    ) -> MatrixResult<Option<MemberKey>> {
        let chain = ancestor_chain(
            self.matrix.as_ref(),
            &record.recipient,
            self.config.max_depth,
        )
        .await?;

        for ancestor in chain {
            let Some(member) = self.directory.member(&ancestor).await? else {
                continue;
            };
            if member.activated && member.owns_level_at_least(record.required_level) {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    /// Issue the replacement record: immediately claimable, no countdown
    async fn reissue(&self, expired: &RewardRecord, ancestor: &MemberKey) -> MatrixResult<()> {
        let replacement = RewardRecord::claimable(
            ancestor.clone(),
            expired.source_member.clone(),
            expired.trigger_level,
            expired.required_level,
            expired.amount,
        );

        match self.ledger.try_insert(replacement).await {
            Ok(reissued) => {
                info!(
                    original = %expired.id,
                    reward = %reissued.id,
                    from = %expired.recipient,
                    to = %ancestor,
                    amount = %reissued.amount,
                    "expired reward rolled up"
                );
                Ok(())
            }
            // The ancestor already holds a reward for this purchase event
            Err(MatrixError::DuplicateReward { .. }) => {
                debug!(
                    original = %expired.id,
                    to = %ancestor,
                    "roll-up target already rewarded for this purchase"
                );
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}
