//! Reward engine
//!
//! Turns a level purchase into at most one reward record for the ancestor
//! the rule table names. Qualified recipients get a claimable record;
//! unqualified ones get a pending record with a countdown, which the
//! expiry sweeper later rolls up. Issuance is idempotent on
//! (source, trigger level, recipient), so purchase retries never
//! double-pay.

use crate::chain::ancestor_at_depth;
use crate::config::EngineConfig;
use crate::directory::MemberDirectory;
use crate::store::{MatrixStore, RewardLedger};
use chrono::Utc;
use matrix_types::{
    Amount, MatrixError, MatrixResult, MemberKey, MemberRecord, RewardId, RewardRecord,
    RewardStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-status totals for one recipient
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSummary {
    pub pending_amount: Amount,
    pub claimable_amount: Amount,
    pub claimed_amount: Amount,
    pub pending_count: usize,
    pub claimable_count: usize,
    pub claimed_count: usize,
    pub redistributed_count: usize,
}

/// Creates and settles reward records
pub struct RewardEngine {
    config: Arc<EngineConfig>,
    directory: Arc<dyn MemberDirectory>,
    matrix: Arc<dyn MatrixStore>,
    ledger: Arc<dyn RewardLedger>,
}

impl RewardEngine {
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

    /// Handle one successful level purchase
    pub async fn on_level_purchase(
        &self,
        member: &MemberKey,
        level: u8,
    ) -> MatrixResult<Vec<RewardRecord>> {
        let rule = self.config.schedule.rule(level)?.clone();
        if self.directory.member(member).await?.is_none() {
            return Err(MatrixError::UnknownMember(member.clone()));
        }

        // Ownership lands in the directory first; level 1 is activation.
        self.directory.grant_level(member, level).await?;
        if level == 1 {
            self.directory.record_activation(member).await?;
            info!(member = %member, "member activated");
        }

        // The purchase may unlock rewards already parked on this member.
        let promoted = self.promote_pending(member).await?;
        if promoted > 0 {
            info!(member = %member, promoted, "pending rewards promoted on upgrade");
        }

        let Some(recipient) = ancestor_at_depth(
            self.matrix.as_ref(),
            member,
            rule.recipient_depth.min(self.config.max_depth),
        )
        .await?
        else {
            debug!(
                member = %member,
                level,
                depth = rule.recipient_depth,
                "ancestor chain ends before reward depth, no recipient"
            );
            return Ok(Vec::new());
        };

        let Some(recipient_record) = self.directory.member(&recipient).await? else {
            warn!(recipient = %recipient, "placed ancestor missing from directory");
            return Ok(Vec::new());
        };

        let required_level = self.required_level_for(&recipient, level).await?;
        let record = self.build_record(
            member,
            &recipient_record,
            level,
            required_level,
            rule.reward_amount,
        );

        match self.ledger.try_insert(record).await {
            Ok(inserted) => {
                info!(
                    recipient = %inserted.recipient,
                    source = %member,
                    level,
                    status = %inserted.status,
                    amount = %inserted.amount,
                    "reward issued"
                );
                Ok(vec![inserted])
            }
            Err(MatrixError::DuplicateReward { .. }) => {
                debug!(
                    recipient = %recipient,
                    source = %member,
                    level,
                    "reward already issued, ignoring retry"
                );
                Ok(Vec::new())
            }
            Err(other) => Err(other),
        }
    }

    /// Claim a claimable reward; balance crediting is the caller's job
    pub async fn claim(
        &self,
        reward_id: &RewardId,
        claimer: &MemberKey,
    ) -> MatrixResult<RewardRecord> {
        let record = self
            .ledger
            .reward(reward_id)
            .await?
            .ok_or_else(|| MatrixError::RewardNotFound(reward_id.clone()))?;
        if record.recipient != *claimer {
            return Err(MatrixError::NotRewardRecipient {
                reward: reward_id.clone(),
                claimer: claimer.clone(),
            });
        }

        let claimed = self.ledger.mark_claimed(reward_id, Utc::now()).await?;
        info!(
            reward = %reward_id,
            recipient = %claimer,
            amount = %claimed.amount,
            "reward claimed"
        );
        Ok(claimed)
    }

    /// Per-status totals for a recipient
    pub async fn summary(&self, recipient: &MemberKey) -> MatrixResult<RewardSummary> {
        let mut summary = RewardSummary::default();
        for record in self.ledger.rewards_for(recipient, None).await? {
            match record.status {
                RewardStatus::Pending => {
                    summary.pending_count += 1;
                    summary.pending_amount = summary.pending_amount.saturating_add(record.amount);
                }
                RewardStatus::Claimable => {
                    summary.claimable_count += 1;
                    summary.claimable_amount =
                        summary.claimable_amount.saturating_add(record.amount);
                }
                RewardStatus::Claimed => {
                    summary.claimed_count += 1;
                    summary.claimed_amount = summary.claimed_amount.saturating_add(record.amount);
                }
                RewardStatus::ExpiredRedistributed => summary.redistributed_count += 1,
            }
        }
        Ok(summary)
    }

    /// CAS-promote the member's pending rewards they now qualify for
    async fn promote_pending(&self, member: &MemberKey) -> MatrixResult<usize> {
        let Some(record) = self.directory.member(member).await? else {
            return Ok(0);
        };

        let mut promoted = 0;
        for pending in self
            .ledger
            .rewards_for(member, Some(RewardStatus::Pending))
            .await?
        {
            if record.owns_level_at_least(pending.required_level)
                && self.ledger.promote_to_claimable(&pending.id).await?
            {
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Required owned level for the next reward to this recipient. Level 1
    /// escalates by sequence position; other levels come off the rule row.
    async fn required_level_for(&self, recipient: &MemberKey, level: u8) -> MatrixResult<u8> {
        if level == 1 {
            let prior = self.ledger.count_level_triggers(recipient, 1).await?;
            Ok(self.config.sequence.required_level(prior))
        } else {
            Ok(self.config.schedule.rule(level)?.required_level)
        }
    }

    fn build_record(
        &self,
        source: &MemberKey,
        recipient: &MemberRecord,
        level: u8,
        required_level: u8,
        amount: Amount,
    ) -> RewardRecord {
        if recipient.owns_level_at_least(required_level) {
            RewardRecord::claimable(
                recipient.key.clone(),
                source.clone(),
                level,
                required_level,
                amount,
            )
        } else {
            RewardRecord::pending(
                recipient.key.clone(),
                source.clone(),
                level,
                required_level,
                amount,
                Utc::now() + self.config.pending_window(),
            )
        }
    }
}
