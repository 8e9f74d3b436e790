//! In-memory store implementations
//!
//! DashMap-backed stores for embedding and tests. Atomicity comes from
//! the map entry guards: `try_attach` holds the ancestor's children
//! entry while it checks capacity and writes, and ledger transitions
//! mutate the record in place under its entry lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use matrix_types::{
    LayerSnapshot, MatrixError, MatrixResult, MatrixSlot, MemberKey, Position, RewardId, RewardKey,
    RewardRecord, RewardStatus, MAX_MATRIX_CHILDREN,
};
use std::sync::{Arc, Mutex};

use super::{AttachOutcome, LayerStore, MatrixStore, RewardLedger};

/// In-memory matrix tree
pub struct InMemoryMatrixStore {
    slots: Arc<DashMap<MemberKey, MatrixSlot>>,
    children: Arc<DashMap<MemberKey, Vec<MemberKey>>>,
    /// Insertion order; the canonical join order for spillover scans
    join_log: Arc<Mutex<Vec<MemberKey>>>,
}

impl InMemoryMatrixStore {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            children: Arc::new(DashMap::new()),
            join_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for InMemoryMatrixStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatrixStore for InMemoryMatrixStore {
    async fn slot(&self, member: &MemberKey) -> MatrixResult<Option<MatrixSlot>> {
        Ok(self.slots.get(member).map(|entry| entry.clone()))
    }

    async fn children(&self, ancestor: &MemberKey) -> MatrixResult<Vec<MemberKey>> {
        Ok(self
            .children
            .get(ancestor)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn members_by_join_order(&self) -> MatrixResult<Vec<MemberKey>> {
        Ok(self.join_log.lock().expect("join log poisoned").clone())
    }

    async fn insert_root(&self, slot: MatrixSlot) -> MatrixResult<()> {
        match self.slots.entry(slot.member.clone()) {
            Entry::Occupied(_) => Err(MatrixError::MemberAlreadyPlaced(slot.member)),
            Entry::Vacant(vacant) => {
                let member = slot.member.clone();
                vacant.insert(slot);
                self.join_log.lock().expect("join log poisoned").push(member);
                Ok(())
            }
        }
    }

    async fn try_attach(
        &self,
        member: MemberKey,
        direct_sponsor: MemberKey,
        ancestor: MemberKey,
    ) -> MatrixResult<AttachOutcome> {
        // The children entry guard serializes placements under this
        // ancestor: capacity check, position assignment, and slot write
        // happen while the entry is held.
        let mut siblings = self.children.entry(ancestor.clone()).or_default();
        if siblings.len() >= MAX_MATRIX_CHILDREN {
            return Ok(AttachOutcome::AncestorFull);
        }

        let position = Position::from_index(siblings.len() as u8 + 1)
            .ok_or_else(|| MatrixError::CapacityInvariantViolation(ancestor.clone()))?;
        let slot = MatrixSlot::new(member.clone(), direct_sponsor, ancestor, position);

        match self.slots.entry(member.clone()) {
            Entry::Occupied(_) => Err(MatrixError::MemberAlreadyPlaced(member)),
            Entry::Vacant(vacant) => {
                vacant.insert(slot.clone());
                siblings.push(member.clone());
                self.join_log.lock().expect("join log poisoned").push(member);
                Ok(AttachOutcome::Attached(slot))
            }
        }
    }

    async fn len(&self) -> MatrixResult<usize> {
        Ok(self.slots.len())
    }
}

/// In-memory layer snapshot cache
pub struct InMemoryLayerStore {
    layers: Arc<DashMap<MemberKey, Vec<LayerSnapshot>>>,
}

impl InMemoryLayerStore {
    pub fn new() -> Self {
        Self {
            layers: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryLayerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerStore for InMemoryLayerStore {
    async fn replace_layers(
        &self,
        member: &MemberKey,
        layers: Vec<LayerSnapshot>,
    ) -> MatrixResult<()> {
        self.layers.insert(member.clone(), layers);
        Ok(())
    }

    async fn layers(&self, member: &MemberKey) -> MatrixResult<Vec<LayerSnapshot>> {
        Ok(self
            .layers
            .get(member)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn layer(&self, member: &MemberKey, layer: u8) -> MatrixResult<Option<LayerSnapshot>> {
        Ok(self.layers.get(member).and_then(|snapshots| {
            snapshots
                .iter()
                .find(|snapshot| snapshot.layer == layer)
                .cloned()
        }))
    }
}

/// In-memory reward ledger
pub struct InMemoryRewardLedger {
    records: Arc<DashMap<RewardId, RewardRecord>>,
    by_key: Arc<DashMap<RewardKey, RewardId>>,
    by_recipient: Arc<DashMap<MemberKey, Vec<RewardId>>>,
}

impl InMemoryRewardLedger {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            by_key: Arc::new(DashMap::new()),
            by_recipient: Arc::new(DashMap::new()),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for InMemoryRewardLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RewardLedger for InMemoryRewardLedger {
    async fn try_insert(&self, record: RewardRecord) -> MatrixResult<RewardRecord> {
        // The idempotency index entry is the serialization point: the
        // first writer claims the key, later writers see it occupied.
        match self.by_key.entry(record.key()) {
            Entry::Occupied(_) => Err(MatrixError::DuplicateReward {
                source_member: record.source_member,
                level: record.trigger_level,
                recipient: record.recipient,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(record.id.clone());
                self.by_recipient
                    .entry(record.recipient.clone())
                    .or_default()
                    .push(record.id.clone());
                self.records.insert(record.id.clone(), record.clone());
                Ok(record)
            }
        }
    }

    async fn reward(&self, id: &RewardId) -> MatrixResult<Option<RewardRecord>> {
        Ok(self.records.get(id).map(|entry| entry.clone()))
    }

    async fn rewards_for(
        &self,
        recipient: &MemberKey,
        status: Option<RewardStatus>,
    ) -> MatrixResult<Vec<RewardRecord>> {
        let ids = self
            .by_recipient
            .get(recipient)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        let mut rewards: Vec<RewardRecord> = ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|entry| entry.clone()))
            .filter(|record| status.map(|wanted| record.status == wanted).unwrap_or(true))
            .collect();
        rewards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rewards)
    }

    async fn pending_expired(&self, now: DateTime<Utc>) -> MatrixResult<Vec<RewardRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn count_level_triggers(
        &self,
        recipient: &MemberKey,
        trigger_level: u8,
    ) -> MatrixResult<u32> {
        let ids = self
            .by_recipient
            .get(recipient)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|record| record.trigger_level == trigger_level)
            .count() as u32)
    }

    async fn promote_to_claimable(&self, id: &RewardId) -> MatrixResult<bool> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| MatrixError::RewardNotFound(id.clone()))?;
        if entry.status != RewardStatus::Pending {
            return Ok(false);
        }
        entry.mark_claimable()?;
        Ok(true)
    }

    async fn mark_claimed(&self, id: &RewardId, at: DateTime<Utc>) -> MatrixResult<RewardRecord> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| MatrixError::RewardNotFound(id.clone()))?;
        entry.mark_claimed(at)?;
        Ok(entry.clone())
    }

    async fn expire_redistribute(
        &self,
        id: &RewardId,
        target: Option<MemberKey>,
    ) -> MatrixResult<bool> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| MatrixError::RewardNotFound(id.clone()))?;
        if entry.status != RewardStatus::Pending {
            return Ok(false);
        }
        entry.mark_redistributed(target)?;
        Ok(true)
    }
}
