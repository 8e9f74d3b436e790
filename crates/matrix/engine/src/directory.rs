//! Member directory collaborator
//!
//! The directory is the authoritative store of member identity, activation
//! status, and owned levels. The engine reads qualification data from it
//! and writes back activation and level-ownership changes; everything else
//! about members belongs to the surrounding application.

use async_trait::async_trait;
use dashmap::DashMap;
use matrix_types::{MatrixError, MatrixResult, MemberKey, MemberRecord};
use std::sync::Arc;

/// Read/write surface the engine needs from the member directory
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Fetch one member record
    async fn member(&self, key: &MemberKey) -> MatrixResult<Option<MemberRecord>>;

    /// Members directly sponsored by `key`, in registration order
    async fn direct_referrals(&self, key: &MemberKey) -> MatrixResult<Vec<MemberKey>>;

    /// Register a new member; fails on duplicates
    async fn register(&self, record: MemberRecord) -> MatrixResult<()>;

    /// Flip the activation flag (idempotent)
    async fn record_activation(&self, key: &MemberKey) -> MatrixResult<()>;

    /// Add an owned level (idempotent)
    async fn grant_level(&self, key: &MemberKey, level: u8) -> MatrixResult<()>;
}

/// In-memory directory for embedding and tests
pub struct InMemoryDirectory {
    members: Arc<DashMap<MemberKey, MemberRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            members: Arc::new(DashMap::new()),
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemberDirectory for InMemoryDirectory {
    async fn member(&self, key: &MemberKey) -> MatrixResult<Option<MemberRecord>> {
        Ok(self.members.get(key).map(|entry| entry.clone()))
    }

    async fn direct_referrals(&self, key: &MemberKey) -> MatrixResult<Vec<MemberKey>> {
        let mut referrals: Vec<MemberRecord> = self
            .members
            .iter()
            .filter(|entry| entry.sponsor.as_ref() == Some(key))
            .map(|entry| entry.clone())
            .collect();
        referrals.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(referrals.into_iter().map(|record| record.key).collect())
    }

    async fn register(&self, record: MemberRecord) -> MatrixResult<()> {
        use dashmap::mapref::entry::Entry;
        match self.members.entry(record.key.clone()) {
            Entry::Occupied(_) => Err(MatrixError::MemberAlreadyRegistered(record.key)),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
        }
    }

    async fn record_activation(&self, key: &MemberKey) -> MatrixResult<()> {
        let mut entry = self
            .members
            .get_mut(key)
            .ok_or_else(|| MatrixError::UnknownMember(key.clone()))?;
        entry.activate();
        Ok(())
    }

    async fn grant_level(&self, key: &MemberKey, level: u8) -> MatrixResult<()> {
        let mut entry = self
            .members
            .get_mut(key)
            .ok_or_else(|| MatrixError::UnknownMember(key.clone()))?;
        entry.grant_level(level);
        Ok(())
    }
}
