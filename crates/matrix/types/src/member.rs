//! Member identity and directory records
//!
//! A member is keyed by an address-like string, normalized to lowercase
//! at construction so lookups never depend on caller casing. The record
//! tracks activation, the growing set of owned membership levels, and
//! the immutable sponsor reference.

use crate::MAX_LAYER_DEPTH;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Case-normalized member identity key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberKey(String);

impl MemberKey {
    /// Create a key, lowercasing the raw address
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display form (first 10 chars)
    pub fn short(&self) -> String {
        self.0.chars().take(10).collect()
    }
}

impl std::fmt::Display for MemberKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Directory record for a single member
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Member identity
    pub key: MemberKey,
    /// Who introduced this member (immutable; `None` only for the seeded root)
    pub sponsor: Option<MemberKey>,
    /// Flips false -> true exactly once, on first level-1 purchase
    pub activated: bool,
    /// Highest owned level
    pub active_level: u8,
    /// Owned levels; only ever grows
    pub owned_levels: BTreeSet<u8>,
    /// When the member registered
    pub registered_at: DateTime<Utc>,
}

impl MemberRecord {
    /// Create an unactivated record sponsored by `sponsor`
    pub fn new(key: MemberKey, sponsor: MemberKey) -> Self {
        Self {
            key,
            sponsor: Some(sponsor),
            activated: false,
            active_level: 0,
            owned_levels: BTreeSet::new(),
            registered_at: Utc::now(),
        }
    }

    /// Create the sponsorless company root, pre-activated at the top level
    pub fn root(key: MemberKey) -> Self {
        Self {
            key,
            sponsor: None,
            activated: true,
            active_level: MAX_LAYER_DEPTH,
            owned_levels: (1..=MAX_LAYER_DEPTH).collect(),
            registered_at: Utc::now(),
        }
    }

    pub fn with_registered_at(mut self, at: DateTime<Utc>) -> Self {
        self.registered_at = at;
        self
    }

    pub fn owns_level(&self, level: u8) -> bool {
        self.owned_levels.contains(&level)
    }

    pub fn owns_level_at_least(&self, level: u8) -> bool {
        self.owned_levels.iter().any(|&owned| owned >= level)
    }

    /// Grant a level; idempotent, raises `active_level` when surpassed
    pub fn grant_level(&mut self, level: u8) {
        self.owned_levels.insert(level);
        if level > self.active_level {
            self.active_level = level;
        }
    }

    /// Mark activated; idempotent
    pub fn activate(&mut self) {
        self.activated = true;
    }
}
