//! Layer deriver
//!
//! Materializes a member's downline as 19 layers of the sponsorship
//! graph. Derivation is a bounded breadth-first walk over direct-referral
//! edges; matrix spillover never moves anyone between layers. Snapshots
//! are replaced wholesale, and concurrent derivations for the same member
//! collapse onto one computation.

use crate::config::EngineConfig;
use crate::directory::MemberDirectory;
use crate::store::LayerStore;
use chrono::Utc;
use dashmap::DashMap;
use matrix_types::{LayerSnapshot, MatrixError, MatrixResult, MemberKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Aggregated downline counts for reporting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub member: MemberKey,
    /// Layer-1 size
    pub direct_referrals: usize,
    /// Total members across all stored layers
    pub total_team: usize,
    /// (layer, member count) for each non-empty layer
    pub layer_counts: Vec<(u8, usize)>,
}

/// Derives and caches sponsorship-layer snapshots
pub struct LayerDeriver {
    config: Arc<EngineConfig>,
    directory: Arc<dyn MemberDirectory>,
    layers: Arc<dyn LayerStore>,
    /// Per-member gate so concurrent derivations share one result
    in_flight: DashMap<MemberKey, Arc<Mutex<()>>>,
}

impl LayerDeriver {
    pub fn new(
        config: Arc<EngineConfig>,
        directory: Arc<dyn MemberDirectory>,
        layers: Arc<dyn LayerStore>,
    ) -> Self {
        Self {
            config,
            directory,
            layers,
            in_flight: DashMap::new(),
        }
    }

    /// Recompute a member's layers from the sponsorship graph
    pub async fn derive_layers(&self, member: &MemberKey) -> MatrixResult<Vec<LayerSnapshot>> {
        if self.directory.member(member).await?.is_none() {
            return Err(MatrixError::UnknownMember(member.clone()));
        }

        let started = Utc::now();
        let gate = {
            let entry = self.in_flight.entry(member.clone()).or_default();
            Arc::clone(entry.value())
        };
        let _guard = gate.lock().await;

        // A derivation that finished while we waited on the gate is fresh
        // enough to reuse; recomputing would only redo identical work.
        let existing = self.layers.layers(member).await?;
        if let Some(first) = existing.first() {
            if first.computed_at >= started {
                debug!(member = %member, "reusing layers computed by a concurrent caller");
                return Ok(existing);
            }
        }

        let snapshots = self.walk(member).await?;
        self.layers.replace_layers(member, snapshots.clone()).await?;

        info!(
            member = %member,
            layers = snapshots.len(),
            team = snapshots.iter().map(|s| s.member_count()).sum::<usize>(),
            "layers derived"
        );
        Ok(snapshots)
    }

    /// Stored layer snapshots, deriving once when none are cached
    pub async fn team_stats(&self, member: &MemberKey) -> MatrixResult<TeamStats> {
        if self.directory.member(member).await?.is_none() {
            return Err(MatrixError::UnknownMember(member.clone()));
        }

        let mut layers = self.layers.layers(member).await?;
        if layers.is_empty() {
            layers = self.derive_layers(member).await?;
        }

        let layer_counts: Vec<(u8, usize)> = layers
            .iter()
            .map(|snapshot| (snapshot.layer, snapshot.member_count()))
            .collect();
        Ok(TeamStats {
            member: member.clone(),
            direct_referrals: layers
                .iter()
                .find(|snapshot| snapshot.layer == 1)
                .map(|snapshot| snapshot.member_count())
                .unwrap_or(0),
            total_team: layers.iter().map(|snapshot| snapshot.member_count()).sum(),
            layer_counts,
        })
    }

    /// Breadth-first walk over direct-referral edges, bounded at 19 layers.
    /// The visited set guards against anomalies in the sponsorship graph
    /// double-counting a member across layers.
    async fn walk(&self, member: &MemberKey) -> MatrixResult<Vec<LayerSnapshot>> {
        let mut visited: HashSet<MemberKey> = HashSet::new();
        visited.insert(member.clone());

        let mut snapshots = Vec::new();
        let mut frontier: Vec<MemberKey> = Vec::new();
        for referral in self.directory.direct_referrals(member).await? {
            if visited.insert(referral.clone()) {
                frontier.push(referral);
            }
        }

        let mut layer = 1u8;
        while !frontier.is_empty() && layer <= self.config.max_depth {
            snapshots.push(LayerSnapshot::new(member.clone(), layer, frontier.clone()));

            let mut next = Vec::new();
            for parent in &frontier {
                for referral in self.directory.direct_referrals(parent).await? {
                    if visited.insert(referral.clone()) {
                        next.push(referral);
                    }
                }
            }
            frontier = next;
            layer += 1;
        }

        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::store::InMemoryLayerStore;
    use chrono::Duration;
    use matrix_types::MemberRecord;

    fn key(raw: &str) -> MemberKey {
        MemberKey::new(raw)
    }

    struct Fixture {
        directory: Arc<InMemoryDirectory>,
        store: Arc<InMemoryLayerStore>,
        deriver: Arc<LayerDeriver>,
    }

    async fn setup() -> Fixture {
        let directory = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemoryLayerStore::new());
        let deriver = Arc::new(LayerDeriver::new(
            Arc::new(EngineConfig::default()),
            Arc::clone(&directory) as Arc<dyn MemberDirectory>,
            Arc::clone(&store) as Arc<dyn LayerStore>,
        ));
        directory
            .register(MemberRecord::root(key("0xroot")))
            .await
            .unwrap();
        Fixture {
            directory,
            store,
            deriver,
        }
    }

    async fn sponsor_chain(fixture: &Fixture, pairs: &[(&str, &str)]) {
        let base = Utc::now();
        for (idx, (member, sponsor)) in pairs.iter().enumerate() {
            fixture
                .directory
                .register(
                    MemberRecord::new(key(member), key(sponsor))
                        .with_registered_at(base + Duration::seconds(idx as i64)),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_layers_follow_sponsorship_not_matrix() {
        let fixture = setup().await;
        // root sponsors a and b; a sponsors c; c sponsors d
        sponsor_chain(
            &fixture,
            &[
                ("0xa", "0xroot"),
                ("0xb", "0xroot"),
                ("0xc", "0xa"),
                ("0xd", "0xc"),
            ],
        )
        .await;

        let layers = fixture.deriver.derive_layers(&key("0xroot")).await.unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].members, vec![key("0xa"), key("0xb")]);
        assert_eq!(layers[1].members, vec![key("0xc")]);
        assert_eq!(layers[2].members, vec![key("0xd")]);
    }

    #[tokio::test]
    async fn test_layer_union_is_reachable_set_without_duplicates() {
        let fixture = setup().await;
        sponsor_chain(
            &fixture,
            &[
                ("0xa", "0xroot"),
                ("0xb", "0xroot"),
                ("0xc", "0xa"),
                ("0xd", "0xa"),
                ("0xe", "0xb"),
                ("0xf", "0xe"),
            ],
        )
        .await;

        let layers = fixture.deriver.derive_layers(&key("0xroot")).await.unwrap();
        let mut all: Vec<MemberKey> = layers
            .iter()
            .flat_map(|snapshot| snapshot.members.clone())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total, "a member appeared in two layers");
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_unknown_member_rejected() {
        let fixture = setup().await;
        let result = fixture.deriver.derive_layers(&key("0xghost")).await;
        assert!(matches!(result, Err(MatrixError::UnknownMember(_))));
    }

    #[tokio::test]
    async fn test_snapshots_overwritten_wholesale() {
        let fixture = setup().await;
        sponsor_chain(&fixture, &[("0xa", "0xroot"), ("0xb", "0xa")]).await;

        fixture.deriver.derive_layers(&key("0xroot")).await.unwrap();
        assert_eq!(fixture.store.layers(&key("0xroot")).await.unwrap().len(), 2);

        // Stale snapshot rows from a previous shape must not linger
        fixture
            .store
            .replace_layers(
                &key("0xroot"),
                vec![
                    LayerSnapshot::new(key("0xroot"), 1, vec![key("0xa")]),
                    LayerSnapshot::new(key("0xroot"), 2, vec![key("0xb")]),
                    LayerSnapshot::new(key("0xroot"), 3, vec![key("0xstale")]),
                ],
            )
            .await
            .unwrap();

        let layers = fixture.deriver.derive_layers(&key("0xroot")).await.unwrap();
        assert_eq!(layers.len(), 2);
        assert!(fixture
            .store
            .layer(&key("0xroot"), 3)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_depth_bound_halts_walk() {
        let fixture = setup().await;
        // chain of 25 sponsorships under root
        let mut pairs = Vec::new();
        let mut names = vec!["0xroot".to_string()];
        for idx in 0..25 {
            names.push(format!("0xn{idx:02}"));
        }
        for window in names.windows(2) {
            pairs.push((window[1].clone(), window[0].clone()));
        }
        let pairs_ref: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(member, sponsor)| (member.as_str(), sponsor.as_str()))
            .collect();
        sponsor_chain(&fixture, &pairs_ref).await;

        let layers = fixture.deriver.derive_layers(&key("0xroot")).await.unwrap();
        assert_eq!(layers.len(), 19);
        assert_eq!(layers.last().unwrap().layer, 19);
    }

    #[tokio::test]
    async fn test_concurrent_derivations_share_result() {
        let fixture = setup().await;
        sponsor_chain(&fixture, &[("0xa", "0xroot"), ("0xb", "0xa")]).await;

        let deriver_a = Arc::clone(&fixture.deriver);
        let deriver_b = Arc::clone(&fixture.deriver);
        let root_key = key("0xroot");
        let (first, second) = tokio::join!(
            deriver_a.derive_layers(&root_key),
            deriver_b.derive_layers(&root_key),
        );

        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[tokio::test]
    async fn test_team_stats() {
        let fixture = setup().await;
        sponsor_chain(
            &fixture,
            &[("0xa", "0xroot"), ("0xb", "0xroot"), ("0xc", "0xa")],
        )
        .await;

        let stats = fixture.deriver.team_stats(&key("0xroot")).await.unwrap();
        assert_eq!(stats.direct_referrals, 2);
        assert_eq!(stats.total_team, 3);
        assert_eq!(stats.layer_counts, vec![(1, 2), (2, 1)]);
    }
}
