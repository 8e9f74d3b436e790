//! Placement engine
//!
//! Assigns each newly activated member a fixed slot in the global ternary
//! tree. Direct placement under the sponsor when a position is free;
//! otherwise spillover to the earliest-joined member with an open
//! position, so replaying the same joins always rebuilds the same tree.

use crate::directory::MemberDirectory;
use crate::store::{AttachOutcome, MatrixStore};
use matrix_types::{
    MatrixError, MatrixResult, MatrixSlot, MemberKey, MAX_MATRIX_CHILDREN,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Re-run the direct/spillover search this many times when conditional
/// attaches keep losing races before falling back.
const MAX_PLACEMENT_ATTEMPTS: usize = 8;

/// Finds and writes matrix slots
pub struct PlacementEngine {
    directory: Arc<dyn MemberDirectory>,
    matrix: Arc<dyn MatrixStore>,
}

impl PlacementEngine {
    pub fn new(directory: Arc<dyn MemberDirectory>, matrix: Arc<dyn MatrixStore>) -> Self {
        Self { directory, matrix }
    }

    /// Pre-seed the company root: a parentless slot at the top of the tree
    pub async fn seed_root(&self, member: &MemberKey) -> MatrixResult<MatrixSlot> {
        if self.directory.member(member).await?.is_none() {
            return Err(MatrixError::UnknownMember(member.clone()));
        }
        let slot = MatrixSlot::root(member.clone());
        self.matrix.insert_root(slot.clone()).await?;
        info!(member = %member, "matrix root seeded");
        Ok(slot)
    }

    /// Place `new_member` under `sponsor`, spilling over when full
    pub async fn place(
        &self,
        new_member: &MemberKey,
        sponsor: &MemberKey,
    ) -> MatrixResult<MatrixSlot> {
        if self.directory.member(sponsor).await?.is_none() {
            return Err(MatrixError::UnknownSponsor(sponsor.clone()));
        }
        if self.directory.member(new_member).await?.is_none() {
            return Err(MatrixError::UnknownMember(new_member.clone()));
        }
        if self.matrix.slot(new_member).await?.is_some() {
            return Err(MatrixError::MemberAlreadyPlaced(new_member.clone()));
        }

        for attempt in 0..MAX_PLACEMENT_ATTEMPTS {
            // Direct placement while the sponsor has an open position
            match self
                .matrix
                .try_attach(new_member.clone(), sponsor.clone(), sponsor.clone())
                .await?
            {
                AttachOutcome::Attached(slot) => {
                    info!(
                        member = %new_member,
                        sponsor = %sponsor,
                        position = slot.position.map(|p| p.index()).unwrap_or(0),
                        "member placed under sponsor"
                    );
                    return Ok(slot);
                }
                AttachOutcome::AncestorFull => {}
            }

            // Spillover: earliest-joined member with an open position
            if let Some(slot) = self.spillover(new_member, sponsor).await? {
                return Ok(slot);
            }

            debug!(
                member = %new_member,
                attempt,
                "placement search lost its race, rescanning"
            );
        }

        // Degenerate guard; a tree always has an open position, so landing
        // here means every conditional attach lost its race repeatedly.
        match self
            .matrix
            .try_attach(new_member.clone(), sponsor.clone(), sponsor.clone())
            .await?
        {
            AttachOutcome::Attached(slot) => Ok(slot),
            AttachOutcome::AncestorFull => {
                error!(member = %new_member, sponsor = %sponsor, "placement fallback found no open position");
                Err(MatrixError::CapacityInvariantViolation(sponsor.clone()))
            }
        }
    }

    /// Scan all placed members in join order for the first open position
    async fn spillover(
        &self,
        new_member: &MemberKey,
        sponsor: &MemberKey,
    ) -> MatrixResult<Option<MatrixSlot>> {
        let scan_order = self.matrix.members_by_join_order().await?;

        for candidate in scan_order {
            if self.matrix.children(&candidate).await?.len() >= MAX_MATRIX_CHILDREN {
                continue;
            }
            match self
                .matrix
                .try_attach(new_member.clone(), sponsor.clone(), candidate.clone())
                .await?
            {
                AttachOutcome::Attached(slot) => {
                    info!(
                        member = %new_member,
                        sponsor = %sponsor,
                        ancestor = %candidate,
                        position = slot.position.map(|p| p.index()).unwrap_or(0),
                        "member placed by spillover"
                    );
                    return Ok(Some(slot));
                }
                // Lost the race for this candidate's last position
                AttachOutcome::AncestorFull => continue,
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::store::InMemoryMatrixStore;
    use matrix_types::MemberRecord;

    fn key(raw: &str) -> MemberKey {
        MemberKey::new(raw)
    }

    async fn setup() -> (Arc<InMemoryDirectory>, Arc<InMemoryMatrixStore>, PlacementEngine) {
        let directory = Arc::new(InMemoryDirectory::new());
        let matrix = Arc::new(InMemoryMatrixStore::new());
        let engine = PlacementEngine::new(
            Arc::clone(&directory) as Arc<dyn MemberDirectory>,
            Arc::clone(&matrix) as Arc<dyn MatrixStore>,
        );

        directory
            .register(MemberRecord::root(key("0xroot")))
            .await
            .unwrap();
        engine.seed_root(&key("0xroot")).await.unwrap();
        (directory, matrix, engine)
    }

    async fn register(directory: &InMemoryDirectory, member: &str, sponsor: &str) {
        directory
            .register(MemberRecord::new(key(member), key(sponsor)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_direct_placement_fills_positions_in_order() {
        let (directory, _, engine) = setup().await;

        for (idx, member) in ["0xa", "0xb", "0xc"].iter().enumerate() {
            register(&directory, member, "0xroot").await;
            let slot = engine.place(&key(member), &key("0xroot")).await.unwrap();
            assert_eq!(slot.placement_ancestor, Some(key("0xroot")));
            assert_eq!(slot.position.unwrap().index(), idx as u8 + 1);
            assert!(!slot.spillover);
        }
    }

    #[tokio::test]
    async fn test_spillover_goes_to_earliest_joined_open_member() {
        let (directory, _, engine) = setup().await;

        for member in ["0xa", "0xb", "0xc"] {
            register(&directory, member, "0xroot").await;
            engine.place(&key(member), &key("0xroot")).await.unwrap();
        }

        // Root is full; the fourth member spills to 0xa (earliest joined
        // with an open position), not the sponsor.
        register(&directory, "0xd", "0xroot").await;
        let slot = engine.place(&key("0xd"), &key("0xroot")).await.unwrap();
        assert_eq!(slot.placement_ancestor, Some(key("0xa")));
        assert_eq!(slot.direct_sponsor, key("0xroot"));
        assert!(slot.spillover);
    }

    #[tokio::test]
    async fn test_unknown_sponsor_rejected() {
        let (directory, _, engine) = setup().await;
        register(&directory, "0xa", "0xroot").await;

        let result = engine.place(&key("0xa"), &key("0xghost")).await;
        assert!(matches!(result, Err(MatrixError::UnknownSponsor(_))));
    }

    #[tokio::test]
    async fn test_replacement_rejected() {
        let (directory, _, engine) = setup().await;
        register(&directory, "0xa", "0xroot").await;
        engine.place(&key("0xa"), &key("0xroot")).await.unwrap();

        let result = engine.place(&key("0xa"), &key("0xroot")).await;
        assert!(matches!(result, Err(MatrixError::MemberAlreadyPlaced(_))));
    }

    #[tokio::test]
    async fn test_concurrent_placement_holds_capacity_invariant() {
        let (directory, matrix, engine) = setup().await;
        let engine = Arc::new(engine);

        for idx in 0..12 {
            register(&directory, &format!("0xm{idx}"), "0xroot").await;
        }

        let mut handles = Vec::new();
        for idx in 0..12 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .place(&key(&format!("0xm{idx}")), &key("0xroot"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every placed member has at most three children
        for member in matrix.members_by_join_order().await.unwrap() {
            assert!(matrix.children(&member).await.unwrap().len() <= MAX_MATRIX_CHILDREN);
        }
        assert_eq!(matrix.len().await.unwrap(), 13);
    }

    #[tokio::test]
    async fn test_replayed_sequence_builds_identical_tree() {
        let joins: Vec<String> = (0..30).map(|idx| format!("0xm{idx:02}")).collect();

        let mut trees = Vec::new();
        for _ in 0..2 {
            let (directory, matrix, engine) = setup().await;
            for member in &joins {
                register(&directory, member, "0xroot").await;
                engine.place(&key(member), &key("0xroot")).await.unwrap();
            }

            let mut tree = Vec::new();
            for member in &joins {
                let slot = matrix.slot(&key(member)).await.unwrap().unwrap();
                tree.push((
                    slot.member.clone(),
                    slot.placement_ancestor.clone(),
                    slot.position,
                ));
            }
            trees.push(tree);
        }

        assert_eq!(trees[0], trees[1]);
    }
}
