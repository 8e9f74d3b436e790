//! Matrix ancestor-chain walks
//!
//! Reward attribution follows the placement chain, not the sponsorship
//! graph. Walks are iterative with a hard depth bound; a chain shorter
//! than the requested depth is a normal outcome, not an error.

use crate::store::MatrixStore;
use matrix_types::{MatrixResult, MemberKey};

/// Placement ancestors of `from`, nearest first, up to `max_depth` hops
pub(crate) async fn ancestor_chain(
    store: &dyn MatrixStore,
    from: &MemberKey,
    max_depth: u8,
) -> MatrixResult<Vec<MemberKey>> {
    let mut chain = Vec::new();
    let mut current = from.clone();

    for _ in 0..max_depth {
        let Some(slot) = store.slot(&current).await? else {
            break;
        };
        let Some(ancestor) = slot.placement_ancestor else {
            break; // reached the root
        };
        chain.push(ancestor.clone());
        current = ancestor;
    }

    Ok(chain)
}

/// The ancestor exactly `depth` hops above `from`, if the chain is deep enough
pub(crate) async fn ancestor_at_depth(
    store: &dyn MatrixStore,
    from: &MemberKey,
    depth: u8,
) -> MatrixResult<Option<MemberKey>> {
    if depth == 0 {
        return Ok(None);
    }
    let chain = ancestor_chain(store, from, depth).await?;
    Ok(chain.into_iter().nth(depth as usize - 1))
}
