//! Round tracking and current-round promotion.

use alloy_primitives::B256;
use tracing::{debug, warn};

use super::ReduceError;
use crate::metadata::MetadataSink;
use crate::state::{CurrentRound, Round};
use crate::store::StateStore;

/// URI scheme prefix stripped from round metadata references.
const IPFS_SCHEME: &str = "ipfs://";

/// Applies a round-update event.
///
/// The round is always persisted. Promotion to current round and the
/// metadata-fetch registration happen only when the announcement
/// carried a non-empty content identifier; an empty one is a silent
/// partial success, not an error.
pub(super) fn apply_round_updated<S: StateStore, M: MetadataSink>(
    store: &mut S,
    metadata: &M,
    round_id: B256,
    start: u64,
    end: u64,
    metadata_uri: &str,
    timestamp: u64,
) -> Result<(), ReduceError> {
    let mut round = Round {
        id: round_id,
        start,
        end,
        created_at: timestamp,
        metadata: None,
    };

    let cid = metadata_uri.strip_prefix(IPFS_SCHEME).unwrap_or(metadata_uri);
    if cid.is_empty() {
        // Persist the round without a metadata link; it stays
        // non-current.
        store.put_round(&round)?;
        warn!(round = %round_id, "round announced without a metadata identifier; not promoted");
        return Ok(());
    }

    round.metadata = Some(cid.to_string());
    metadata.register(cid);
    store.put_round(&round)?;

    // Last RoundUpdated event wins.
    store.set_current_round(&CurrentRound {
        round: round_id,
        updated_at: timestamp,
    })?;
    debug!(round = %round_id, cid, "promoted current round");
    Ok(())
}
