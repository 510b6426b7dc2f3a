//! Match registry and lookup/creation policy (SPEC_FULL.md §4.4), grounded on
//! `get_or_create_match` in the original runner.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::MAX_MATCH_ID;
use crate::error::BattleError;
use crate::match_runner::Match;
use crate::persistence::ResultSink;

pub type SharedRegistry = Arc<RwLock<HashMap<u32, Arc<Match>>>>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Looks up a match by id, spawning a fresh one (and its tick task) if it
/// doesn't exist yet, or if it has already finished and `recycle` is set.
/// Match id 0 is always recyclable — it's the standing demo arena.
pub async fn get_or_create_match(
    registry: &SharedRegistry,
    match_id: u32,
    recycle: bool,
    result_sink: &ResultSink,
) -> Result<Arc<Match>, BattleError> {
    if match_id > MAX_MATCH_ID {
        return Err(BattleError::InvalidMatchId(match_id));
    }

    let recycle = recycle || match_id == 0;

    {
        let matches = registry.read().await;
        if let Some(existing) = matches.get(&match_id) {
            if !(existing.is_finished().await && recycle) {
                return Ok(existing.clone());
            }
        }
    }

    let mut matches = registry.write().await;
    if let Some(existing) = matches.get(&match_id) {
        if !(existing.is_finished().await && recycle) {
            return Ok(existing.clone());
        }
    }
    let created = Match::spawn(match_id, result_sink.clone());
    matches.insert(match_id, created.clone());
    Ok(created)
}
