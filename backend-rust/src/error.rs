//! Domain error types (SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BattleError {
    #[error("match {0} does not exist")]
    InvalidMatchId(u32),

    #[error("hello message was malformed: {0}")]
    BadHello(String),

    #[error("match is full")]
    MatchFull,

    #[error("a robot named '{0}' is already in this match")]
    AlreadyJoined(String),

    #[error("this game has already started and does not accept new entrants")]
    LateEntrantsDisallowed,

    #[error("bad command received: {0}")]
    BadCommand(String),

    #[error("peer connection is gone")]
    PeerGone,

    #[error("simulation invariant violated: {0}")]
    SimulationInvariant(String),
}
