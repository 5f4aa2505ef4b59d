//! Stored record encoding.
//!
//! Records are JSON so that other processes sharing the store (and humans
//! with `redis-cli`) can read them. A record that parses but breaks an
//! invariant is rejected the same way as one that does not parse.

use super::errors::CodecError;
use super::state::SessionTurnState;

pub fn encode(state: &SessionTurnState) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(state).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<SessionTurnState, CodecError> {
    let state: SessionTurnState =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    state.check_invariants()?;
    Ok(state)
}
