//! # Shared Types Crate
//!
//! This crate contains every value type that crosses a crate boundary:
//! session and connection identifiers, queue participants, the beat grid
//! artifact and the queue snapshot that observers render from.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: The wire shape of a participant or a grid is
//!   defined once, here.
//! - **Connection Identity**: Queue membership is keyed by [`ConnectionId`],
//!   never by a user identity. A reconnecting user is a new participant.
//! - **Opaque Content**: [`BeatGrid`] carries cells but assigns them no
//!   meaning. Deciding who may replace it is the coordinator's job.

pub mod entities;
pub mod grid;

pub use entities::*;
pub use grid::{BeatGrid, GridDimensions};
