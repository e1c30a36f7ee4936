//! Error types for the tile core.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TileCoreError>;

/// Failure modes surfaced synchronously by the tile core.
///
/// A failed tile load is *not* represented here: it lives in the tile
/// record's `error` field instead, since it must never interrupt the
/// caller's control flow (see [`crate::loader::TileState::Error`]).
#[derive(Debug, Error)]
pub enum TileCoreError {
    #[error("unsupported projection pair: {from} -> {to}")]
    UnsupportedProjection { from: String, to: String },

    #[error("malformed tile key: {0}")]
    MalformedTileKey(String),

    #[error("tile load failed: {0}")]
    LoadFailed(String),
}
