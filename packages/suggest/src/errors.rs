use redline_editor::MutationError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::crdt::CrdtError;
use crate::store::StoreError;

/// Engine-internal failures
///
/// These never cross the engine's public edge: command handlers and
/// resolution log them and fall back to ordinary editing.
#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("Tree mutation failed: {0}")]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Replication failed: {0}")]
    Crdt(#[from] CrdtError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
