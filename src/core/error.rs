// Centralized error handling for the janitor

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the torrent control client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot reach download client: {0}")]
    Connection(String),

    #[error("Unexpected response from download client: {0}")]
    Protocol(String),

    #[error("Download client rejected request: {0}")]
    Rejected(String),
}

/// Conditions that make a torrent impossible to evaluate
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    #[error("torrent is complete but has no completion time")]
    MissingCompletionTime,

    #[error("torrent has no added time")]
    MissingAddedTime,
}

/// Failures isolated to a single torrent; the run continues past them
#[derive(Error, Debug)]
pub enum TorrentError {
    #[error("Anomaly: {0}")]
    Anomaly(#[from] Anomaly),

    #[error("Torrent has no valid hash string; cannot remove")]
    MissingRemovalKey,

    #[error("Removal failed: {0}")]
    Removal(#[source] ClientError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end a run early
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to list torrents: {0}")]
    Connection(#[source] ClientError),

    #[error("State store failure: {0}")]
    Store(#[from] StoreError),
}
