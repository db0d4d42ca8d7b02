use std::io;
use thiserror::Error;

use crate::event::Category;

/// Failures that keep kernolog from starting.
#[derive(Debug, Error)]
pub enum InitializeError {
    #[error("could not create data directory {path}: {source}")]
    DataDirectory { path: String, source: io::Error },
    #[error("could not load the embedding provider: {0}")]
    Embedder(#[from] crate::embed::Error),
    #[error("this build does not include the fastembed provider")]
    FastEmbedUnavailable,
    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("could not install the signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("could not start the {0} thread: {1}")]
    Spawn(&'static str, io::Error),
    #[error("could not open the {category} store: {source}")]
    Store {
        category: Category,
        source: crate::database::Error,
    },
    #[error("unknown embedder: {0} (expected hash or fastembed)")]
    UnknownEmbedder(String),
}
