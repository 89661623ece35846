// src/directory/mod.rs
pub mod web;
pub mod worker;

use async_trait::async_trait;
use std::fmt;

use crate::models::server::{Endpoint, Region};

#[derive(Debug)]
pub enum DirectoryError {
    /// Network or protocol failure talking to the directory. Surfaced to the
    /// caller unmodified; never retried here.
    Transport(String),
    /// The directory answered with something we could not decode.
    Decode(String),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "directory transport failure: {}", msg),
            Self::Decode(msg) => write!(f, "directory response decode failure: {}", msg),
        }
    }
}

/// Contract of the upstream directory session: submit a filtered query,
/// receive a bounded candidate list. The session's own wire protocol and
/// login flow live behind this seam.
#[async_trait]
pub trait DirectorySession: Send + Sync {
    async fn query(
        &self,
        app_id: u32,
        region: Region,
        filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<Endpoint>, DirectoryError>;

    /// Cheap liveness check, driven periodically by the session worker.
    async fn heartbeat(&self) -> Result<(), DirectoryError>;
}
