//! Credential pool shared by all virtual users
//!
//! Picks go through a single atomic cursor, so concurrent callers never block
//! each other and the pool is walked strictly round-robin.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::info;

/// Login payload handed to one workflow iteration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
#[error("Credential pool is empty")]
pub struct EmptyPoolError;

/// Errors loading a pool from disk
#[derive(Debug, Error)]
pub enum PoolLoadError {
    #[error("Failed to read credential pool {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid credential pool: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Empty(#[from] EmptyPoolError),
}

/// Round-robin source of credentials over a preloaded pool
#[derive(Debug)]
pub struct UserSource {
    pool: Vec<Credential>,
    cursor: AtomicUsize,
}

impl UserSource {
    pub fn new(pool: Vec<Credential>) -> Result<Self, EmptyPoolError> {
        if pool.is_empty() {
            return Err(EmptyPoolError);
        }
        Ok(Self {
            pool,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Load a JSON array of `{username, password}` objects
    pub fn from_json_file(path: &Path) -> Result<Self, PoolLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| PoolLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let pool: Vec<Credential> = serde_json::from_str(&content)?;
        info!("Loaded {} credentials from {:?}", pool.len(), path);
        Ok(Self::new(pool)?)
    }

    /// Next credential in round-robin order, wrapping at the end of the pool
    pub fn next_credential(&self) -> Credential {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[slot].clone()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}
