//! Project status lookup
//!
//! Answers "is this project known for this review request?". The answer only
//! decides whether the viewer page renders or returns not-found; the broadcast
//! engine never consults it, so subscribing and appending work for any
//! identity whether or not it is known here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::identity::Identity;

/// Failure of the status backend itself (not a negative answer)
#[derive(Debug, Error)]
pub enum StatusError {
    /// The backend could not be reached or returned garbage
    #[error("project status backend unavailable: {0}")]
    Unavailable(String),
}

/// Source of truth for which projects exist on which review requests
#[async_trait]
pub trait ProjectStatusStore: Send + Sync {
    /// Whether `identity`'s project is known for its review request
    async fn project_exists(&self, identity: &Identity) -> Result<bool, StatusError>;
}

/// `(org, repo, number)` of a review request
type RequestKey = (String, String, u64);

/// In-memory status store
///
/// Populated as projects report output.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProjectStatus {
    inner: Arc<RwLock<HashMap<RequestKey, HashSet<String>>>>,
}

impl InMemoryProjectStatus {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn request_key(identity: &Identity) -> RequestKey {
        (
            identity.organization().to_string(),
            identity.repository().to_string(),
            identity.request_number(),
        )
    }

    /// Record that `identity`'s project exists
    ///
    /// Returns `true` if it was not known before.
    pub fn register(&self, identity: &Identity) -> bool {
        let inserted = self
            .inner
            .write()
            .entry(Self::request_key(identity))
            .or_default()
            .insert(identity.project().to_string());
        if inserted {
            tracing::debug!(identity = %identity, "Project registered");
        }
        inserted
    }

    /// Synchronous lookup
    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.inner
            .read()
            .get(&Self::request_key(identity))
            .is_some_and(|projects| projects.contains(identity.project()))
    }
}

#[async_trait]
impl ProjectStatusStore for InMemoryProjectStatus {
    async fn project_exists(&self, identity: &Identity) -> Result<bool, StatusError> {
        Ok(self.contains(identity))
    }
}
