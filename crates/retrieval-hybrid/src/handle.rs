use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use retrieval_core::error::{Error, Result};
use retrieval_core::types::RetrievalResult;

use crate::session::{RetrievalMode, RetrievalSession};

/// Shared access to the current built session.
///
/// A corpus change means building a fresh session off to the side and
/// swapping it in with `replace`; queries already holding the previous
/// session finish against it.
pub struct SessionHandle {
    current: RwLock<Arc<RetrievalSession>>,
}

impl SessionHandle {
    pub fn new(session: RetrievalSession) -> Result<Self> {
        if !session.is_built() {
            return Err(Error::NotReady);
        }
        Ok(Self { current: RwLock::new(Arc::new(session)) })
    }

    pub fn current(&self) -> Arc<RetrievalSession> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a newly built session and return the one it replaced.
    pub fn replace(&self, session: RetrievalSession) -> Result<Arc<RetrievalSession>> {
        if !session.is_built() {
            return Err(Error::NotReady);
        }
        let next = Arc::new(session);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        info!(embedder = %guard.embedder_id(), "retrieval session replaced");
        Ok(previous)
    }

    pub fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.current().retrieve(query)
    }

    pub fn retrieve_with(&self, query: &str, mode: RetrievalMode) -> Result<RetrievalResult> {
        self.current().retrieve_with(query, mode)
    }
}
