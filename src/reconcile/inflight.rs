//! Registry of execution ids with a cycle (polling or re-probe) in progress.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `execution_id`. Returns `None` if a cycle already holds it.
    /// The claim is released when the guard drops.
    pub fn claim(&self, execution_id: &str) -> Option<InFlightGuard> {
        let mut map = self.lock();
        if map.contains_key(execution_id) {
            return None;
        }
        let token = CancellationToken::new();
        map.insert(execution_id.to_string(), token.clone());
        Some(InFlightGuard {
            registry: self.clone(),
            execution_id: execution_id.to_string(),
            token,
        })
    }

    pub fn contains(&self, execution_id: &str) -> bool {
        self.lock().contains_key(execution_id)
    }

    /// Cancel the cycle holding `execution_id`. Returns false if none is running.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.lock().get(execution_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running cycle.
    pub fn cancel_all(&self) {
        for token in self.lock().values() {
            token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        // The map holds no invariant a panicking holder could break.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct InFlightGuard {
    registry: InFlight,
    execution_id: String,
    token: CancellationToken,
}

impl InFlightGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.execution_id);
    }
}
