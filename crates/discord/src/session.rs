//! Per-credential backend sessions.
//!
//! A session is created on first use for a credential and reused by every
//! later request under it. Concurrent first uses share one creation: each
//! credential maps to a [`OnceCell`] that at most one caller initializes
//! while the others wait on it. Sessions are evicted after transport
//! errors so the next request starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// A live session for one backend user.
#[derive(Debug, Clone)]
pub struct DiscordSession {
    /// Platform user id the token belongs to.
    pub user_id: String,
    /// Random gateway-style session id sent with every interaction.
    pub session_id: String,
}

/// Registry of sessions keyed by credential.
pub struct SessionRegistry<S> {
    sessions: Mutex<HashMap<String, Arc<OnceCell<Arc<S>>>>>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `credential`, creating it with `create` if
    /// none exists yet.
    ///
    /// A failed creation leaves the slot empty; the next caller retries.
    pub async fn get_or_create<F, Fut, E>(&self, credential: &str, create: F) -> Result<Arc<S>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, E>>,
    {
        let cell = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(credential.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let session = cell
            .get_or_try_init(|| async {
                tracing::debug!("Creating backend session");
                create().await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(session))
    }

    /// Drop the session for `credential`. Returns whether one existed.
    pub async fn evict(&self, credential: &str) -> bool {
        let removed = self.sessions.lock().await.remove(credential).is_some();
        if removed {
            tracing::info!("Evicted backend session");
        }
        removed
    }

    /// Number of credentials with a session slot.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Random 32-character hex session id.
pub fn new_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..32)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_first_use_creates_once() {
        let registry = Arc::new(SessionRegistry::<String>::new());
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let created = Arc::clone(&created);
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_create("key", || async {
                        created.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, String>("session".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().as_str(), "session");
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn failed_creation_is_retried() {
        let registry = SessionRegistry::<u32>::new();
        let first = registry
            .get_or_create("key", || async { Err::<u32, _>("bad token") })
            .await;
        assert!(first.is_err());

        let second = registry
            .get_or_create("key", || async { Ok::<_, &str>(7) })
            .await
            .unwrap();
        assert_eq!(*second, 7);
    }

    #[tokio::test]
    async fn evict_forces_recreation() {
        let registry = SessionRegistry::<u32>::new();
        registry.get_or_create("key", || async { Ok::<_, ()>(1) }).await.unwrap();
        assert!(registry.evict("key").await);
        assert!(!registry.evict("key").await);

        let fresh = registry.get_or_create("key", || async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(*fresh, 2);
    }

    #[test]
    fn session_ids_are_hex() {
        let id = new_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
