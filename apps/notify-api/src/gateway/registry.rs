//! Process-wide map from user id to that user's live, authenticated
//! connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::{ConnectionHandle, ConnectionId};

type UserConnections = HashMap<ConnectionId, Arc<ConnectionHandle>>;

/// Registry of authenticated connections keyed by user id.
///
/// Every operation takes the same lock, so add/remove/get and the heartbeat
/// snapshot never observe each other half-done. The lock only guards map
/// mutation: callers get cloned `Arc`s and do their socket I/O after it is
/// released.
pub struct ConnectionRegistry {
    users: Mutex<HashMap<String, UserConnections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handle` for `user_id`. Returns `false` if the pair was
    /// already present, in which case the registry is unchanged.
    pub fn add(&self, user_id: &str, handle: Arc<ConnectionHandle>) -> bool {
        let mut users = self.users.lock();
        let conns = users.entry(user_id.to_string()).or_default();
        if conns.contains_key(&handle.id) {
            return false;
        }
        conns.insert(handle.id.clone(), handle);
        true
    }

    /// Remove one connection. Removing an absent pair is a no-op that returns
    /// `false`. The user's key goes away with their last connection.
    pub fn remove(&self, user_id: &str, conn_id: &str) -> bool {
        let mut users = self.users.lock();
        let Some(conns) = users.get_mut(user_id) else {
            return false;
        };
        let removed = conns.remove(conn_id).is_some();
        if conns.is_empty() {
            users.remove(user_id);
        }
        removed
    }

    /// All live handles for `user_id`; empty if none.
    pub fn get(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.users
            .lock()
            .get(user_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every registered handle, for the liveness sweep.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.users
            .lock()
            .values()
            .flat_map(|conns| conns.values().cloned())
            .collect()
    }

    pub fn contains_user(&self, user_id: &str) -> bool {
        self.users.lock().contains_key(user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    pub fn connection_count(&self) -> usize {
        self.users.lock().values().map(HashMap::len).sum()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(user_id: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(4);
        ConnectionHandle::new(user_id, tx)
    }

    #[test]
    fn add_is_idempotent_per_pair() {
        let registry = ConnectionRegistry::new();
        let h = handle("usr_a");

        assert!(registry.add("usr_a", h.clone()));
        assert!(!registry.add("usr_a", h.clone()));

        assert_eq!(registry.get("usr_a").len(), 1);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn remove_absent_pair_is_noop() {
        let registry = ConnectionRegistry::new();
        let h = handle("usr_a");
        registry.add("usr_a", h.clone());

        assert!(!registry.remove("usr_a", "conn_unknown"));
        assert!(!registry.remove("usr_nobody", &h.id));
        assert_eq!(registry.get("usr_a").len(), 1);
    }

    #[test]
    fn removing_last_handle_drops_user_key() {
        let registry = ConnectionRegistry::new();
        let first = handle("usr_a");
        let second = handle("usr_a");
        registry.add("usr_a", first.clone());
        registry.add("usr_a", second.clone());

        assert!(registry.remove("usr_a", &first.id));
        assert!(registry.contains_user("usr_a"));

        assert!(registry.remove("usr_a", &second.id));
        assert!(registry.get("usr_a").is_empty());
        assert!(!registry.contains_user("usr_a"));
        assert!(registry.users.lock().is_empty());

        // Double removal after exhaustion is still harmless.
        assert!(!registry.remove("usr_a", &second.id));
    }

    #[test]
    fn snapshot_spans_all_users() {
        let registry = ConnectionRegistry::new();
        registry.add("usr_a", handle("usr_a"));
        registry.add("usr_a", handle("usr_a"));
        registry.add("usr_b", handle("usr_b"));

        assert_eq!(registry.snapshot().len(), 3);
        assert_eq!(registry.user_count(), 2);
    }

    #[test]
    fn concurrent_add_remove_leaves_no_residue() {
        let registry = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let user = format!("usr_{}", i % 3);
                    for _ in 0..200 {
                        let h = handle(&user);
                        registry.add(&user, h.clone());
                        let _ = registry.snapshot();
                        registry.remove(&user, &h.id);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.user_count(), 0);
    }
}
