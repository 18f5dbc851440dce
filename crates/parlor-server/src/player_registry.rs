//! Process-lifetime registry of every player ever seen.
//!
//! Find-or-insert keyed by username. Players are never dropped while the
//! server runs (ratings persist across logins); the registry's handles
//! are released only by [`PlayerRegistry::finalize`] at shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use parlor_core::Player;
use tracing::debug;

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    inner: Mutex<HashMap<String, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        PlayerRegistry::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Player>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the player registered under `name`, creating one with the
    /// initial rating on first sight of the name.
    pub fn register(&self, name: &str) -> Arc<Player> {
        let mut guard = self.lock();
        guard
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(name, "creating player");
                Arc::new(Player::new(name))
            })
            .clone()
    }

    /// Number of distinct players seen so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every held player. Called once at shutdown, after all
    /// clients are gone.
    pub fn finalize(&self) {
        let mut guard = self.lock();
        debug!(players = guard.len(), "finalizing player registry");
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_find_or_insert() {
        let registry = PlayerRegistry::new();
        let a1 = registry.register("alice");
        let a2 = registry.register("alice");
        let b = registry.register("bob");

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ratings_survive_between_lookups() {
        use parlor_core::{MatchOutcome, Player};

        let registry = PlayerRegistry::new();
        {
            let alice = registry.register("alice");
            let bob = registry.register("bob");
            Player::post_result(&alice, &bob, MatchOutcome::Player1Wins);
        }
        assert_eq!(registry.register("alice").rating(), 1516);
        assert_eq!(registry.register("bob").rating(), 1484);
    }

    #[test]
    fn finalize_empties_the_registry() {
        let registry = PlayerRegistry::new();
        registry.register("alice");
        registry.finalize();
        assert!(registry.is_empty());
    }
}
