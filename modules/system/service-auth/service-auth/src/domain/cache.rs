//! Command cache keyed by backend requirement and raw credential.
//!
//! Lookups for one key are single-flight: concurrent first callers wait for one
//! generation instead of each calling the pass-ticket generator. A command is only
//! stored after its generation future completes, so a dropped request never leaves
//! a partial entry behind.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use service_auth_sdk::{AuthenticationCommand, BackendRequirement, CredentialKey};
use tokio::sync::Mutex;

pub type CacheKey = (BackendRequirement, CredentialKey);

#[derive(Default)]
pub struct CommandCache {
    entries: DashMap<CacheKey, Arc<AuthenticationCommand>>,
    /// Per-key generation locks.
    inflight: DashMap<CacheKey, Arc<Mutex<()>>>,
    /// Service id -> requirements declared by its instances.
    by_service: DashMap<String, HashSet<BackendRequirement>>,
}

impl CommandCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired command for `key`. An expired entry is removed on the way.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<AuthenticationCommand>> {
        let cached = self.entries.get(key).map(|entry| Arc::clone(entry.value()));
        match cached {
            Some(command) if !command.is_expired() => Some(command),
            Some(_) => {
                self.entries.remove_if(key, |_, command| command.is_expired());
                tracing::debug!("expired command evicted");
                None
            }
            None => None,
        }
    }

    /// Cached command for `key`, or the result of `create`, stored on success.
    ///
    /// Deferred commands are returned but never stored.
    ///
    /// # Errors
    ///
    /// Propagates the error of `create`; nothing is cached in that case.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: CacheKey,
        create: F,
    ) -> Result<Arc<AuthenticationCommand>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthenticationCommand, E>>,
    {
        if let Some(command) = self.get(&key) {
            tracing::debug!(scheme = %key.0.scheme, "command cache hit");
            return Ok(command);
        }

        let lock = Arc::clone(self.inflight.entry(key.clone()).or_default().value());
        let result = {
            let _generating = lock.lock().await;

            // Another caller may have generated while we waited.
            if let Some(command) = self.get(&key) {
                Ok(command)
            } else {
                tracing::debug!(scheme = %key.0.scheme, "command cache miss");
                create().await.map(|command| {
                    let command = Arc::new(command);
                    if !command.is_deferred() {
                        self.entries.insert(key.clone(), Arc::clone(&command));
                    }
                    command
                })
            }
        };

        // Map entry plus our clone: no one else is waiting on this key.
        self.inflight
            .remove_if(&key, |_, l| Arc::ptr_eq(l, &lock) && Arc::strong_count(l) == 2);
        result
    }

    /// Remember that `service_id` declared `requirement`.
    pub fn track(&self, service_id: &str, requirement: &BackendRequirement) {
        if let Some(set) = self.by_service.get(service_id)
            && set.contains(requirement)
        {
            return;
        }
        self.by_service
            .entry(service_id.to_owned())
            .or_default()
            .insert(requirement.clone());
    }

    /// Drop commands derived from `service_id`.
    ///
    /// Requirements another service still declares keep their entries.
    pub fn evict_service(&self, service_id: &str) -> usize {
        let Some((_, requirements)) = self.by_service.remove(service_id) else {
            return 0;
        };
        let shared: HashSet<BackendRequirement> = self
            .by_service
            .iter()
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect();
        let doomed: HashSet<&BackendRequirement> = requirements
            .iter()
            .filter(|requirement| !shared.contains(*requirement))
            .collect();

        let before = self.entries.len();
        self.entries.retain(|(requirement, _), _| !doomed.contains(requirement));
        let evicted = before.saturating_sub(self.entries.len());
        tracing::debug!(service_id, evicted, "service commands evicted");
        evicted
    }

    pub fn evict_all(&self) {
        self.entries.clear();
        self.by_service.clear();
        tracing::debug!("command cache cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
