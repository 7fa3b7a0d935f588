//! Process-wide descriptor cache keyed by [`OperationId`].
//!
//! Reads vastly outnumber writes. Concurrent first-time registrations of the
//! same interface are tolerated: each builds its own descriptors, but only the
//! first inserted `Arc` per key is kept, so every reader observes one instance.
//! When an insert would exceed the capacity bound the whole map is cleared;
//! there is no per-entry eviction.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::descriptor::{build_interface, EndpointDescriptor, OperationId, RegistrationError};
use crate::metadata::InterfaceMetadata;

/// Default capacity bound before the cache is cleared.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Shared map from operation identity to its compiled descriptor.
#[derive(Debug)]
pub struct DescriptorCache {
    entries: DashMap<OperationId, Arc<EndpointDescriptor>>,
    capacity: usize,
}

impl DescriptorCache {
    /// An empty cache that clears itself once it holds more than `capacity` descriptors.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    /// The process-wide cache, created on first use with [`DEFAULT_CAPACITY`].
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<DescriptorCache> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new(DEFAULT_CAPACITY))
    }

    /// Cached descriptor for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &OperationId) -> Option<Arc<EndpointDescriptor>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Returns the cached descriptor for `operation`, registering the whole
    /// interface on a miss.
    ///
    /// # Errors
    ///
    /// Propagates the interface's [`RegistrationError`], or
    /// [`RegistrationError::UnknownOperation`] if the interface does not
    /// declare `operation`.
    pub fn get_or_build(
        &self,
        interface: &InterfaceMetadata,
        operation: &str,
    ) -> Result<Arc<EndpointDescriptor>, RegistrationError> {
        let service = interface
            .service_name
            .as_deref()
            .ok_or(RegistrationError::MissingServiceName)?;
        let id = OperationId::new(service, operation);
        if let Some(hit) = self.get(&id) {
            return Ok(hit);
        }
        self.register_interface(interface)?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or(RegistrationError::UnknownOperation { operation: id })
    }

    /// Builds and caches every operation of `interface`. Nothing is cached
    /// if any operation fails to build.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistrationError`] encountered.
    pub fn register_interface(
        &self,
        interface: &InterfaceMetadata,
    ) -> Result<Vec<Arc<EndpointDescriptor>>, RegistrationError> {
        let built = build_interface(interface).inspect_err(|err| {
            tracing::error!(error = %err, "interface registration failed");
        })?;
        Ok(built.into_iter().map(|d| self.insert(d)).collect())
    }

    /// Number of cached descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached descriptor.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn insert(&self, descriptor: EndpointDescriptor) -> Arc<EndpointDescriptor> {
        if let Some(existing) = self.get(&descriptor.id) {
            return existing;
        }
        if self.entries.len() >= self.capacity {
            tracing::info!(
                capacity = self.capacity,
                "descriptor cache full, clearing all entries"
            );
            self.entries.clear();
        }
        self.entries
            .entry(descriptor.id.clone())
            .or_insert_with(|| Arc::new(descriptor))
            .value()
            .clone()
    }
}

impl Default for DescriptorCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::metadata::OperationMetadata;

    fn items() -> InterfaceMetadata {
        InterfaceMetadata::new("Items", "https://example.com")
            .operation(OperationMetadata::new("getItem").get("/items/{id}").path_param("id", 0))
            .operation(OperationMetadata::new("listItems").get("/items"))
    }

    #[test]
    fn repeated_lookup_returns_same_instance() {
        let cache = DescriptorCache::default();
        let first = cache.get_or_build(&items(), "getItem").unwrap();
        let second = cache.get_or_build(&items(), "getItem").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn unknown_operation_is_reported() {
        let cache = DescriptorCache::default();
        let err = cache.get_or_build(&items(), "deleteItem").unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownOperation { .. }));
    }

    #[test]
    fn failed_interface_caches_nothing() {
        let cache = DescriptorCache::default();
        let bad = items().operation(OperationMetadata::new("broken"));
        assert!(cache.register_interface(&bad).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn exceeding_capacity_clears_everything() {
        let cache = DescriptorCache::new(2);
        cache.register_interface(&items()).unwrap();
        assert_eq!(cache.len(), 2);
        let other = InterfaceMetadata::new("Other", "https://example.com")
            .operation(OperationMetadata::new("ping").get("/ping"));
        cache.register_interface(&other).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&OperationId::new("Items", "getItem")).is_none());
        assert!(cache.get(&OperationId::new("Other", "ping")).is_some());
    }

    #[test]
    fn concurrent_registration_converges_on_one_instance() {
        let cache = Arc::new(DescriptorCache::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_or_build(&items(), "getItem").unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let canonical = cache.get(&OperationId::new("Items", "getItem")).unwrap();
        for r in &results {
            assert_eq!(**r, *canonical);
        }
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = DescriptorCache::default();
        cache.register_interface(&items()).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
