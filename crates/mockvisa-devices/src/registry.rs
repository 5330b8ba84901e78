/*!
 * Resource registry for MockVISA.
 *
 * This module maps resource names to the instruments serving them. Each name
 * also owns the exclusive lock shared by every session opened on it.
 */
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Result, VisaError};
use crate::instrument::{Device, Instrument};
use crate::lock::ResourceLock;
use crate::resource_name::{ResourceName, DEFAULT_QUERY};

#[derive(Clone)]
struct Entry {
    device: Arc<dyn Device>,
    lock: Arc<ResourceLock>,
}

/// Resource registry
#[derive(Default)]
pub struct ResourceRegistry {
    /// The registered instruments, ordered by name
    entries: RwLock<BTreeMap<ResourceName, Entry>>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_map()
            .entries(entries.iter().map(|(name, entry)| (name.to_string(), entry.device.type_name())))
            .finish()
    }
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under `name`.
    ///
    /// A device already registered under the name is replaced and returned;
    /// the name keeps its lock.
    pub fn register(&self, name: ResourceName, device: Arc<dyn Device>) -> Option<Arc<dyn Device>> {
        let mut entries = self.entries.write();
        info!(resource = %name, instrument = device.type_name(), "Registered resource");

        match entries.get_mut(&name) {
            Some(entry) => Some(std::mem::replace(&mut entry.device, device)),
            None => {
                let lock = Arc::new(ResourceLock::new(name.to_string()));
                entries.insert(name, Entry { device, lock });
                None
            }
        }
    }

    /// Register an instrument value, returning the shared handle to it
    pub fn register_instrument<I: Instrument>(&self, name: ResourceName, instrument: I) -> Arc<I> {
        let instrument = Arc::new(instrument);
        self.register(name, instrument.clone());
        instrument
    }

    /// Register every `(name, device)` pair
    pub fn register_all<I>(&self, devices: I)
    where
        I: IntoIterator<Item = (ResourceName, Arc<dyn Device>)>,
    {
        for (name, device) in devices {
            self.register(name, device);
        }
    }

    /// Remove a registration
    pub fn unregister(&self, name: &ResourceName) -> Result<Arc<dyn Device>> {
        let entry = self
            .entries
            .write()
            .remove(name)
            .ok_or_else(|| VisaError::resource_not_found(name.to_string()))?;
        debug!(resource = %name, "Unregistered resource");
        Ok(entry.device)
    }

    /// The device registered under `name`
    pub fn get(&self, name: &ResourceName) -> Result<Arc<dyn Device>> {
        self.entry(name).map(|entry| entry.device)
    }

    /// The lock shared by sessions on `name`
    pub fn lock_for(&self, name: &ResourceName) -> Result<Arc<ResourceLock>> {
        self.entry(name).map(|entry| entry.lock)
    }

    /// Device and lock of `name` in one lookup
    pub fn resolve(&self, name: &ResourceName) -> Result<(Arc<dyn Device>, Arc<ResourceLock>)> {
        self.entry(name).map(|entry| (entry.device, entry.lock))
    }

    fn entry(&self, name: &ResourceName) -> Result<Entry> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VisaError::resource_not_found(name.to_string()))
    }

    /// Every registered name, in order
    pub fn names(&self) -> Vec<ResourceName> {
        self.entries.read().keys().cloned().collect()
    }

    /// Names matching a VISA resource expression.
    ///
    /// Fails with `ResourceNotFound` when nothing matches.
    pub fn list(&self, query: &str) -> Result<Vec<ResourceName>> {
        let mut found = Vec::new();
        for name in self.entries.read().keys() {
            if name.matches_query(query)? {
                found.push(name.clone());
            }
        }

        if found.is_empty() {
            return Err(VisaError::resource_not_found(query));
        }
        Ok(found)
    }

    /// Every name matching the default `?*::INSTR` query
    pub fn list_all(&self) -> Result<Vec<ResourceName>> {
        self.list(DEFAULT_QUERY)
    }

    /// Count registered resources
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Check if a name is registered
    pub fn contains(&self, name: &ResourceName) -> bool {
        self.entries.read().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{default_resources, Dmm, VoltageSource};

    fn name(s: &str) -> ResourceName {
        s.parse().unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = ResourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry
            .register(name("MOCK0::mock1::INSTR"), Arc::new(VoltageSource::new()))
            .is_none());

        let device = registry.get(&name("mock0::mock1::instr")).unwrap();
        assert!(device.type_name().ends_with("VoltageSource"));
        assert!(matches!(
            registry.get(&name("MOCK0::nothing::INSTR")),
            Err(VisaError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_replace_keeps_lock() {
        let registry = ResourceRegistry::new();
        let resource = name("MOCK0::mock1::INSTR");
        registry.register(resource.clone(), Arc::new(VoltageSource::new()));
        let lock = registry.lock_for(&resource).unwrap();

        let previous = registry.register(resource.clone(), Arc::new(Dmm::new()));
        assert!(previous.unwrap().type_name().ends_with("VoltageSource"));
        assert!(registry.get(&resource).unwrap().type_name().ends_with("Dmm"));
        assert!(Arc::ptr_eq(&lock, &registry.lock_for(&resource).unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = ResourceRegistry::new();
        let source = registry.register_instrument(name("MOCK0::mock1::INSTR"), VoltageSource::new());
        assert_eq!(source.gain(), 1.0);

        registry.unregister(&name("MOCK0::mock1::INSTR")).unwrap();
        assert!(!registry.contains(&name("MOCK0::mock1::INSTR")));
        assert!(registry.unregister(&name("MOCK0::mock1::INSTR")).is_err());
    }

    #[test]
    fn test_list_queries() {
        let registry = ResourceRegistry::new();
        registry.register_all(default_resources());

        assert_eq!(registry.list_all().unwrap().len(), 8);
        let picked: Vec<String> = registry
            .list("MOCK0::mock[1-3]::INSTR")
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            picked,
            vec!["MOCK0::mock1::INSTR", "MOCK0::mock2::INSTR", "MOCK0::mock3::INSTR"]
        );
        assert!(matches!(
            registry.list("?*::SOCKET"),
            Err(VisaError::ResourceNotFound(_))
        ));
    }
}
