//! Volatile store for simulations and tests.

use std::collections::BTreeMap;

use super::KeyValueStore;
use crate::error::StoreError;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<(u8, u8), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, domain: u8, key: u8) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(&(domain, key)).cloned())
    }

    fn set(&mut self, domain: u8, key: u8, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert((domain, key), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, domain: u8, key: u8) -> Result<(), StoreError> {
        self.entries.remove(&(domain, key));
        Ok(())
    }

    fn purge_domain(&mut self, domain: u8) -> Result<(), StoreError> {
        self.entries.retain(|(d, _), _| *d != domain);
        Ok(())
    }
}
