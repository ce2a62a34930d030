//! Durable transition records on top of a small key-value store.
//!
//! Each transition occupies one slot of [`KEYS_PER_TRANSITION`] consecutive
//! keys in [`STORAGE_DOMAIN`]:
//!
//! | offset | content                                  |
//! |--------|------------------------------------------|
//! | 0      | characteristic id, `u64` LE              |
//! | 1      | request time (logical ms), `u64` LE      |
//! | 3      | start-condition threshold, `i32` LE      |
//! | 4      | service id, `u64` LE                     |
//! | 5..    | encoded transition entry, 500-byte chunks |
//!
//! Key [`KEY_CLOCK_OFFSET`] holds the logical time of the last save so the
//! clock can resume after a restart.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::common::constants::{
    CHUNK_SIZE, KEY_CHARACTERISTIC_ID, KEY_CLOCK_OFFSET, KEY_FIRST_CHUNK, KEY_REQUEST_TIME,
    KEY_SERVICE_ID, KEY_THRESHOLD, KEYS_PER_TRANSITION, MAX_CHUNKS, MAX_STORAGE_SLOTS,
    STORAGE_DOMAIN,
};
use crate::error::{AdaptiveLightError, Result, StoreError};

/// Byte-value storage addressed by `(domain, key)`.
pub trait KeyValueStore {
    fn get(&self, domain: u8, key: u8) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    fn set(&mut self, domain: u8, key: u8, value: &[u8]) -> std::result::Result<(), StoreError>;

    /// Removing an absent key is not an error.
    fn remove(&mut self, domain: u8, key: u8) -> std::result::Result<(), StoreError>;

    fn purge_domain(&mut self, domain: u8) -> std::result::Result<(), StoreError>;
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for Box<K> {
    fn get(&self, domain: u8, key: u8) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        (**self).get(domain, key)
    }

    fn set(&mut self, domain: u8, key: u8, value: &[u8]) -> std::result::Result<(), StoreError> {
        (**self).set(domain, key, value)
    }

    fn remove(&mut self, domain: u8, key: u8) -> std::result::Result<(), StoreError> {
        (**self).remove(domain, key)
    }

    fn purge_domain(&mut self, domain: u8) -> std::result::Result<(), StoreError> {
        (**self).purge_domain(domain)
    }
}

/// A transition as laid out in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTransition {
    pub characteristic_id: u64,
    pub request_time: u64,
    /// Present for linear transitions only
    pub threshold: Option<i32>,
    pub service_id: u64,
    pub entry: Vec<u8>,
}

/// Slot indices to scan, never reaching the clock key.
fn slots(max_slots: usize) -> std::ops::Range<u8> {
    0..max_slots.min(MAX_STORAGE_SLOTS) as u8
}

fn slot_key(slot: u8, offset: u8) -> u8 {
    slot * KEYS_PER_TRANSITION + offset
}

fn decode_fixed<const N: usize>(key: u8, bytes: &[u8]) -> std::result::Result<[u8; N], StoreError> {
    bytes.try_into().map_err(|_| StoreError::Malformed {
        domain: STORAGE_DOMAIN,
        key,
        reason: format!("expected {N} bytes, found {}", bytes.len()),
    })
}

fn read_u64(store: &dyn KeyValueStore, key: u8) -> std::result::Result<Option<u64>, StoreError> {
    store
        .get(STORAGE_DOMAIN, key)?
        .map(|bytes| decode_fixed::<8>(key, &bytes).map(u64::from_le_bytes))
        .transpose()
}

fn read_i32(store: &dyn KeyValueStore, key: u8) -> std::result::Result<Option<i32>, StoreError> {
    store
        .get(STORAGE_DOMAIN, key)?
        .map(|bytes| decode_fixed::<4>(key, &bytes).map(i32::from_le_bytes))
        .transpose()
}

/// Slot holding `characteristic_id`, else the first empty slot.
fn find_slot(
    store: &dyn KeyValueStore,
    max_slots: usize,
    characteristic_id: u64,
) -> Result<Option<u8>> {
    let mut first_empty = None;
    for slot in slots(max_slots) {
        match read_u64(store, slot_key(slot, KEY_CHARACTERISTIC_ID)) {
            Ok(Some(id)) if id == characteristic_id => return Ok(Some(slot)),
            Ok(Some(_)) => {}
            Ok(None) => {
                first_empty.get_or_insert(slot);
            }
            Err(StoreError::Malformed { .. }) => {
                first_empty.get_or_insert(slot);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(first_empty)
}

/// Write `record` and the current logical time.
///
/// Running out of slots is logged and otherwise ignored; the transition stays
/// live but will not survive a restart.
pub fn save_record(
    store: &mut dyn KeyValueStore,
    max_slots: usize,
    record: &PersistedTransition,
    logical_now: u64,
) -> Result<()> {
    if record.entry.len() > CHUNK_SIZE * MAX_CHUNKS {
        return Err(AdaptiveLightError::out_of_resources(format!(
            "encoded transition of {} bytes does not fit in storage",
            record.entry.len()
        )));
    }

    let Some(slot) = find_slot(store, max_slots, record.characteristic_id)? else {
        log_error!(
            "No storage slot left for characteristic {}, transition will not be persisted",
            record.characteristic_id
        );
        return Ok(());
    };

    store.set(
        STORAGE_DOMAIN,
        slot_key(slot, KEY_CHARACTERISTIC_ID),
        &record.characteristic_id.to_le_bytes(),
    )?;
    store.set(
        STORAGE_DOMAIN,
        slot_key(slot, KEY_REQUEST_TIME),
        &record.request_time.to_le_bytes(),
    )?;
    match record.threshold {
        Some(threshold) => store.set(
            STORAGE_DOMAIN,
            slot_key(slot, KEY_THRESHOLD),
            &threshold.to_le_bytes(),
        )?,
        None => store.remove(STORAGE_DOMAIN, slot_key(slot, KEY_THRESHOLD))?,
    }
    store.set(
        STORAGE_DOMAIN,
        slot_key(slot, KEY_SERVICE_ID),
        &record.service_id.to_le_bytes(),
    )?;

    let chunks: Vec<&[u8]> = record.entry.chunks(CHUNK_SIZE).collect();
    for i in 0..MAX_CHUNKS {
        let key = slot_key(slot, KEY_FIRST_CHUNK + i as u8);
        match chunks.get(i) {
            Some(chunk) => store.set(STORAGE_DOMAIN, key, chunk)?,
            // Drop leftovers of a longer previous record
            None => store.remove(STORAGE_DOMAIN, key)?,
        }
    }

    save_clock(store, logical_now)?;
    log_debug!(
        "Persisted transition for characteristic {} in slot {} ({} bytes)",
        record.characteristic_id,
        slot,
        record.entry.len()
    );
    Ok(())
}

/// Erase the record of `characteristic_id`, if any. Failures are logged.
pub fn remove_record(store: &mut dyn KeyValueStore, max_slots: usize, characteristic_id: u64) {
    for slot in slots(max_slots) {
        let key = slot_key(slot, KEY_CHARACTERISTIC_ID);
        match read_u64(store, key) {
            Ok(Some(id)) if id == characteristic_id => {
                for offset in 0..KEYS_PER_TRANSITION {
                    if let Err(e) = store.remove(STORAGE_DOMAIN, slot_key(slot, offset)) {
                        log_warning!(
                            "Failed to remove key 0x{:02X} of characteristic {}: {}",
                            slot_key(slot, offset),
                            characteristic_id,
                            e
                        );
                    }
                }
                log_debug!("Removed persisted transition for characteristic {characteristic_id}");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                log_warning!("Failed to read storage slot {}: {}", slot, e);
            }
        }
    }
}

fn load_slot(store: &dyn KeyValueStore, slot: u8) -> std::result::Result<Option<PersistedTransition>, StoreError> {
    let Some(characteristic_id) = read_u64(store, slot_key(slot, KEY_CHARACTERISTIC_ID))? else {
        return Ok(None);
    };
    let request_time = read_u64(store, slot_key(slot, KEY_REQUEST_TIME))?.unwrap_or(0);
    let threshold = read_i32(store, slot_key(slot, KEY_THRESHOLD))?;
    let service_id = read_u64(store, slot_key(slot, KEY_SERVICE_ID))?.unwrap_or(0);

    let mut entry = Vec::new();
    for i in 0..MAX_CHUNKS {
        match store.get(STORAGE_DOMAIN, slot_key(slot, KEY_FIRST_CHUNK + i as u8))? {
            Some(chunk) => entry.extend_from_slice(&chunk),
            None => break,
        }
    }
    if entry.is_empty() {
        return Ok(None);
    }

    Ok(Some(PersistedTransition {
        characteristic_id,
        request_time,
        threshold,
        service_id,
        entry,
    }))
}

/// Every readable record, in slot order. Malformed slots are skipped.
pub fn load_records(store: &dyn KeyValueStore, max_slots: usize) -> Result<Vec<PersistedTransition>> {
    let mut records = Vec::new();
    for slot in slots(max_slots) {
        match load_slot(store, slot) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e @ StoreError::Malformed { .. }) => {
                log_warning!("Skipping storage slot {}: {}", slot, e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}

pub fn save_clock(store: &mut dyn KeyValueStore, logical_now: u64) -> Result<()> {
    store.set(STORAGE_DOMAIN, KEY_CLOCK_OFFSET, &logical_now.to_le_bytes())?;
    Ok(())
}

pub fn load_clock(store: &dyn KeyValueStore) -> Result<Option<u64>> {
    match read_u64(store, KEY_CLOCK_OFFSET) {
        Ok(value) => Ok(value),
        Err(e @ StoreError::Malformed { .. }) => {
            log_warning!("Ignoring persisted clock: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove every record and the persisted clock.
pub fn clear(store: &mut dyn KeyValueStore) -> Result<()> {
    store.purge_domain(STORAGE_DOMAIN)?;
    Ok(())
}
