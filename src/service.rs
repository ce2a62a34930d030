//! Static description of the accessory service whose characteristics can
//! carry transitions.

use serde::{Deserialize, Serialize};

/// One numeric characteristic and its declared range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicDescriptor {
    pub id: u64,
    pub min: i32,
    pub max: i32,
}

impl CharacteristicDescriptor {
    pub fn new(id: u64, min: i32, max: i32) -> Self {
        Self { id, min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A service and the characteristics it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: u64,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(id: u64, characteristics: Vec<CharacteristicDescriptor>) -> Self {
        Self {
            id,
            characteristics,
        }
    }

    pub fn characteristic(&self, id: u64) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.characteristic(id).is_some()
    }

    /// Whether `lower..=upper` is a well-formed sub-range of characteristic `id`.
    pub fn range_is_valid(&self, id: u64, lower: i32, upper: i32) -> bool {
        self.characteristic(id)
            .is_some_and(|c| lower <= upper && c.contains(lower) && c.contains(upper))
    }
}
