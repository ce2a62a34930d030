//! Fixed-capacity slot allocators.
//!
//! A [`Slab`] hands out stable [`SlotId`]s that stay valid while other slots
//! are allocated or released. [`TransitionStore`] pairs a transition slab with
//! the point slab its transitions draw from. The engine owns one live store and
//! builds a throwaway staging store for every incoming request.

use serde::Serialize;

use super::{Transition, TransitionPoint};
use crate::error::{AdaptiveLightError, Result};

/// Index of an occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

pub type PointId = SlotId;

/// Fixed-capacity pool with first-free allocation.
#[derive(Debug, Clone)]
pub struct Slab<T> {
    slots: Vec<Option<T>>,
    used: usize,
}

impl<T> Slab<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.used
    }

    /// Store `value` in the first free slot, or hand it back when full.
    pub fn insert(&mut self, value: T) -> std::result::Result<SlotId, T> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(value);
                self.used += 1;
                Ok(SlotId(index))
            }
            None => Err(value),
        }
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let taken = self.slots.get_mut(id.0)?.take();
        if taken.is_some() {
            self.used -= 1;
        }
        taken
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|value| (SlotId(i), value)))
    }

    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

/// Transitions plus the point pool they share.
#[derive(Debug, Clone)]
pub struct TransitionStore {
    pub transitions: Slab<Transition>,
    pub points: Slab<TransitionPoint>,
}

impl TransitionStore {
    pub fn new(max_transitions: usize, max_points: usize) -> Self {
        Self {
            transitions: Slab::with_capacity(max_transitions),
            points: Slab::with_capacity(max_points),
        }
    }

    pub fn find(&self, characteristic_id: u64) -> Option<SlotId> {
        self.transitions
            .iter()
            .find(|(_, t)| t.characteristic_id == characteristic_id)
            .map(|(id, _)| id)
    }

    pub fn get(&self, id: SlotId) -> Option<&Transition> {
        self.transitions.get(id)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut Transition> {
        self.transitions.get_mut(id)
    }

    pub fn by_characteristic(&self, characteristic_id: u64) -> Option<&Transition> {
        self.find(characteristic_id).and_then(|id| self.get(id))
    }

    /// Borrow a transition together with the point pool.
    pub fn split_mut(
        &mut self,
        id: SlotId,
    ) -> Option<(&mut Transition, &mut Slab<TransitionPoint>)> {
        let transition = self.transitions.get_mut(id)?;
        Some((transition, &mut self.points))
    }

    pub fn num_transitions(&self) -> usize {
        self.transitions.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn allocate(&mut self, transition: Transition) -> Result<SlotId> {
        self.transitions.insert(transition).map_err(|t| {
            AdaptiveLightError::out_of_resources(format!(
                "no space left for a transition on characteristic {}",
                t.characteristic_id
            ))
        })
    }

    /// Allocate `point` and append it to transition `id`.
    pub fn push_point(&mut self, id: SlotId, point: TransitionPoint) -> Result<PointId> {
        if self.transitions.get(id).is_none() {
            return Err(AdaptiveLightError::invalid("point added to a released transition"));
        }
        let point_id = self.points.insert(point).map_err(|_| {
            AdaptiveLightError::out_of_resources("no space left for a transition point")
        })?;
        if let Some(transition) = self.transitions.get_mut(id) {
            transition.points.push(point_id);
        }
        Ok(point_id)
    }

    /// Free transition `id` and all of its points.
    pub fn release(&mut self, id: SlotId) -> Option<Transition> {
        let mut transition = self.transitions.remove(id)?;
        for point_id in transition.points.drain(..) {
            self.points.remove(point_id);
        }
        Some(transition)
    }

    /// Copies of the points of transition `id`, in order.
    pub fn points_of(&self, id: SlotId) -> Vec<TransitionPoint> {
        self.get(id)
            .map(|t| {
                t.points
                    .iter()
                    .filter_map(|pid| self.points.get(*pid).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy transition `id` of `other` into this store.
    ///
    /// On failure nothing of the copy remains allocated.
    pub fn copy_from(&mut self, other: &TransitionStore, id: SlotId) -> Result<SlotId> {
        let source = other
            .get(id)
            .ok_or_else(|| AdaptiveLightError::invalid("staged transition is missing"))?;

        let mut header = source.clone();
        header.points.clear();
        let new_id = self.allocate(header)?;

        for point in other.points_of(id) {
            if let Err(e) = self.push_point(new_id, point) {
                self.release(new_id);
                return Err(e);
            }
        }
        Ok(new_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Transition)> {
        self.transitions.iter()
    }
}

/// Resolve point `index` of `transition`, treating a dangling reference as
/// corrupted state.
pub fn point_at<'a>(
    transition: &Transition,
    points: &'a Slab<TransitionPoint>,
    index: usize,
) -> Result<&'a TransitionPoint> {
    transition
        .points
        .get(index)
        .and_then(|id| points.get(*id))
        .ok_or_else(|| {
            AdaptiveLightError::invalid(format!(
                "transition {} has no point #{index}",
                transition.characteristic_id
            ))
        })
}

pub fn point_at_mut<'a>(
    transition: &Transition,
    points: &'a mut Slab<TransitionPoint>,
    index: usize,
) -> Result<&'a mut TransitionPoint> {
    let id = *transition.points.get(index).ok_or_else(|| {
        AdaptiveLightError::invalid(format!(
            "transition {} has no point #{index}",
            transition.characteristic_id
        ))
    })?;
    points.get_mut(id).ok_or_else(|| {
        AdaptiveLightError::invalid(format!(
            "point #{index} of transition {} was released",
            transition.characteristic_id
        ))
    })
}
