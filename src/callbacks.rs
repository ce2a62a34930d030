//! Host-facing callbacks invoked by the engine.

#[cfg(test)]
use mockall::automock;

/// What the engine needs from the surrounding accessory.
#[cfg_attr(test, automock)]
pub trait TransitionCallbacks {
    /// Push an interpolated value into the accessory's live characteristic
    /// state, optionally notifying subscribed controllers.
    fn value_update(&mut self, characteristic_id: u64, value: i32, notify: bool);

    /// The number of live transitions changed.
    fn transition_count_changed(&mut self);

    /// Current value of any characteristic. Used for initial values and as the
    /// fallback source of derived transitions.
    fn value_request(&mut self, characteristic_id: u64) -> i32;
}

/// Callbacks backed by an in-memory value table, used by the CLI and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingCallbacks {
    pub values: std::collections::BTreeMap<u64, i32>,
    pub updates: Vec<ValueUpdate>,
    pub count_changes: usize,
    pub echo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueUpdate {
    pub characteristic_id: u64,
    pub value: i32,
    pub notify: bool,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, characteristic_id: u64, value: i32) -> Self {
        self.values.insert(characteristic_id, value);
        self
    }

    /// Log every update as it arrives.
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn last_value(&self, characteristic_id: u64) -> Option<i32> {
        self.values.get(&characteristic_id).copied()
    }

    pub fn updates_for(&self, characteristic_id: u64) -> impl Iterator<Item = &ValueUpdate> {
        self.updates
            .iter()
            .filter(move |update| update.characteristic_id == characteristic_id)
    }
}

impl TransitionCallbacks for RecordingCallbacks {
    fn value_update(&mut self, characteristic_id: u64, value: i32, notify: bool) {
        if self.echo {
            log_decorated!(
                "Characteristic {} = {}{}",
                characteristic_id,
                value,
                if notify { " (notify)" } else { "" }
            );
        }
        self.values.insert(characteristic_id, value);
        self.updates.push(ValueUpdate {
            characteristic_id,
            value,
            notify,
        });
    }

    fn transition_count_changed(&mut self) {
        self.count_changes += 1;
    }

    fn value_request(&mut self, characteristic_id: u64) -> i32 {
        self.values.get(&characteristic_id).copied().unwrap_or(0)
    }
}
