//! Application-wide constants and defaults.
//!
//! Capacity and timing defaults for the transition engine, the persisted key
//! layout, wire-format limits, and the validation bounds used by the config
//! loader.

// # Engine Capacity Defaults

/// Maximum number of concurrently live transitions
pub const DEFAULT_MAX_TRANSITIONS: usize = 2;

/// Maximum number of transition points shared by all live transitions
pub const DEFAULT_MAX_TRANSITION_POINTS: usize = 52;

/// Upper bound accepted for `max_transitions` in the config file
pub const MAXIMUM_TRANSITIONS: usize = 16;

/// Upper bound accepted for `max_transition_points` in the config file
pub const MAXIMUM_TRANSITION_POINTS: usize = 1024;

// # Timing Defaults (milliseconds)

/// Default interval between value recomputations while a point is active
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 60_000;

/// Points after the first must take at least this long to complete
pub const MIN_TARGET_COMPLETION_DURATION_MS: u64 = 100;

/// Longest update interval accepted from the config file
pub const MAXIMUM_UPDATE_INTERVAL_MS: u64 = 3_600_000;

/// How often the logical clock is written to storage (seconds)
pub const DEFAULT_CLOCK_PERSIST_INTERVAL_SECS: u64 = 600;

pub const MINIMUM_CLOCK_PERSIST_INTERVAL_SECS: u64 = 10;
pub const MAXIMUM_CLOCK_PERSIST_INTERVAL_SECS: u64 = 86_400;

/// Whether the host clock survives a restart by default
pub const DEFAULT_CLOCK_PERSISTS: bool = false;

// # Wire Format Limits

/// Largest controller context blob a transition may carry
pub const MAX_CONTROLLER_CONTEXT_BYTES: usize = 256;

/// Largest encoded size of a single transition in a start request
pub const MAX_TRANSITION_TLV_BYTES: usize = 1500;

/// Size limit for any encoded read response
pub const MAX_RESPONSE_BYTES: usize = 4096;

// # Persisted Layout

/// Storage domain holding transitions and the clock offset
pub const STORAGE_DOMAIN: u8 = 0x01;

/// Keys reserved per transition slot
pub const KEYS_PER_TRANSITION: u8 = 14;

/// Offsets of the fixed fields inside a slot
pub const KEY_CHARACTERISTIC_ID: u8 = 0;
pub const KEY_REQUEST_TIME: u8 = 1;
pub const KEY_THRESHOLD: u8 = 3;
pub const KEY_SERVICE_ID: u8 = 4;

/// First chunk key inside a slot
pub const KEY_FIRST_CHUNK: u8 = 5;

/// Bytes stored per chunk key
pub const CHUNK_SIZE: usize = 500;

/// Chunk keys available per slot
pub const MAX_CHUNKS: usize = 9;

/// Key holding the persisted logical clock value
pub const KEY_CLOCK_OFFSET: u8 = 0xF0;

/// Slots that fit below the clock key
pub const MAX_STORAGE_SLOTS: usize = (KEY_CLOCK_OFFSET / KEYS_PER_TRANSITION) as usize;

// # Service Defaults

pub const DEFAULT_SERVICE_ID: u64 = 0x10;

/// Characteristics written into a freshly generated config file
pub const DEFAULT_BRIGHTNESS_ID: u64 = 0x12;
pub const DEFAULT_BRIGHTNESS_RANGE: (i32, i32) = (0, 100);
pub const DEFAULT_BRIGHTNESS_INITIAL: i32 = 100;
pub const DEFAULT_COLOR_TEMPERATURE_ID: u64 = 0x13;
pub const DEFAULT_COLOR_TEMPERATURE_RANGE: (i32, i32) = (140, 500);
pub const DEFAULT_COLOR_TEMPERATURE_INITIAL: i32 = 300;

// # File Locations

pub const APP_DIR_NAME: &str = "adaptive-light";
pub const CONFIG_FILE_NAME: &str = "adaptive-light.toml";
pub const STORAGE_FILE_NAME: &str = "transitions.json";

// # Exit Codes

pub const EXIT_FAILURE: i32 = 1;

// # Runtime

/// Longest single sleep of the host loop, so shutdown requests are noticed
pub const MAX_SLEEP_SLICE_MS: u64 = 250;
