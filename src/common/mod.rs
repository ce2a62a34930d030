// Shared infrastructure: logging and constants.
// Logger must be first for macro availability
#[macro_use]
pub mod logger;

pub mod constants;
