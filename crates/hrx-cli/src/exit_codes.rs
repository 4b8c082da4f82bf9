//! Process exit codes

/// Success - every release expanded
pub const SUCCESS: u8 = 0;

/// General error - a chart could not be fetched or rendered
pub const ERROR: u8 = 1;

/// Invalid input - bad flags, credentials or resource documents
pub const INVALID_INPUT: u8 = 2;
