//! # Error Handling
//!
//! Error taxonomy shared by every manager, store and exporter.

pub mod types;

pub use types::{ErrorKind, Result, SwitchyardError};
