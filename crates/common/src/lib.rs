//! Common utilities shared by the probe engine and the exporter binary.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
