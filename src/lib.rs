//! Host side of the LIS2DW12 USB accelerometer.
//!
//! Talks to the RP2040 firmware over its CDC serial port, sets the sampling
//! rate and streams timestamped X/Y/Z readings in g to stdout or a CSV file.

pub mod capture;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sample;
pub mod serial;
pub mod sink;
pub mod terminal;

pub use capture::run;
pub use config::{Config, OutputFormat};
pub use error::{Error, Result};
pub use sample::{CaptureSummary, Sample};
