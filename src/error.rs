use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};

/// Everything that can stop a capture run.
///
/// Each variant maps to a fixed process exit code, see [`Error::exit_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// Help was requested or the arguments could not be parsed.
    /// Carries the rendered text, which always includes a `Usage:` line.
    #[error("{0}")]
    Usage(String),

    #[error(
        "Frequency must be between {min} and {max} Hz (got {requested})",
        min = MIN_FREQUENCY_HZ,
        max = MAX_FREQUENCY_HZ
    )]
    Frequency { requested: i64 },

    #[error("unsupported baud rate {0}")]
    BaudRate(u32),

    #[error("open serial {}: {source}", path.display())]
    OpenSerial { path: PathBuf, source: io::Error },

    #[error("configure serial {}: {source}", path.display())]
    ConfigureSerial { path: PathBuf, source: io::Error },

    #[error("duplicate serial handle: {0}")]
    CloneSerial(io::Error),

    #[error("No header from device. Is firmware running?")]
    NoHeader,

    #[error("open CSV file {}: {source}", path.display())]
    OutputFile { path: PathBuf, source: io::Error },

    #[error("serial I/O: {0}")]
    Serial(io::Error),

    #[error("write samples: {0}")]
    Output(io::Error),
}

impl Error {
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Usage(_) | Error::Frequency { .. } | Error::BaudRate(_) => 1,
            Error::OpenSerial { .. } => 2,
            Error::ConfigureSerial { .. } => 3,
            Error::CloneSerial(_) => 4,
            Error::NoHeader => 5,
            Error::OutputFile { .. } => 6,
            Error::Serial(_) => 7,
            Error::Output(_) => 8,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
