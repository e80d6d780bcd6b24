use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::serial;

/// Lowest output data rate the host accepts.
pub const MIN_FREQUENCY_HZ: u32 = 200;
/// Highest output data rate the host accepts.
pub const MAX_FREQUENCY_HZ: u32 = 1600;
/// The firmware boots at 1600 Hz, so that is what we ask for when nothing
/// was requested.
pub const DEFAULT_FREQUENCY_HZ: u32 = 1600;

pub const DEFAULT_BAUD: u32 = 2_000_000;
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";
pub const PORT_ENV: &str = "LIS2DWUSB_PORT";

/// How samples are rendered on stdout when no CSV file is given.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Csv,
    Json,
}

// Capture accelerometer samples from a LIS2DW12 behind an RP2040 USB bridge.
#[derive(Parser, Debug)]
#[command(name = "lis2dwusb", author, version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct Config {
    /// Save output to CSV file
    #[arg(short, long, value_name = "file.csv")]
    pub save: Option<PathBuf>,
    /// Sampling frequency (200-1600 Hz)
    #[arg(short, long, value_name = "freq", allow_negative_numbers = true)]
    pub frequency: Option<i64>,
    /// Serial device [default: first /dev/ttyACM* found]
    #[arg(short, long, env = PORT_ENV)]
    pub port: Option<PathBuf>,
    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Stdout format when no CSV file is given
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Seconds to wait for the stream header, 0 waits until interrupted
    #[arg(long, value_name = "secs", default_value = "5", value_parser = parse_secs)]
    pub header_timeout: Duration,
    /// Stop after this many samples
    #[arg(short = 'n', long)]
    pub max_samples: Option<u64>,
    /// Stop after this many seconds
    #[arg(short, long, value_name = "secs", value_parser = parse_secs)]
    pub duration: Option<Duration>,
    /// More log output, repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    /// Print help
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub help: bool,
}

impl Config {
    /// Parses and validates the command line.
    ///
    /// `-h` and parse failures come back as [`Error::Usage`] so the caller
    /// decides where the text goes. `-V` prints the version and exits.
    pub fn from_args<I, T>(args: I) -> Result<Config>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = match Config::try_parse_from(args) {
            Ok(config) => config,
            Err(err) if err.kind() == ErrorKind::DisplayVersion => err.exit(),
            Err(err) => {
                let rendered = err.render().to_string();
                let reason = rendered.lines().next().unwrap_or_default();
                return Err(Error::Usage(format!("{reason}\n\n{}", Config::usage())));
            }
        };
        if config.help {
            return Err(Error::Usage(Config::usage()));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn usage() -> String {
        Config::command().render_help().to_string()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(requested) = self.frequency {
            let range = i64::from(MIN_FREQUENCY_HZ)..=i64::from(MAX_FREQUENCY_HZ);
            if requested != 0 && !range.contains(&requested) {
                return Err(Error::Frequency { requested });
            }
        }
        if serial::speed_for(self.baud).is_none() {
            return Err(Error::BaudRate(self.baud));
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(Error::Usage(format!(
                "duration must be a positive number of seconds\n\n{}",
                Config::usage()
            )));
        }
        Ok(())
    }

    /// The validated frequency, `None` when not given or given as 0.
    pub fn frequency(&self) -> Option<u32> {
        self.frequency
            .filter(|&hz| hz != 0)
            .and_then(|hz| u32::try_from(hz).ok())
    }

    pub fn header_timeout(&self) -> Option<Duration> {
        (!self.header_timeout.is_zero()).then_some(self.header_timeout)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

/// Parses fractional seconds, rejecting values `Duration` cannot hold.
fn parse_secs(arg: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = arg
        .parse()
        .map_err(|_| format!("`{arg}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("`{arg}` seconds: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        Config::from_args(std::iter::once("lis2dwusb").chain(args.iter().copied()))
    }

    #[test]
    fn help_is_a_usage_error() {
        let err = parse(&["-h"]).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert!(err.to_string().contains("Usage:"));
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn unknown_flag_shows_usage() {
        let err = parse(&["-x"]).unwrap_err();
        assert!(err.to_string().contains("Usage:"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn non_numeric_frequency_shows_usage() {
        let err = parse(&["-f", "fast"]).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert!(err.to_string().contains("Usage:"));
    }

    #[test]
    fn frequency_bounds() {
        for bad in ["50", "199", "1601", "-5"] {
            let err = parse(&["-f", bad]).unwrap_err();
            assert!(
                err.to_string().starts_with("Frequency must be between"),
                "{bad}: {err}"
            );
        }
        assert_eq!(parse(&["-f", "200"]).unwrap().frequency(), Some(200));
        assert_eq!(parse(&["-f", "1600"]).unwrap().frequency(), Some(1600));
    }

    #[test]
    fn zero_frequency_means_unset() {
        assert_eq!(parse(&["-f", "0"]).unwrap().frequency(), None);
        assert_eq!(parse(&[]).unwrap().frequency(), None);
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.baud, DEFAULT_BAUD);
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.header_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.duration(), None);
        assert!(config.save.is_none());
    }

    #[test]
    fn zero_header_timeout_waits_forever() {
        let config = parse(&["--header-timeout", "0"]).unwrap();
        assert_eq!(config.header_timeout(), None);
    }

    #[test]
    fn rejects_unsupported_baud() {
        let err = parse(&["-b", "12345"]).unwrap_err();
        assert!(matches!(err, Error::BaudRate(12345)));
    }

    #[test]
    fn huge_timeouts_are_usage_errors() {
        for args in [["--header-timeout", "1e30"], ["-d", "1e30"]] {
            let err = parse(&args).unwrap_err();
            assert!(matches!(err, Error::Usage(_)), "{args:?}: {err}");
            assert!(err.to_string().contains("Usage:"));
        }
    }

    #[test]
    fn fractional_seconds() {
        let config = parse(&["--header-timeout", "0.25", "-d", "1.5"]).unwrap();
        assert_eq!(config.header_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.duration(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn rejects_non_positive_duration() {
        let err = parse(&["-d", "0"]).unwrap_err();
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn save_and_format() {
        let config = parse(&["-s", "out.csv", "--format", "json", "-vv"]).unwrap();
        assert_eq!(config.save, Some(PathBuf::from("out.csv")));
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.verbose, 2);
    }
}
