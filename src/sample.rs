use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::RawSample;

/// g per milli-g unit sent by the firmware.
const G_PER_MG: f32 = 0.001;

/// One accelerometer reading stamped with the time since capture start.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    /// Seconds since the stream started.
    pub time: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    pub fn from_raw(raw: RawSample, elapsed: Duration) -> Sample {
        Sample {
            time: elapsed.as_secs_f64(),
            x: raw.x as f32 * G_PER_MG,
            y: raw.y as f32 * G_PER_MG,
            z: raw.z as f32 * G_PER_MG,
        }
    }
}

/// Totals reported when a capture ends.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CaptureSummary {
    pub samples: u64,
    pub elapsed: Duration,
}

impl CaptureSummary {
    pub fn rate_hz(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Captured {} samples in {:.2} s = {:.1} Hz",
            self.samples,
            self.elapsed.as_secs_f64(),
            self.rate_hz()
        )
    }
}
