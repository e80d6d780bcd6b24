//! The line protocol spoken by the RP2040 firmware.
//!
//! Host commands are CRLF terminated ASCII: `F=<hz>` reconfigures the
//! output data rate and starts the stream, `Q` stops it. The device answers
//! with a banner, a register dump, the `time,x,y,z` header and then one
//! `x,y,z` line per sample in milli-g.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::OnceLock;

use regex::Regex;

/// Longest line we keep, longer lines are truncated.
pub const MAX_LINE_LEN: usize = 127;

/// Prefix of the line that separates the banner from sample data.
pub const HEADER_PREFIX: &str = "time,";

/// Raw sensor reading in milli-g, as sent by the firmware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A command the host sends to the firmware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SetFrequency(u32),
    Stop,
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::SetFrequency(hz) => format!("F={hz}\r\n"),
            Command::Stop => "Q\r\n".to_owned(),
        }
    }

    pub fn send<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.encode().as_bytes())?;
        out.flush()
    }
}

/// The output data rate the firmware actually programs for a request.
///
/// CTRL_REG1 only offers a handful of rates, so the firmware picks the
/// nearest one. It clamps requests below 200 Hz up to 200 first.
pub fn device_odr(requested_hz: u32) -> u32 {
    match requested_hz {
        1500.. => 1600,
        700.. => 800,
        350.. => 400,
        _ => 200,
    }
}

pub fn is_header(line: &str) -> bool {
    line.starts_with(HEADER_PREFIX)
}

fn sample_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([+-]?\d+)\s*,\s*([+-]?\d+)\s*,\s*([+-]?\d+)").expect("valid sample regex")
    })
}

fn register_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Z][A-Z0-9_]*):\s*0x([0-9A-Fa-f]{1,2})\s*$").expect("valid register regex")
    })
}

fn reinit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Freq:\s*(\d+)\s*Hz").expect("valid reinit regex")
    })
}

/// Parses a `x,y,z` sample line. Trailing text after the third value is
/// ignored.
pub fn parse_sample(line: &str) -> Option<RawSample> {
    let caps = sample_re().captures(line)?;
    Some(RawSample {
        x: caps[1].parse().ok()?,
        y: caps[2].parse().ok()?,
        z: caps[3].parse().ok()?,
    })
}

/// What the firmware told us about itself before the stream started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Free-form banner lines, firmware version first.
    pub banner: Vec<String>,
    /// Register dump, e.g. `WHO_AM_I -> 0x44`.
    pub registers: BTreeMap<String, u8>,
    /// Rate announced by the firmware after a reinit.
    pub odr_hz: Option<u32>,
}

/// What a single banner line turned out to be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BannerLine {
    Register(String, u8),
    Reinit(u32),
    Text(String),
}

impl DeviceInfo {
    /// Classifies one banner line and records it.
    pub fn absorb(&mut self, line: &str) -> Option<BannerLine> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(caps) = register_re().captures(line) {
            let value = u8::from_str_radix(&caps[2], 16).ok()?;
            self.registers.insert(caps[1].to_owned(), value);
            return Some(BannerLine::Register(caps[1].to_owned(), value));
        }
        if let Some(hz) = reinit_re()
            .captures(line)
            .and_then(|caps| caps[1].parse().ok())
        {
            self.odr_hz = Some(hz);
            return Some(BannerLine::Reinit(hz));
        }
        self.banner.push(line.to_owned());
        Some(BannerLine::Text(line.to_owned()))
    }

    pub fn firmware(&self) -> Option<&str> {
        self.banner
            .iter()
            .find(|line| line.contains("FW"))
            .map(String::as_str)
    }

    pub fn who_am_i(&self) -> Option<u8> {
        self.registers.get("WHO_AM_I").copied()
    }
}

/// Assembles newline-terminated lines from a reader whose reads may time
/// out with zero bytes.
///
/// A partial line survives across timeouts. Carriage returns are dropped.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    buf: [u8; 256],
    start: usize,
    end: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> LineReader<R> {
        LineReader {
            inner,
            pending: Vec::with_capacity(MAX_LINE_LEN),
            buf: [0; 256],
            start: 0,
            end: 0,
        }
    }

    /// Returns the next complete line, or `None` when the underlying read
    /// came back empty before a newline arrived.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            while self.start < self.end {
                let byte = self.buf[self.start];
                self.start += 1;
                match byte {
                    b'\n' => {
                        let line = String::from_utf8_lossy(&self.pending).into_owned();
                        self.pending.clear();
                        return Ok(Some(line));
                    }
                    b'\r' => {}
                    _ if self.pending.len() < MAX_LINE_LEN => self.pending.push(byte),
                    _ => {}
                }
            }
            let n = match self.inner.read(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Ok(None);
            }
            self.start = 0;
            self.end = n;
        }
    }
}
