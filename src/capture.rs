use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_FREQUENCY_HZ};
use crate::error::{Error, Result};
use crate::protocol::{self, BannerLine, Command, DeviceInfo, LineReader};
use crate::sample::{CaptureSummary, Sample};
use crate::serial::{self, SerialPort};
use crate::sink::{self, SampleSink};
use crate::terminal::{self, RawStdin};

/// Polled between reads; returning true ends the current phase.
pub trait StopSignal {
    fn should_stop(&mut self) -> bool;
}

impl<F: FnMut() -> bool> StopSignal for F {
    fn should_stop(&mut self) -> bool {
        self()
    }
}

/// Optional bounds on a capture besides the user stopping it.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Limits {
    pub max_samples: Option<u64>,
    pub duration: Option<Duration>,
}

impl Limits {
    pub fn from_config(config: &Config) -> Limits {
        Limits {
            max_samples: config.max_samples,
            duration: config.duration(),
        }
    }

    fn reached(&self, samples: u64, elapsed: Duration) -> bool {
        self.max_samples.is_some_and(|max| samples >= max)
            || self.duration.is_some_and(|limit| elapsed >= limit)
    }
}

/// Asks the firmware to (re)start streaming and returns the rate it will
/// actually run at.
pub fn request_stream<W: Write>(out: &mut W, requested: Option<u32>) -> Result<u32> {
    let hz = requested.unwrap_or(DEFAULT_FREQUENCY_HZ);
    let odr = protocol::device_odr(hz);
    if odr != hz {
        warn!("device has no {hz} Hz rate, it will sample at {odr} Hz");
    }
    Command::SetFrequency(hz).send(out).map_err(Error::Serial)?;
    debug!("sent F={hz}");
    Ok(odr)
}

/// Reads banner lines until the `time,` header shows up.
pub fn await_header<R, S>(
    lines: &mut LineReader<R>,
    timeout: Option<Duration>,
    stop: &mut S,
) -> Result<DeviceInfo>
where
    R: Read,
    S: StopSignal,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut device = DeviceInfo::default();
    loop {
        if stop.should_stop() {
            return Err(Error::NoHeader);
        }
        if let Some(line) = lines.next_line().map_err(Error::Serial)? {
            if protocol::is_header(&line) {
                debug!("got header: {line}");
                return Ok(device);
            }
            match device.absorb(&line) {
                Some(BannerLine::Register(name, value)) => debug!("{name} = {value:#04x}"),
                Some(BannerLine::Reinit(hz)) => info!("device reconfigured to {hz} Hz"),
                Some(BannerLine::Text(text)) => info!("device: {text}"),
                None => {}
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::NoHeader);
        }
    }
}

/// Turns sample lines into [`Sample`]s until stopped or a limit is hit.
pub fn stream<R, S>(
    lines: &mut LineReader<R>,
    sink: &mut dyn SampleSink,
    limits: Limits,
    stop: &mut S,
) -> Result<CaptureSummary>
where
    R: Read,
    S: StopSignal,
{
    let start = Instant::now();
    let mut samples = 0u64;
    loop {
        if stop.should_stop() || limits.reached(samples, start.elapsed()) {
            break;
        }
        let Some(line) = lines.next_line().map_err(Error::Serial)? else {
            continue;
        };
        match protocol::parse_sample(&line) {
            Some(raw) => {
                let sample = Sample::from_raw(raw, start.elapsed());
                sink.write_sample(&sample).map_err(Error::Output)?;
                samples += 1;
            }
            None => debug!("skipping line: {line}"),
        }
    }
    sink.finish().map_err(Error::Output)?;
    Ok(CaptureSummary {
        samples,
        elapsed: start.elapsed(),
    })
}

/// Runs one capture against the real device, start to finish.
pub fn run(config: &Config) -> Result<CaptureSummary> {
    if let Err(e) = terminal::install_interrupt_handler() {
        warn!("Ctrl-C will not stop the device cleanly: {e}");
    }

    let path = serial::resolve_port(config.port.as_deref());
    let port = SerialPort::open(&path, config.baud)?;
    info!("connected to {}", port.path().display());
    let mut commands = port.writer()?;

    let stdin = RawStdin::enable().unwrap_or_else(|e| {
        warn!("cannot watch stdin for Q: {e}");
        None
    });
    let mut user_stop = || {
        terminal::interrupted()
            || stdin
                .as_ref()
                .and_then(RawStdin::poll_key)
                .is_some_and(terminal::is_stop_key)
    };

    session(
        port,
        &mut commands,
        config,
        || sink::open(config.save.as_deref(), config.format),
        &mut user_stop,
    )
}

/// Everything after the port is open: request the stream, wait for the
/// header, capture, and tell the device to stop.
///
/// `Q` is sent on every path once `F=` went out, including failures.
pub fn session<R, W, F, K, S>(
    device: R,
    commands: &mut W,
    config: &Config,
    open_sink: F,
    stop: &mut S,
) -> Result<CaptureSummary>
where
    R: Read,
    W: Write,
    F: FnOnce() -> Result<K>,
    K: SampleSink,
    S: StopSignal,
{
    let mut lines = LineReader::new(device);
    let expected_odr = request_stream(commands, config.frequency())?;

    let device = match await_header(&mut lines, config.header_timeout(), stop) {
        Ok(device) => device,
        Err(e) => {
            stop_device(commands);
            return Err(e);
        }
    };
    if let Some(fw) = device.firmware() {
        info!("firmware: {fw}");
    }
    if let Some(id) = device.who_am_i() {
        debug!("WHO_AM_I = {id:#04x}");
    }
    if let Some(odr) = device.odr_hz.filter(|&odr| odr != expected_odr) {
        warn!("expected {expected_odr} Hz but device reports {odr} Hz");
    }

    eprintln!("Press Q to stop");

    let mut sink = match open_sink() {
        Ok(sink) => sink,
        Err(e) => {
            stop_device(commands);
            return Err(e);
        }
    };
    let result = stream(&mut lines, &mut sink, Limits::from_config(config), stop);
    let stopped = Command::Stop.send(commands);
    let summary = result?;
    stopped.map_err(Error::Serial)?;
    Ok(summary)
}

fn stop_device<W: Write>(commands: &mut W) {
    if let Err(e) = Command::Stop.send(commands) {
        debug!("could not send stop: {e}");
    }
}
