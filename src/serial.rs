use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use glob::glob;
use tracing::{debug, warn};

use crate::config::DEFAULT_PORT;
use crate::error::{Error, Result};

/// Where the RP2040's CDC ACM interface shows up on Linux.
const PORT_PATTERN: &str = "/dev/ttyACM*";

/// Time the firmware needs after a flush before it listens again.
const SETTLE: Duration = Duration::from_millis(100);

/// Maps a baud rate to its termios speed constant.
pub fn speed_for(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921600 => libc::B921600,
        #[cfg(target_os = "linux")]
        1_000_000 => libc::B1000000,
        #[cfg(target_os = "linux")]
        2_000_000 => libc::B2000000,
        #[cfg(target_os = "linux")]
        3_000_000 => libc::B3000000,
        #[cfg(target_os = "linux")]
        4_000_000 => libc::B4000000,
        _ => return None,
    };
    Some(speed)
}

/// Lists candidate device ports in glob order.
pub fn find_ports() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let entries = match glob(PORT_PATTERN) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("bad port pattern {PORT_PATTERN}: {e}");
            return paths;
        }
    };
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => debug!("skipping unreadable port: {e}"),
        }
    }
    paths
}

/// Picks the explicit port, or the first discovered one, or the usual default.
pub fn resolve_port(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match find_ports().into_iter().next() {
        Some(path) => {
            debug!("found port {}", path.display());
            path
        }
        None => PathBuf::from(DEFAULT_PORT),
    }
}

/// An open, configured serial line to the device.
///
/// Reads time out after 100 ms with zero bytes, so callers can poll for
/// stop conditions between reads.
#[derive(Debug)]
pub struct SerialPort {
    path: PathBuf,
    file: File,
}

impl SerialPort {
    pub fn open(path: &Path, baud: u32) -> Result<SerialPort> {
        let speed = speed_for(baud).ok_or(Error::BaudRate(baud))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| Error::OpenSerial {
                path: path.to_path_buf(),
                source,
            })?;
        configure(&file, speed).map_err(|source| Error::ConfigureSerial {
            path: path.to_path_buf(),
            source,
        })?;
        flush_input(&file).map_err(|source| Error::ConfigureSerial {
            path: path.to_path_buf(),
            source,
        })?;
        thread::sleep(SETTLE);
        debug!("opened {} at {baud} baud", path.display());
        Ok(SerialPort {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Splits off an independent handle for writing commands.
    pub fn writer(&self) -> Result<File> {
        self.file.try_clone().map_err(Error::CloneSerial)
    }
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Raw 8N1, no flow control, 100 ms inter-read timeout.
fn configure(file: &File, speed: libc::speed_t) -> io::Result<()> {
    let fd = file.as_raw_fd();
    unsafe {
        let mut tty: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tty) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::cfsetospeed(&mut tty, speed) != 0 || libc::cfsetispeed(&mut tty, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        tty.c_cflag = (tty.c_cflag & !libc::CSIZE) | libc::CS8 | libc::CLOCAL | libc::CREAD;
        tty.c_iflag = libc::IGNPAR;
        tty.c_lflag = 0;
        tty.c_oflag = 0;
        tty.c_cc[libc::VMIN] = 0;
        tty.c_cc[libc::VTIME] = 1;
        if libc::tcsetattr(fd, libc::TCSANOW, &tty) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn flush_input(file: &File) -> io::Result<()> {
    if unsafe { libc::tcflush(file.as_raw_fd(), libc::TCIFLUSH) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_baud_is_supported() {
        assert!(speed_for(crate::config::DEFAULT_BAUD).is_some());
        assert!(speed_for(115200).is_some());
        assert!(speed_for(12345).is_none());
    }

    #[test]
    fn explicit_port_wins() {
        let port = resolve_port(Some(Path::new("/dev/ttyUSB3")));
        assert_eq!(port, PathBuf::from("/dev/ttyUSB3"));
    }

    #[test]
    fn discovered_ports_match_pattern() {
        for path in find_ports() {
            let name = path.to_string_lossy().into_owned();
            assert!(name.starts_with("/dev/ttyACM"), "{name}");
        }
    }

    #[test]
    fn missing_device_is_an_open_error() {
        let err = SerialPort::open(Path::new("/nonexistent/ttyACM9"), 115200).unwrap_err();
        assert!(matches!(err, Error::OpenSerial { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn regular_file_cannot_be_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-tty");
        std::fs::write(&path, b"").unwrap();
        let err = SerialPort::open(&path, 115200).unwrap_err();
        assert!(matches!(err, Error::ConfigureSerial { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
