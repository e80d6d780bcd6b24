use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Routes Ctrl-C into a flag instead of killing the process, so the device
/// still gets its stop command.
pub fn install_interrupt_handler() -> io::Result<()> {
    let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
    if unsafe { libc::signal(libc::SIGINT, handler) } == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Stdin in non-canonical, no-echo mode with `VMIN=0, VTIME=0`, so single
/// key presses can be polled without blocking. The previous mode is
/// restored on drop.
///
/// File status flags stay untouched, stdout shares the tty's open file and
/// must remain blocking.
pub struct RawStdin {
    saved: libc::termios,
}

impl RawStdin {
    /// Returns `None` when stdin is not a terminal.
    pub fn enable() -> io::Result<Option<RawStdin>> {
        let fd = libc::STDIN_FILENO;
        if unsafe { libc::isatty(fd) } != 1 {
            return Ok(None);
        }
        unsafe {
            let mut saved: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut saved) != 0 {
                return Err(io::Error::last_os_error());
            }
            let raw = key_polling_mode(&saved);
            if libc::tcsetattr(fd, libc::TCSANOW, &raw) != 0 {
                return Err(io::Error::last_os_error());
            }
            debug!("stdin in raw mode");
            Ok(Some(RawStdin { saved }))
        }
    }

    /// Reads one pending key, if any.
    pub fn poll_key(&self) -> Option<u8> {
        let mut byte = 0u8;
        let n = unsafe { libc::read(libc::STDIN_FILENO, (&mut byte as *mut u8).cast(), 1) };
        (n == 1).then_some(byte)
    }
}

impl Drop for RawStdin {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
        }
        debug!("stdin restored");
    }
}

fn key_polling_mode(saved: &libc::termios) -> libc::termios {
    let mut raw = *saved;
    raw.c_lflag &= !(libc::ICANON | libc::ECHO);
    raw.c_cc[libc::VMIN] = 0;
    raw.c_cc[libc::VTIME] = 0;
    raw
}

pub fn is_stop_key(key: u8) -> bool {
    matches!(key, b'q' | b'Q')
}
