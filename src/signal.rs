//! SIGINT/SIGTERM trapping
//!
//! The handler only raises the shared interrupt flag; the runner and the
//! poller notice it at their next checkpoint. A second signal while the flag
//! is already raised exits immediately with status 130.

use anyhow::Result;
use control::Interrupt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

/// Exit status for an interrupted run
pub const EXIT_INTERRUPTED: u8 = 130;

static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[cfg(unix)]
#[allow(unsafe_code)]
extern "C" fn on_signal(_signum: libc::c_int) {
    if let Some(flag) = FLAG.get()
        && flag.swap(true, std::sync::atomic::Ordering::SeqCst)
    {
        // SAFETY: _exit is async-signal-safe
        unsafe { libc::_exit(i32::from(EXIT_INTERRUPTED)) };
    }
}

/// Install the handlers and return the interrupt they raise.
///
/// Calling this more than once returns the same flag.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn install() -> Result<Interrupt> {
    let flag = FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)));

    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only touches an already-initialized atomic
        let previous = unsafe { libc::signal(signum, handler) };
        if previous == libc::SIG_ERR {
            anyhow::bail!("Failed to install handler for signal {}", signum);
        }
    }

    log::debug!("signal handlers installed");
    Ok(Interrupt::from_flag(Arc::clone(flag)))
}

/// No handlers on this platform; the flag is never raised by a signal.
#[cfg(not(unix))]
pub fn install() -> Result<Interrupt> {
    let flag = FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)));
    log::debug!("signal handling not supported on this platform");
    Ok(Interrupt::from_flag(Arc::clone(flag)))
}
