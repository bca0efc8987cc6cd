//! Deferred Unix signal handling. The raw handler only records the
//! signal number; [`process_pending_signal`] runs in the main loop and
//! takes the real action. Tool main loops sample [`quit_requested`]
//! between events and wind down cleanly.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use tracing::warn;

pub const CMD_QUIT: u32 = 1 << 0;
pub const CMD_CHLD: u32 = 1 << 1;
pub const CMD_ALRM: u32 = 1 << 2;

static CMD: AtomicU32 = AtomicU32::new(0);
static PENDING: AtomicI32 = AtomicI32::new(0);
static INSTALLED: AtomicBool = AtomicBool::new(false);

pub fn check(bit: u32) -> bool {
    CMD.load(Ordering::SeqCst) & bit != 0
}

pub fn set(bit: u32) {
    CMD.fetch_or(bit, Ordering::SeqCst);
}

pub fn clear(bit: u32) {
    CMD.fetch_and(!bit, Ordering::SeqCst);
}

pub fn quit_requested() -> bool {
    check(CMD_QUIT)
}

/// Async-signal-safe: stores the signal number, nothing else.
#[cfg(unix)]
extern "C" fn record_signal(signum: libc::c_int) {
    PENDING.store(signum, Ordering::SeqCst);
}

/// Intercept the typical termination signals. Safe to call more than
/// once; only the first call installs handlers.
#[cfg(unix)]
pub fn init_signal_handling() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    unsafe {
        let mut act: libc::sigaction = std::mem::zeroed();
        act.sa_sigaction = record_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut act.sa_mask);
        for sig in [
            libc::SIGHUP,
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGTERM,
            libc::SIGPIPE,
            libc::SIGALRM,
            libc::SIGCHLD,
        ] {
            libc::sigaddset(&mut act.sa_mask, sig);
        }
        for sig in [
            libc::SIGHUP,
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGTERM,
            libc::SIGPIPE,
            libc::SIGALRM,
            libc::SIGCHLD,
        ] {
            libc::sigaction(sig, &act, std::ptr::null_mut());
        }
    }
}

#[cfg(not(unix))]
pub fn init_signal_handling() {}

/// Runs in the normal control flow, between events. Interrupt and
/// broken-pipe exit immediately (after temp-file cleanup); the
/// termination family sets `CMD_QUIT` for the main loop to notice.
#[cfg(unix)]
pub fn process_pending_signal() {
    let sig = PENDING.swap(0, Ordering::SeqCst);
    if sig == 0 {
        return;
    }
    match sig {
        libc::SIGINT => {
            warn!("caught interrupt request, exiting");
            crate::rollback::cleanup_all();
            std::process::exit(1);
        }
        libc::SIGPIPE => {
            crate::rollback::cleanup_all();
            std::process::exit(1);
        }
        libc::SIGHUP | libc::SIGQUIT | libc::SIGTERM => {
            set(CMD_QUIT);
            warn!("caught termination request, ignoring further input");
        }
        libc::SIGCHLD => {
            unsafe {
                libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG);
            }
            set(CMD_CHLD);
        }
        libc::SIGALRM => {
            set(CMD_ALRM);
        }
        _ => {}
    }
}

#[cfg(not(unix))]
pub fn process_pending_signal() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_set_and_clear() {
        clear(CMD_QUIT | CMD_ALRM);
        assert!(!quit_requested());
        set(CMD_QUIT);
        assert!(quit_requested());
        set(CMD_ALRM);
        assert!(check(CMD_ALRM));
        clear(CMD_QUIT);
        assert!(!quit_requested());
        assert!(check(CMD_ALRM));
        clear(CMD_ALRM);
    }
}
