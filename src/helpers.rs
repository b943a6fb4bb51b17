// Logging facade and thin OS wrappers for swapspace
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ffi::CString;
use std::fmt;
use std::io;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use libsystemd::daemon::{self, NotifyState};
use libsystemd::logging::{journal_print, Priority};

/// Severity of a log event. Maps onto journal priorities once the daemon
/// has detached from its terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Crit,
}

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);
static JOURNAL: AtomicBool = AtomicBool::new(false);

/// Apply the configured verbosity. Quiet suppresses info and notice
/// output; verbose enables debug output.
pub fn set_verbosity(quiet: bool, verbose: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Switch log output to the systemd journal. Called after daemonizing,
/// when the standard streams no longer lead anywhere useful.
pub fn log_to_journal() {
    JOURNAL.store(true, Ordering::Relaxed);
}

pub fn emit(level: Level, args: fmt::Arguments) {
    match level {
        Level::Debug if !VERBOSE.load(Ordering::Relaxed) => return,
        Level::Info | Level::Notice if QUIET.load(Ordering::Relaxed) => return,
        _ => {}
    }

    if JOURNAL.load(Ordering::Relaxed) {
        let priority = match level {
            Level::Debug => Priority::Debug,
            Level::Info => Priority::Info,
            Level::Notice => Priority::Notice,
            Level::Warning => Priority::Warning,
            Level::Error => Priority::Error,
            Level::Crit => Priority::Critical,
        };
        let _ = journal_print(priority, &args.to_string());
        return;
    }

    match level {
        Level::Error | Level::Crit => eprintln!("Error: {}", args),
        Level::Warning => eprintln!("Warning: {}", args),
        Level::Notice => println!("Notice: {}", args),
        Level::Info | Level::Debug => println!("{}", args),
    }
}

// Logging macros
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::helpers::emit($crate::helpers::Level::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::helpers::emit($crate::helpers::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! notice {
    ($($arg:tt)*) => {
        $crate::helpers::emit($crate::helpers::Level::Notice, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::helpers::emit($crate::helpers::Level::Warning, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::helpers::emit($crate::helpers::Level::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! crit {
    ($($arg:tt)*) => {
        $crate::helpers::emit($crate::helpers::Level::Crit, format_args!($($arg)*))
    };
}

/// Memory page size in bytes.
pub fn page_size() -> i64 {
    nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .unwrap_or(4096) as i64
}

/// Truncate a byte count to a multiple of page size. Relies on the page
/// size being a power of two.
pub fn trunc_to_page(n: i64) -> i64 {
    n & !(page_size() - 1)
}

/// Activate a prepared swap file via the swapon(2) syscall.
pub fn swapon(path: &str) -> io::Result<()> {
    let path = CString::new(path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    if unsafe { libc::swapon(path.as_ptr(), 0) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Deactivate a swap file via the swapoff(2) syscall.
pub fn swapoff(path: &str) -> io::Result<()> {
    let path = CString::new(path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    if unsafe { libc::swapoff(path.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Run an external command with a single argument. The argument goes to
/// the child verbatim; no shell is involved.
pub fn run_command(cmd: &str, arg: &str) -> io::Result<bool> {
    let status = Command::new(cmd)
        .arg(arg)
        .stdout(Stdio::null())
        .status()?;
    Ok(status.success())
}

/// Tell systemd we are up. A no-op outside a systemd unit.
pub fn notify_ready() {
    let _ = daemon::notify(false, &[NotifyState::Ready]);
}

/// Tell systemd we are shutting down.
pub fn notify_stopping() {
    let _ = daemon::notify(false, &[NotifyState::Stopping]);
}
