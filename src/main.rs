// swapspace - Dynamic swap space manager for GNU/Linux
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nix::unistd::{dup2, fork, setsid, ForkResult, Pid};
use libc::SIGPWR;
use signal_hook::consts::{SIGHUP, SIGTERM, SIGUSR1, SIGUSR2, SIGXFSZ};
use signal_hook::flag;

use swapspace::config::Config;
use swapspace::helpers;
use swapspace::pressure;
use swapspace::state::Policy;
use swapspace::swapfile::{self, SwapFleet};
use swapspace::{crit, debug, error, info, warn};

fn main() {
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    helpers::set_verbosity(cfg.quiet, cfg.verbose);

    if let Err(e) = run(&cfg) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // The swap directory must sit on a filesystem big enough for useful
    // swap files. Sheer lack of free space is only a warning; that can
    // improve by itself.
    if !swapfs_large_enough(cfg)? {
        return Err("swap directory filesystem is too small".into());
    }
    if cfg.inspect {
        return Ok(());
    }

    let swapdir = swapfile::enter_swapdir(cfg)?;
    let mut fleet = SwapFleet::new(cfg, swapdir);

    let mut clock: i64 = 0;
    fleet.reconcile(clock)?;
    fleet.activate_old_swaps(clock)?;
    pressure::check_memory_status(cfg)?;

    if cfg.erase {
        return if fleet.retire_all() {
            Ok(())
        } else {
            Err("could not retire all swapfiles".into())
        };
    }

    let signals = install_signals()?;
    let mut pidfile = Pidfile::create(cfg)?;
    let mut policy = Policy::new(cfg.cooldown);

    // First iteration happens before daemonizing, so startup problems
    // still reach the terminal and the daemon forks in a steady state.
    clock += 1;
    policy_tick(cfg, &mut policy, &mut fleet, clock);

    // Last chance to check the /proc/swaps format while it can still be
    // reported in the foreground.
    if !fleet.proc_swaps_parsed() {
        fleet.reconcile(clock)?;
        if !fleet.proc_swaps_parsed() {
            info!("[/proc/swaps is empty, so cannot check its format]");
        }
    }

    if cfg.daemon {
        debug!("daemonizing...");
        match daemonize() {
            Ok(Some(child)) => {
                // Parent. The pidfile must carry the child's pid and be
                // in a stable state before we exit.
                debug!("got process id {}", child);
                if let Some(pidfile) = pidfile.as_mut() {
                    pidfile.rewrite(child)?;
                }
                process::exit(0);
            }
            Ok(None) => {
                // Child: the standard streams now lead nowhere, so log
                // to the journal instead.
                helpers::log_to_journal();
            }
            Err(e) => {
                if let Some(pidfile) = pidfile.take() {
                    pidfile.remove();
                }
                return Err(e);
            }
        }
    }

    if let Some(pidfile) = pidfile.as_mut() {
        pidfile.close();
    }
    helpers::notify_ready();

    // Central loop: one tick per second, exactly one service per tick.
    while !signals.stop.load(Ordering::Acquire) {
        clock += 1;
        if signals.status.swap(false, Ordering::AcqRel) {
            dump_stats(cfg, &policy, &fleet, clock);
        } else if signals.adjust.swap(false, Ordering::AcqRel) {
            policy.request_diet();
        } else {
            policy_tick(cfg, &mut policy, &mut fleet, clock);
        }
        thread::sleep(Duration::from_secs(1));
    }

    helpers::notify_stopping();

    // Retiring everything on the way out keeps old swap contents from
    // lingering on an unguarded disk.
    let clean = !cfg.paranoid || fleet.retire_all();

    if let Some(pidfile) = pidfile.take() {
        pidfile.remove();
    }

    if clean {
        Ok(())
    } else {
        Err("could not retire all swapfiles".into())
    }
}

/// One normal policy tick: reconcile the roster, read the pressure, let
/// the state machine act. Any failure skips the tick; the loop goes on.
fn policy_tick(cfg: &Config, policy: &mut Policy, fleet: &mut SwapFleet, clock: i64) {
    if let Err(e) = fleet.reconcile(clock) {
        error!("{}", e);
        return;
    }
    let recommendation = match pressure::memory_target(cfg) {
        Ok(r) => r,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    policy.step(recommendation, fleet);
}

/// Print status information, on the operator's SIGUSR1 request.
fn dump_stats(cfg: &Config, policy: &Policy, fleet: &SwapFleet, clock: i64) {
    info!("clock: {}", clock);
    policy.dump();
    pressure::dump_memory(cfg);
    fleet.dump();
}

/// Is the swap directory on a filesystem big enough to hold the swap
/// files we would create under pressure?
fn swapfs_large_enough(cfg: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let minimal = pressure::minimal_swapfile(cfg)?;
    let path = cfg.swappath.to_string_lossy();

    if swapfile::swapfs_size_at(&path) < minimal {
        crit!(
            "The filesystem holding swapspace's swap directory isn't big enough \
             to hold useful swapfiles."
        );
        crit!(
            "Please try to expand this partition or relocate it to a larger one, \
             if possible; or if all else fails, choose a different swap directory \
             in your swapspace configuration."
        );
        return Ok(false);
    }
    if swapfile::swapfs_free_at(&path) < minimal {
        warn!(
            "Not enough free space on swap directory. As things stand now, \
             swapspace will not be able to create swap files."
        );
    }
    Ok(true)
}

struct SignalFlags {
    stop: Arc<AtomicBool>,
    status: Arc<AtomicBool>,
    adjust: Arc<AtomicBool>,
}

/// Install signal handlers. Each handler only stores one boolean; the
/// tick loop observes and clears the flags.
fn install_signals() -> Result<SignalFlags, Box<dyn std::error::Error>> {
    let stop = Arc::new(AtomicBool::new(false));
    let status = Arc::new(AtomicBool::new(false));
    let adjust = Arc::new(AtomicBool::new(false));

    for signal in [SIGTERM, SIGHUP, SIGPWR] {
        flag::register(signal, Arc::clone(&stop))?;
    }
    flag::register(SIGUSR1, Arc::clone(&status))?;
    flag::register(SIGUSR2, Arc::clone(&adjust))?;

    // The kernel may send SIGXFSZ when a swapfile runs into a file size
    // limit. The write loop already handles EFBIG, so only the default
    // process-killing disposition has to go.
    flag::register(SIGXFSZ, Arc::new(AtomicBool::new(false)))?;

    // Ctrl-C in a foreground run counts as a termination request.
    let interactive_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || interactive_stop.store(true, Ordering::Release))?;

    Ok(SignalFlags {
        stop,
        status,
        adjust,
    })
}

/// Fork into the background. Returns the child's pid in the parent and
/// None in the child, which becomes its own session leader with the
/// standard streams pointed at /dev/null.
fn daemonize() -> Result<Option<Pid>, Box<dyn std::error::Error>> {
    match unsafe { fork() }? {
        ForkResult::Parent { child } => Ok(Some(child)),
        ForkResult::Child => {
            setsid()?;
            let null = File::options().read(true).write(true).open("/dev/null")?;
            for fd in 0..=2 {
                dup2(null.as_raw_fd(), fd)?;
            }
            Ok(None)
        }
    }
}

/// Exclusive-create pid file. An existing file means another instance is
/// (or appears to be) running, which is fatal.
struct Pidfile {
    path: PathBuf,
    file: Option<File>,
}

impl Pidfile {
    fn create(cfg: &Config) -> Result<Option<Pidfile>, Box<dyn std::error::Error>> {
        let Some(path) = cfg.pidfile.clone() else {
            return Ok(None);
        };
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                error!(
                    "Daemon already running, or leftover pidfile: '{}'",
                    path.display()
                );
                return Err(e.into());
            }
            Err(e) => {
                error!("Could not create pidfile '{}': {}", path.display(), e);
                return Err(e.into());
            }
        };

        // Temporary pid; the parent rewrites it with the child's after a
        // fork.
        writeln!(file, "{}", process::id())?;
        Ok(Some(Pidfile {
            path,
            file: Some(file),
        }))
    }

    fn rewrite(&mut self, pid: Pid) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
            writeln!(file, "{}", pid)?;
        }
        Ok(())
    }

    /// Drop the descriptor but keep the path for removal at shutdown.
    fn close(&mut self) {
        self.file = None;
    }

    fn remove(self) {
        let _ = fs::remove_file(&self.path);
    }
}
