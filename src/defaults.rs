// Centralised default values for all configuration options.
// SPDX-License-Identifier: GPL-3.0-or-later
//
// Every option resolves as command line → config file → the constant here.
// Keeping them in one place prevents drift between the option table, the
// validation rules, and the shipped swapspace.conf.

use crate::{MIB, TIB};

// ── Paths ────────────────────────────────────────────────────────────────────

pub const CONFIGFILE: &str = "/etc/swapspace.conf";
pub const PIDFILE: &str = "/var/run/swapspace.pid";
pub const SWAPPATH: &str = "/var/lib/swapspace";

// ── Pressure model ───────────────────────────────────────────────────────────

/// Grow the swap pool when estimated free space falls below this percentage.
pub const LOWER_FREELIMIT: i64 = 20;
/// Shrink the swap pool when estimated free space exceeds this percentage.
pub const UPPER_FREELIMIT: i64 = 60;
/// Percentage of free space to steer for once either limit is hit.
pub const FREETARGET: i64 = 30;
/// Percentage of buffer memory counted as available.
pub const BUFFER_ELASTICITY: i64 = 30;
/// Percentage of non-dirty cache memory counted as available.
pub const CACHE_ELASTICITY: i64 = 80;

// ── Allocation policy ────────────────────────────────────────────────────────

/// Seconds a policy state persists before the timer-driven return to steady.
pub const COOLDOWN: i64 = 600;

// ── Swap files ───────────────────────────────────────────────────────────────

/// Smallest swap file worth creating.
pub const MIN_SWAPSIZE: i64 = 4 * MIB;
/// Largest allowed swap file. The engine learns a lower bound at runtime if
/// it runs into file size limits.
pub const MAX_SWAPSIZE: i64 = 2 * TIB;
