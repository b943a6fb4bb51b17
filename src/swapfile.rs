// Swap file fleet: a fixed roster of numbered swap files, reconciled
// against /proc/swaps, grown and shrunk on the policy's orders.
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::statvfs::statvfs;
use thiserror::Error;

use crate::config::Config;
use crate::helpers::{self, page_size, trunc_to_page};
use crate::state::{GrowOutcome, SwapPool};
use crate::{debug, error, info, notice, warn, KIB};

/// Number of swapfile slots. Swapspace allocates files of increasing
/// sizes, so a handful of slots covers a lot of ground.
pub const MAX_SWAPFILES: usize = 32;

#[derive(Error, Debug)]
pub enum SwapFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("could not use swap directory '{path}': {source}")]
    SwapDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("not supported: swap path contains whitespace")]
    WhitespacePath,
    #[error("swap path is not valid UTF-8")]
    NonUtf8Path,
    #[error("/proc/swaps is not in the expected format: '{0}'")]
    BadProcSwaps(String),
}

pub type Result<T> = std::result::Result<T, SwapFileError>;

/// One roster slot. The slot's file, when active, is named by the
/// decimal rendering of its index inside the swap directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwapEntry {
    pub size: i64,
    pub used: i64,
    pub created: i64,
    /// Spotted in /proc/swaps during the last reconciliation?
    pub observed_in_wild: bool,
}

impl SwapEntry {
    pub fn is_active(&self) -> bool {
        self.size > 0
    }
}

/// Make the configured swap directory the working directory and return
/// its canonical rendering, which is how the kernel will list our files
/// in /proc/swaps.
pub fn enter_swapdir(cfg: &Config) -> Result<String> {
    let path = cfg.swappath.as_path();
    if let Err(errno) = nix::unistd::chdir(path) {
        error!(
            "Could not cd to swap directory '{}': {}",
            path.display(),
            errno.desc()
        );
        let bad_install = matches!(errno, Errno::ENOENT | Errno::ENOTDIR | Errno::ELOOP)
            || (errno == Errno::EACCES && nix::unistd::geteuid().is_root());
        if bad_install {
            error!("swapspace installed incorrectly. Please reinstall!");
        }
        return Err(SwapFileError::SwapDir {
            path: path.display().to_string(),
            source: errno.into(),
        });
    }

    // Resolve any "//", "/./" or symlink clutter: matching against
    // /proc/swaps only works on the canonical path.
    let canonical = std::env::current_dir().map_err(|source| SwapFileError::SwapDir {
        path: path.display().to_string(),
        source,
    })?;
    let canonical = canonical
        .into_os_string()
        .into_string()
        .map_err(|_| SwapFileError::NonUtf8Path)?;
    let canonical = canonical.trim_end_matches('/').to_string();

    if canonical.chars().any(char::is_whitespace) {
        return Err(SwapFileError::WhitespacePath);
    }
    Ok(canonical)
}

fn statvfs_retry(path: &str) -> Option<nix::sys::statvfs::Statvfs> {
    let mut result = statvfs(Path::new(path));
    if matches!(result, Err(Errno::EINTR)) {
        result = statvfs(Path::new(path));
    }
    match result {
        Ok(st) => Some(st),
        Err(errno) => {
            error!(
                "Could not get filesystem information for swap directory '{}': {}",
                path,
                errno.desc()
            );
            None
        }
    }
}

/// Free space available to unprivileged users on the filesystem holding
/// `path`. Deliberately not the real free count: the root-reserved
/// blocks stay out of reach as margin for the superuser when the disk
/// fills up.
pub fn swapfs_free_at(path: &str) -> i64 {
    statvfs_retry(path)
        .map(|st| st.blocks_available() as i64 * st.block_size() as i64)
        .unwrap_or(0)
}

/// Total size of the filesystem holding `path`.
pub fn swapfs_size_at(path: &str) -> i64 {
    statvfs_retry(path)
        .map(|st| st.blocks() as i64 * st.block_size() as i64)
        .unwrap_or(0)
}

/// A slot filename is the canonical decimal rendering of its index:
/// digits only, no sign, no leading zeros, below MAX_SWAPFILES.
fn parse_slot_name(name: &str) -> Option<usize> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    let n: usize = name.parse().ok()?;
    (n < MAX_SWAPFILES).then_some(n)
}

struct SwapsRow<'a> {
    name: &'a str,
    kind: &'a str,
    size: i64,
    used: i64,
}

/// Split one /proc/swaps data row. Sizes there are in 1 KiB blocks.
fn parse_data_row(line: &str) -> Option<SwapsRow<'_>> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?;
    let kind = fields.next()?;
    let size: i64 = fields.next()?.parse().ok()?;
    let used: i64 = fields.next()?.parse().ok()?;
    fields.next()?; // the priority column must be present
    Some(SwapsRow {
        name,
        kind,
        size: size * KIB,
        used: used * KIB,
    })
}

fn is_header(line: &str) -> bool {
    let mut fields = line.split_whitespace();
    ["Filename", "Type", "Size", "Used"]
        .iter()
        .all(|word| fields.next() == Some(*word))
        && fields.next().is_some()
}

fn log_discrepancy(notice: bool, msg: &str, slot: usize, expected: i64, found: i64) {
    if notice {
        notice!(
            "Discrepancy in swapfile {}: {} ({} bytes vs. {})",
            slot,
            msg,
            expected,
            found
        );
    } else {
        info!(
            "Discrepancy in swapfile {}: {} ({} bytes vs. {})",
            slot,
            msg,
            expected,
            found
        );
    }
}

/// The roster of swap files this daemon owns, plus the machinery to
/// create, activate, retire and wipe them.
pub struct SwapFleet {
    entries: [SwapEntry; MAX_SWAPFILES],
    /// Wrap-around cursor: where the next free-slot scan starts. Spreads
    /// reuse so a just-retired name is not immediately taken again.
    next_seq: usize,
    /// Becomes true once a /proc/swaps header has been matched.
    proc_swaps_validated: bool,
    /// Canonical swap directory; also the process working directory.
    swapdir: String,
    min_swapsize: i64,
    /// Per-file cap; ratcheted down when a write runs into EFBIG.
    max_swapsize: i64,
    paranoid: bool,
    /// Current tick, stamped into entries as they are created.
    clock: i64,
    /// Reusable zero page buffer for filling and wiping swap files.
    zeroes: Vec<u8>,
}

impl SwapFleet {
    pub fn new(cfg: &Config, swapdir: String) -> Self {
        let buf_len = 16384.max(page_size()) as usize;
        SwapFleet {
            entries: [SwapEntry::default(); MAX_SWAPFILES],
            next_seq: 0,
            proc_swaps_validated: false,
            swapdir,
            min_swapsize: cfg.min_swapsize,
            max_swapsize: cfg.max_swapsize,
            paranoid: cfg.paranoid,
            clock: 0,
            zeroes: vec![0u8; buf_len],
        }
    }

    /// Synchronize the roster with the kernel's view in /proc/swaps.
    pub fn reconcile(&mut self, now: i64) -> Result<()> {
        self.clock = now;
        let file = File::open("/proc/swaps")?;
        self.reconcile_from(BufReader::new(file))
    }

    fn reconcile_from<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for entry in &mut self.entries {
            entry.observed_in_wild = false;
        }

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_data_row(&line) {
                Some(row) => self.absorb_row(&row),
                None => {
                    // The header normally sits on top, but kernels with
                    // the old /proc/swaps bug may drop it when the
                    // oldest swap is disabled, and a fix could leave it
                    // further down. Accept it wherever it turns up.
                    if is_header(&line) {
                        self.proc_swaps_validated = true;
                    } else {
                        return Err(SwapFileError::BadProcSwaps(line));
                    }
                }
            }
        }

        // Scratch any swapfile that was deactivated behind our back.
        for entry in &mut self.entries {
            if entry.is_active() && !entry.observed_in_wild {
                *entry = SwapEntry::default();
            }
        }
        Ok(())
    }

    fn absorb_row(&mut self, row: &SwapsRow) {
        if row.kind != "file" {
            return;
        }
        let Some(slot) = self.own_slot(row.name) else {
            return;
        };

        let known = self.entries[slot];
        if !known.is_active() {
            // A swapfile we didn't know about. Adopt it.
            notice!("Detected swapfile '{}'", slot);
            self.entries[slot].created = self.clock;
        } else if known.size != row.size {
            // A few pages of bookkeeping overhead are normal; anything
            // beyond that is worth a line in the log.
            if known.observed_in_wild {
                log_discrepancy(true, "size changed", slot, known.size, row.size);
            } else if row.size > known.size {
                log_discrepancy(false, "larger than expected", slot, known.size, row.size);
            } else if row.size + 2 * page_size() < known.size {
                log_discrepancy(false, "smaller than expected", slot, known.size, row.size);
            }
        }
        if row.used > row.size {
            log_discrepancy(true, "usage exceeds size", slot, row.used, row.size);
        }

        let entry = &mut self.entries[slot];
        entry.size = row.size;
        entry.used = row.used;
        entry.observed_in_wild = true;
    }

    fn own_slot(&self, path: &str) -> Option<usize> {
        let rest = path.strip_prefix(&self.swapdir)?;
        let name = rest.strip_prefix('/')?;
        parse_slot_name(name)
    }

    /// Has a /proc/swaps header been verified yet? While no swap at all
    /// is active the file may be completely empty, leaving nothing to
    /// check the format against.
    pub fn proc_swaps_parsed(&self) -> bool {
        self.proc_swaps_validated
    }

    /// Scan the swap directory for files left behind by an earlier run
    /// and bring the usable ones back into service.
    pub fn activate_old_swaps(&mut self, now: i64) -> Result<()> {
        self.clock = now;
        for dir_entry in fs::read_dir(".")? {
            let dir_entry = dir_entry?;
            let name_os = dir_entry.file_name();
            let Some(name) = name_os.to_str() else {
                continue;
            };
            let Some(slot) = parse_slot_name(name) else {
                continue;
            };
            if self.entries[slot].is_active() {
                continue;
            }
            info!("Found old swapfile '{}'", slot);
            let size = file_size(name);
            if size > self.min_swapsize && self.enable_swapfile(name) {
                self.entries[slot] = SwapEntry {
                    size,
                    used: 0,
                    created: now,
                    observed_in_wild: false,
                };
            } else {
                notice!("Deleting unusable swapfile '{}'", slot);
                let _ = fs::remove_file(name);
            }
        }
        self.reconcile(now)
    }

    pub fn swapfs_free(&self) -> i64 {
        swapfs_free_at(&self.swapdir)
    }

    pub fn swapfs_size(&self) -> i64 {
        swapfs_size_at(&self.swapdir)
    }

    /// First inactive slot after the cursor, wrapping around; the cursor
    /// itself comes back when every slot is taken.
    fn find_free(&self, cursor: usize) -> usize {
        for i in (cursor + 1..MAX_SWAPFILES).chain(0..cursor) {
            if !self.entries[i].is_active() {
                return i;
            }
        }
        cursor
    }

    /// Slot to retire for a release of at most `target` bytes: the
    /// largest active swapfile not bigger than the target; ties go to
    /// the lowest index.
    fn find_retirable(&self, target: i64) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.is_active() && entry.size <= target {
                match best {
                    Some(b) if self.entries[b].size >= entry.size => {}
                    _ => best = Some(i),
                }
            }
        }
        best
    }

    /// Create, fill and activate one new swapfile of roughly `bytes`.
    pub fn allocate(&mut self, bytes: i64) -> GrowOutcome {
        // Round the request to page size, then add a little extra for
        // the swap header overhead.
        let size = trunc_to_page(bytes) + 2 * page_size();

        let slot = self.find_free(self.next_seq);
        if self.entries[slot].is_active() {
            return GrowOutcome::Denied; // no free slot
        }
        if size > self.swapfs_free() {
            return GrowOutcome::Denied; // not enough disk space
        }

        notice!("Allocating swapfile '{}'", slot);
        let name = slot.to_string();
        let (written, hard) = self.make_swapfile(&name, size);
        if written == 0 {
            return if hard {
                GrowOutcome::DeniedHard
            } else {
                GrowOutcome::Denied
            };
        }

        if !self.enable_swapfile(&name) {
            let _ = fs::remove_file(&name);
            return GrowOutcome::DeniedHard;
        }

        self.entries[slot] = SwapEntry {
            size: written,
            used: 0,
            created: self.clock,
            observed_in_wild: false,
        };
        self.next_seq = (self.next_seq + 1) % MAX_SWAPFILES;
        GrowOutcome::Grown
    }

    /// Create a file and fill it with zero pages. Returns the number of
    /// bytes secured (zero means failure and the file is gone again) and
    /// whether the failure was a hard one.
    fn make_swapfile(&mut self, name: &str, size: i64) -> (i64, bool) {
        if size < self.min_swapsize {
            return (0, false);
        }
        let size = size.min(self.max_swapsize);

        // A stale file under this name would make exclusive-create fail.
        let _ = fs::remove_file(name);

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .custom_flags(libc::O_NOFOLLOW)
            .open(name)
        {
            Ok(f) => f,
            Err(e) => {
                error!("Could not create swapfile '{}': {}", name, e);
                return (0, false);
            }
        };

        let (written, err) = self.write_zeroes(&mut file, size, false);
        if written >= size {
            return (size, false);
        }

        let mut hard = false;
        match err {
            Some(e) => {
                error!("Error writing swapfile '{}': {}", name, e);
                match e.raw_os_error() {
                    Some(libc::EFBIG) => {
                        // Ran into a file size limit. Don't try creating
                        // files this large again.
                        if written > 0 && self.max_swapsize > written {
                            self.max_swapsize = trunc_to_page(written);
                            debug!("Restricting swapfile size to {}", self.max_swapsize);
                        }
                    }
                    Some(libc::ENOSPC) | Some(libc::EIO) => hard = true,
                    _ => warn!("Unexpected error writing swap file"),
                }
            }
            None => error!("Error writing swapfile '{}': short write", name),
        }

        drop(file);
        let _ = fs::remove_file(name);
        (0, hard)
    }

    /// Write `bytes` of zeroes (rounded up to whole pages) through the
    /// reusable zero buffer. EINTR aborts the write unless the caller
    /// asked to persevere, which retirement wipes do.
    fn write_zeroes(
        &mut self,
        file: &mut File,
        bytes: i64,
        persevere: bool,
    ) -> (i64, Option<io::Error>) {
        let page = page_size();
        let bytes = trunc_to_page(bytes + page - 1);

        let mut written: i64 = 0;
        while written < bytes {
            let chunk = (self.zeroes.len() as i64).min(bytes - written) as usize;
            match file.write(&self.zeroes[..chunk]) {
                Ok(0) => return (written, None),
                Ok(n) => written += n as i64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted && persevere => continue,
                Err(e) => return (written, Some(e)),
            }
        }
        (written, None)
    }

    /// Run mkswap over an existing file, then activate it.
    fn enable_swapfile(&self, name: &str) -> bool {
        match helpers::run_command("mkswap", name) {
            Ok(true) => {}
            Ok(false) => {
                error!("mkswap failed on '{}'", name);
                return false;
            }
            Err(e) => {
                error!("Could not run mkswap on '{}': {}", name, e);
                return false;
            }
        }
        match helpers::swapon(name) {
            Ok(()) => true,
            Err(e) => {
                error!("Could not enable swapfile '{}': {}", name, e);
                false
            }
        }
    }

    /// Deactivate one swapfile and delete it. If swapoff fails the file
    /// must stay on disk under its name: it may still hold live pages,
    /// and keeping the name stable is the only way to try again later.
    fn retire(&mut self, slot: usize) -> bool {
        let name = slot.to_string();
        notice!("Retiring swapfile '{}'", slot);
        if let Err(e) = helpers::swapoff(&name) {
            warn!("Could not disable swapfile '{}': {}", slot, e);
            return false;
        }

        // In paranoid mode the file is opened before the unlink so its
        // data blocks can still be overwritten afterwards.
        let wipe = if self.paranoid {
            OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NOFOLLOW)
                .open(&name)
                .ok()
        } else {
            None
        };

        let _ = fs::remove_file(&name);

        if let Some(mut file) = wipe {
            let size = self.entries[slot].size;
            let _ = self.write_zeroes(&mut file, size, true);
        }

        self.entries[slot] = SwapEntry::default();
        true
    }

    /// Release swap capacity: retire the best candidate of at most
    /// `max_bytes`, if there is one.
    pub fn free_swapfile(&mut self, max_bytes: i64) {
        if let Some(slot) = self.find_retirable(max_bytes) {
            self.retire(slot);
        }
    }

    /// Retire every active swapfile. Returns whether all of them went.
    pub fn retire_all(&mut self) -> bool {
        let mut ok = true;
        for slot in 0..MAX_SWAPFILES {
            if self.entries[slot].is_active() && !self.retire(slot) {
                ok = false;
            }
        }
        ok
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active()).count()
    }

    /// Log the roster, for the status dump.
    pub fn dump(&self) {
        let active = self.active_count();
        info!("swapfiles in use: {}", active);
        if active == 0 {
            return;
        }
        info!("file            size            used         created  seen");
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.is_active() {
                info!(
                    "{:>4}{:>16}{:>16}{:>16}  {}",
                    i, entry.size, entry.used, entry.created, entry.observed_in_wild as u8
                );
            }
        }
    }
}

/// Size of a file determined by seeking to its end; -1 if unreadable.
fn file_size(name: &str) -> i64 {
    let opened = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(name);
    match opened.and_then(|mut f| f.seek(SeekFrom::End(0))) {
        Ok(pos) => pos as i64,
        Err(e) => {
            warn!("Can't determine size of '{}': {}", name, e);
            -1
        }
    }
}

impl SwapPool for SwapFleet {
    fn grow(&mut self, bytes: i64) -> GrowOutcome {
        self.allocate(bytes)
    }

    fn shrink(&mut self, max_bytes: i64) {
        self.free_swapfile(max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIR: &str = "/var/lib/swapspace";

    fn fleet() -> SwapFleet {
        SwapFleet::new(&Config::default(), DIR.to_string())
    }

    fn activate(fleet: &mut SwapFleet, slot: usize, size: i64) {
        fleet.entries[slot] = SwapEntry {
            size,
            used: 0,
            created: 0,
            observed_in_wild: false,
        };
    }

    #[test]
    fn slot_names_are_canonical_decimals() {
        assert_eq!(parse_slot_name("0"), Some(0));
        assert_eq!(parse_slot_name("7"), Some(7));
        assert_eq!(parse_slot_name("31"), Some(31));
        assert_eq!(parse_slot_name("32"), None);
        assert_eq!(parse_slot_name("05"), None);
        assert_eq!(parse_slot_name("+5"), None);
        assert_eq!(parse_slot_name(" 5"), None);
        assert_eq!(parse_slot_name("5 "), None);
        assert_eq!(parse_slot_name(""), None);
        assert_eq!(parse_slot_name("foo"), None);
        assert_eq!(parse_slot_name("3x"), None);
    }

    #[test]
    fn free_slot_scan_wraps_around_the_cursor() {
        let mut f = fleet();
        assert_eq!(f.find_free(0), 1);

        activate(&mut f, 1, 4096);
        activate(&mut f, 2, 4096);
        assert_eq!(f.find_free(0), 3);

        // Wraps past the end of the roster.
        assert_eq!(f.find_free(MAX_SWAPFILES - 1), 0);

        // With everything else taken, the cursor itself comes back.
        for slot in 0..MAX_SWAPFILES {
            activate(&mut f, slot, 4096);
        }
        assert_eq!(f.find_free(5), 5);
    }

    #[test]
    fn retirable_prefers_largest_fit() {
        let mut f = fleet();
        assert_eq!(f.find_retirable(1 << 30), None);

        activate(&mut f, 2, 100 << 20);
        activate(&mut f, 7, 300 << 20);
        activate(&mut f, 9, 200 << 20);

        // Largest file within the target wins.
        assert_eq!(f.find_retirable(1 << 30), Some(7));
        assert_eq!(f.find_retirable(250 << 20), Some(9));
        assert_eq!(f.find_retirable(150 << 20), Some(2));
        assert_eq!(f.find_retirable(50 << 20), None);
    }

    #[test]
    fn retirable_ties_go_to_the_lowest_slot() {
        let mut f = fleet();
        activate(&mut f, 12, 200 << 20);
        activate(&mut f, 3, 200 << 20);
        assert_eq!(f.find_retirable(1 << 30), Some(3));
    }

    #[test]
    fn reconcile_adopts_and_converts_kilobytes() {
        let mut f = fleet();
        let content = "Filename                Type        Size    Used    Priority\n\
                       /var/lib/swapspace/0    file        524284  1024    -2\n\
                       /dev/sda2               partition   999996  0       -3\n";
        f.reconcile_from(content.as_bytes()).unwrap();

        assert!(f.proc_swaps_parsed());
        assert_eq!(f.active_count(), 1);
        assert_eq!(f.entries[0].size, 524284 * 1024);
        assert_eq!(f.entries[0].used, 1024 * 1024);
        assert!(f.entries[0].observed_in_wild);
    }

    #[test]
    fn reconcile_ignores_foreign_files() {
        let mut f = fleet();
        let content = "Filename Type Size Used Priority\n\
                       /swap/other/3           file  1000  0  -2\n\
                       /var/lib/swapspace2/4   file  1000  0  -3\n\
                       /var/lib/swapspace/05   file  1000  0  -4\n\
                       /var/lib/swapspace/40   file  1000  0  -5\n";
        f.reconcile_from(content.as_bytes()).unwrap();
        assert_eq!(f.active_count(), 0);
    }

    #[test]
    fn reconcile_tolerates_header_anywhere() {
        let mut f = fleet();
        let content = "/var/lib/swapspace/1    file  1000  0  -2\n\
                       /var/lib/swapspace/2    file  1000  0  -3\n\
                       Filename                Type  Size  Used  Priority\n\
                       /var/lib/swapspace/3    file  1000  0  -4\n";
        f.reconcile_from(content.as_bytes()).unwrap();
        assert!(f.proc_swaps_parsed());
        assert_eq!(f.active_count(), 3);
    }

    #[test]
    fn reconcile_rejects_garbage() {
        let mut f = fleet();
        let err = f
            .reconcile_from("Filename Of The Week\n".as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("not in the expected format"));
    }

    #[test]
    fn reconcile_clears_externally_disabled_files() {
        let mut f = fleet();
        activate(&mut f, 5, 1000 * 1024);
        activate(&mut f, 6, 1000 * 1024);

        let content = "Filename Type Size Used Priority\n\
                       /var/lib/swapspace/6  file  1000  0  -2\n";
        f.reconcile_from(content.as_bytes()).unwrap();

        assert!(!f.entries[5].is_active());
        assert!(f.entries[6].is_active());
        assert_eq!(f.active_count(), 1);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let content = "Filename Type Size Used Priority\n\
                       /var/lib/swapspace/4  file  2048  512  -2\n\
                       /var/lib/swapspace/9  file  4096  0    -3\n";
        let mut f = fleet();
        f.reconcile_from(content.as_bytes()).unwrap();
        let first = f.entries;
        f.reconcile_from(content.as_bytes()).unwrap();
        assert_eq!(first, f.entries);
    }

    #[test]
    fn reconcile_updates_usage_over_size() {
        // used > size is logged but still recorded as reported.
        let mut f = fleet();
        let content = "Filename Type Size Used Priority\n\
                       /var/lib/swapspace/2  file  1000  2000  -2\n";
        f.reconcile_from(content.as_bytes()).unwrap();
        assert_eq!(f.entries[2].used, 2000 * 1024);
    }

    #[test]
    fn adoption_stamps_the_current_clock() {
        let mut f = fleet();
        let content = "Filename Type Size Used Priority\n\
                       /var/lib/swapspace/8  file  1000  0  -2\n";
        f.clock = 42;
        f.reconcile_from(content.as_bytes()).unwrap();
        assert_eq!(f.entries[8].created, 42);
    }
}
