// Memory information parser for /proc/meminfo
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::io::{BufRead, BufReader};

use thiserror::Error;

use crate::{GIB, KIB, MIB};

#[derive(Error, Debug)]
pub enum MemInfoError {
    #[error("could not read /proc/meminfo: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, MemInfoError>;

/// One snapshot of the kernel's memory accounting, in bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemSnapshot {
    pub mem_total: i64,
    pub mem_free: i64,
    pub buffers: i64,
    pub cached: i64,
    pub dirty: i64,
    pub writeback: i64,
    pub swap_cached: i64,
    pub swap_total: i64,
    pub swap_free: i64,
}

impl MemSnapshot {
    fn absorb(&mut self, key: &str, value: i64) {
        match key {
            "MemTotal" => self.mem_total = value,
            "MemFree" => self.mem_free = value,
            "Buffers" => self.buffers = value,
            "Cached" => self.cached = value,
            "Dirty" => self.dirty = value,
            "Writeback" => self.writeback = value,
            "SwapCached" => self.swap_cached = value,
            "SwapTotal" => self.swap_total = value,
            "SwapFree" => self.swap_free = value,
            _ => {}
        }
    }
}

/// Read and validate the current memory state.
pub fn read_snapshot() -> Result<MemSnapshot> {
    let file = File::open("/proc/meminfo")?;
    parse_snapshot(BufReader::new(file))
}

fn parse_snapshot<R: BufRead>(reader: R) -> Result<MemSnapshot> {
    let mut snapshot = MemSnapshot::default();

    for line in reader.lines() {
        let line = line?;
        if let Some((key, value)) = parse_line(&line)? {
            snapshot.absorb(key, value);
        }
    }

    if snapshot.mem_total == 0 {
        return Err(MemInfoError::Parse(
            "no memory detected! Perhaps /proc/meminfo is in an unexpected format".into(),
        ));
    }
    if snapshot.mem_total
        < snapshot.mem_free + snapshot.buffers + snapshot.cached + snapshot.swap_cached
    {
        return Err(MemInfoError::Parse(
            "memory statistics read from /proc/meminfo don't add up".into(),
        ));
    }

    Ok(snapshot)
}

/// Parse one line of /proc/meminfo into a key and a byte count.
///
/// Three historical shapes are accepted: `Key: number unit` (the unit may
/// be any of B/kB/KiB/MB/MiB/GB/GiB, first letter case-insensitive),
/// `Key: number` with the value already in bytes, and two Linux 2.4
/// oddities that are silently skipped: a whitespace-indented header line,
/// and summary lines carrying a second number where the unit would be.
fn parse_line(line: &str) -> Result<Option<(&str, i64)>> {
    if line.is_empty() || line.starts_with(|c: char| c.is_ascii_whitespace()) {
        return Ok(None);
    }

    let parse_failure = || MemInfoError::Parse(format!("parse error in /proc/meminfo: '{line}'"));

    let (key, rest) = line.split_once(':').ok_or_else(&parse_failure)?;
    let mut fields = rest.split_whitespace();
    let value: i64 = fields
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(&parse_failure)?;

    let scale = match fields.next() {
        None => 1,
        Some(unit) if unit.starts_with(|c: char| c.is_ascii_digit()) => return Ok(None),
        Some(unit) => unit_scale(unit).ok_or_else(|| {
            MemInfoError::Parse(format!("unknown scale factor in /proc/meminfo: {unit}"))
        })?,
    };

    Ok(Some((key, value * scale)))
}

fn unit_scale(unit: &str) -> Option<i64> {
    fn first_letter(b: u8) -> Option<i64> {
        match b.to_ascii_lowercase() {
            b'b' => Some(1),
            b'k' => Some(KIB),
            b'm' => Some(MIB),
            b'g' => Some(GIB),
            _ => None,
        }
    }

    match unit.as_bytes() {
        [c] => first_letter(*c),
        [c, b'B'] => first_letter(*c),
        [c, b'i', b'B'] => first_letter(*c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<MemSnapshot> {
        parse_snapshot(content.as_bytes())
    }

    #[test]
    fn parses_canonical_meminfo() {
        let snap = parse(
            "MemTotal:        1048576 kB\n\
             MemFree:          102400 kB\n\
             Buffers:           10240 kB\n\
             Cached:            20480 kB\n\
             SwapCached:            0 kB\n\
             Dirty:               512 kB\n\
             Writeback:             0 kB\n\
             SwapTotal:        524288 kB\n\
             SwapFree:         524288 kB\n\
             Slab:              31337 kB\n",
        )
        .unwrap();
        assert_eq!(snap.mem_total, 1048576 * KIB);
        assert_eq!(snap.mem_free, 102400 * KIB);
        assert_eq!(snap.buffers, 10240 * KIB);
        assert_eq!(snap.dirty, 512 * KIB);
        assert_eq!(snap.swap_total, 524288 * KIB);
    }

    #[test]
    fn line_without_unit_is_bytes() {
        let snap = parse(
            "MemTotal: 1048576 kB\n\
             HugePages_Total: 4\n\
             MemFree: 1024\n",
        )
        .unwrap();
        assert_eq!(snap.mem_free, 1024);
    }

    #[test]
    fn accepts_unit_spellings() {
        for (unit, scale) in [
            ("B", 1),
            ("kB", KIB),
            ("KiB", KIB),
            ("MB", MIB),
            ("MiB", MIB),
            ("GB", GIB),
            ("GiB", GIB),
            ("g", GIB),
        ] {
            let content = format!("MemTotal: 7 {unit}\n");
            let snap = parse(&content).unwrap();
            assert_eq!(snap.mem_total, 7 * scale, "unit {unit}");
        }
    }

    #[test]
    fn rejects_unknown_scale_factor() {
        let err = parse("MemTotal: 7 xB\n").unwrap_err();
        assert!(err.to_string().contains("unknown scale factor"));
        // A trailing 'i' is only accepted in the middle position.
        assert!(parse("MemTotal: 7 kib\n").is_err());
    }

    #[test]
    fn skips_legacy_header_and_summary_lines() {
        let snap = parse(
            "        total:    used:    free:\n\
             Mem:  1073741824 536870912 536870912\n\
             MemTotal: 1048576 kB\n",
        )
        .unwrap();
        assert_eq!(snap.mem_total, 1048576 * KIB);
    }

    #[test]
    fn no_memory_detected() {
        let err = parse("SwapTotal: 0 kB\n").unwrap_err();
        assert!(err.to_string().contains("no memory detected"));
    }

    #[test]
    fn rejects_inconsistent_accounting() {
        let err = parse(
            "MemTotal: 100 kB\n\
             MemFree: 90 kB\n\
             Cached: 90 kB\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("don't add up"));
    }

    #[test]
    fn rejects_garbage_line() {
        assert!(parse("MemTotal: 1048576 kB\nth!s is not meminfo\n").is_err());
    }
}
