// Memory pressure model: how much space is really free, and how much
// swap should change to hit the configured target.
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::Config;
use crate::meminfo::{self, MemInfoError, MemSnapshot};
use crate::{error, info};

/// How much buffer space can the system be expected to free up?
fn buffers_free(st: &MemSnapshot, cfg: &Config) -> i64 {
    (st.buffers / 100) * cfg.buffer_elasticity
}

/// How much cache space can the system be expected to free up? Dirty and
/// writeback pages are pinned until flushed; the remainder is discounted
/// by the configured elasticity.
fn cache_free(st: &MemSnapshot, cfg: &Config) -> i64 {
    let cache = st.cached - (st.dirty + st.writeback);
    if cache > 0 {
        (cache / 100) * cfg.cache_elasticity
    } else {
        0
    }
}

fn space_free(st: &MemSnapshot, cfg: &Config) -> i64 {
    st.mem_free + st.swap_free + st.swap_cached + buffers_free(st, cfg) + cache_free(st, cfg)
}

fn space_total(st: &MemSnapshot) -> i64 {
    st.mem_total + st.swap_total
}

/// Estimated free share of total space, in whole percent. Phrased
/// division-first so the intermediate values stay in range on
/// large-memory hosts.
pub fn percent_free(st: &MemSnapshot, cfg: &Config) -> i64 {
    space_free(st, cfg) / (space_total(st) / 100).max(1)
}

/// Ideal change in swap space: the x satisfying
/// (free + x) / (total + x) = freetarget / 100, solved symbolically and
/// computed at a granularity of 100 bytes to stay clear of overflow.
/// The (total + 50) / 100 term rounds to nearest rather than truncating,
/// recovering some of the lost precision.
pub fn ideal_delta(total: i64, free: i64, freetarget: i64) -> i64 {
    100 * ((free - freetarget * ((total + 50) / 100)) / (freetarget - 100))
}

/// Recommended change in swap space for this snapshot: positive bytes to
/// allocate, negative bytes to release, zero while the free estimate sits
/// between the two limits.
pub fn recommendation(st: &MemSnapshot, cfg: &Config) -> i64 {
    let free = percent_free(st, cfg);
    if free < cfg.lower_freelimit || free > cfg.upper_freelimit {
        ideal_delta(space_total(st), space_free(st, cfg), cfg.freetarget)
    } else {
        0
    }
}

/// Read the current memory state and recommend a change in swap space.
pub fn memory_target(cfg: &Config) -> Result<i64, MemInfoError> {
    Ok(recommendation(&meminfo::read_snapshot()?, cfg))
}

/// Smallest swap file the daemon can expect to allocate: the size it
/// would ask for if the system sat exactly at the lower free limit. Used
/// at startup to judge whether the swap directory's filesystem is big
/// enough to be useful.
pub fn minimal_swapfile(cfg: &Config) -> Result<i64, MemInfoError> {
    let st = meminfo::read_snapshot()?;
    let total = space_total(&st);
    Ok(ideal_delta(
        total,
        (total / 100) * cfg.lower_freelimit,
        cfg.freetarget,
    ))
}

/// Report the initial memory situation once at startup.
pub fn check_memory_status(cfg: &Config) -> Result<(), MemInfoError> {
    let target = memory_target(cfg)?;
    if target > 0 {
        info!("Initial memory status: would prefer {} extra bytes", target);
    } else if target < 0 {
        info!("Initial memory status: {} bytes to spare", -target);
    }
    Ok(())
}

fn dump_memline(category: &str, total: i64, free: i64, cached: i64) {
    info!(
        "{}: {} total, {} free ({} used); {} cached",
        category,
        total,
        free,
        total - free,
        cached
    );
}

/// Log the full memory picture, for the status dump.
pub fn dump_memory(cfg: &Config) {
    let st = match meminfo::read_snapshot() {
        Ok(st) => st,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    dump_memline("core", st.mem_total, st.mem_free, st.cached);
    dump_memline("swap", st.swap_total, st.swap_free, st.swap_cached);
    dump_memline(
        "total",
        space_total(&st),
        st.mem_free + st.swap_free,
        st.cached + st.swap_cached,
    );
    info!(
        "bufs: {}, dirty: {}, writeback: {}",
        st.buffers, st.dirty, st.writeback
    );

    let pf = percent_free(&st, cfg);
    info!(
        "estimate free: {} cache, {} bufs, {} total ({}%)",
        cache_free(&st, cfg),
        buffers_free(&st, cfg),
        space_free(&st, cfg),
        pf
    );
    info!(
        "thresholds: {}% < {}% < {}%",
        cfg.lower_freelimit, pf, cfg.upper_freelimit
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GIB, MIB, TIB};

    fn snapshot(mem_total: i64, mem_free: i64) -> MemSnapshot {
        MemSnapshot {
            mem_total,
            mem_free,
            ..Default::default()
        }
    }

    #[test]
    fn grow_recommended_under_pressure() {
        // 1 GiB host with 50 MiB free and no swap: roughly 5% free, well
        // below the default lower limit of 20%.
        let cfg = Config::default();
        let st = snapshot(GIB, 50 * MIB);

        assert_eq!(percent_free(&st, &cfg), 4);

        let r = recommendation(&st, &cfg);
        // Exact solution of (F + x) / (T + x) = 0.30 for these numbers.
        let exact = 385_276_781i64;
        assert!(r > 0);
        assert!((r - exact).abs() * 100 < exact, "{r} not within 1% of {exact}");
    }

    #[test]
    fn no_recommendation_between_limits() {
        let cfg = Config::default();
        // 40% free sits between the 20/60 default limits.
        let st = snapshot(GIB, 410 * MIB);
        let pf = percent_free(&st, &cfg);
        assert!(pf > cfg.lower_freelimit && pf < cfg.upper_freelimit);
        assert_eq!(recommendation(&st, &cfg), 0);
    }

    #[test]
    fn shrink_recommended_when_overprovisioned() {
        let cfg = Config::default();
        let st = MemSnapshot {
            mem_total: GIB,
            mem_free: 800 * MIB,
            swap_total: GIB,
            swap_free: GIB,
            ..Default::default()
        };
        assert!(percent_free(&st, &cfg) > cfg.upper_freelimit);
        assert!(recommendation(&st, &cfg) < 0);
    }

    #[test]
    fn ideal_delta_sign_law() {
        // ideal_delta(T, F) <= 0 exactly when F / T >= freetarget / 100,
        // up to rounding at the boundary.
        for &(total, free, target) in &[
            (1_000_000i64, 100_000i64, 30i64),
            (1_000_000, 500_000, 30),
            (10 * GIB, GIB, 50),
            (10 * GIB, 9 * GIB, 50),
            (GIB, 300 * MIB, 25),
        ] {
            let delta = ideal_delta(total, free, target);
            let free_ratio_at_least_target = free * 100 >= target * total;
            assert_eq!(
                delta <= 0,
                free_ratio_at_least_target,
                "T={total} F={free} t={target} delta={delta}"
            );
        }
    }

    #[test]
    fn ideal_delta_lands_on_target() {
        // Applying the recommended delta should land close to the target.
        let (total, free, target) = (4 * GIB, 200 * MIB, 30i64);
        let x = ideal_delta(total, free, target);
        let landed = (free + x) as f64 / (total + x) as f64 * 100.0;
        assert!((landed - target as f64).abs() < 1.0, "landed at {landed}%");
    }

    #[test]
    fn percent_free_is_overflow_safe_on_large_hosts() {
        let cfg = Config::default();
        let st = MemSnapshot {
            mem_total: TIB,
            mem_free: 100 * GIB,
            buffers: 10 * GIB,
            cached: 50 * GIB,
            dirty: GIB,
            ..Default::default()
        };
        let pf = percent_free(&st, &cfg) as f64;
        let exact_free = 100.0 * GIB as f64
            + (10.0 * GIB as f64) * 0.30
            + (49.0 * GIB as f64) * 0.80;
        let exact = exact_free / TIB as f64 * 100.0;
        assert!((pf - exact).abs() <= 1.0, "{pf} vs {exact}");
    }

    #[test]
    fn elasticities_discount_buffers_and_cache() {
        let mut cfg = Config::default();
        cfg.buffer_elasticity = 50;
        cfg.cache_elasticity = 0;
        let st = MemSnapshot {
            mem_total: GIB,
            mem_free: 0,
            buffers: 200 * MIB,
            cached: 300 * MIB,
            ..Default::default()
        };
        // Only half the buffers count; cache contributes nothing at 0%.
        assert_eq!(space_free(&st, &cfg), (200 * MIB / 100) * 50);

        // Fully dirty cache never counts, whatever the elasticity.
        cfg.cache_elasticity = 80;
        let dirty = MemSnapshot {
            dirty: 400 * MIB,
            ..st
        };
        assert_eq!(space_free(&dirty, &cfg), (200 * MIB / 100) * 50);
    }
}
