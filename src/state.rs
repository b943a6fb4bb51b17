// Allocation policy: a small state machine with hysteresis that turns
// signed size recommendations into grow/shrink actions.
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{debug, info};

/// Outcome the swap pool reports for a grow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowOutcome {
    /// A swap file was created and activated.
    Grown,
    /// Nothing was allocated; worth retrying when conditions change.
    Denied,
    /// Nothing was allocated and the backing store pushed back hard
    /// (disk full, I/O error, activation failure).
    DeniedHard,
}

/// The policy machine's view of the swap file fleet.
pub trait SwapPool {
    /// Try to add roughly `bytes` of swap capacity.
    fn grow(&mut self, bytes: i64) -> GrowOutcome;
    /// Release one swap file of at most `max_bytes`, if one fits.
    fn shrink(&mut self, max_bytes: i64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Ran into a disk limit; allocation is inhibited.
    Diet,
    /// Wants more swap, or at least won't consider releasing any.
    Hungry,
    /// Entirely neutral.
    Steady,
    /// Waiting to see whether it is okay to release swap.
    Overfed,
}

impl PolicyState {
    fn name(self) -> &'static str {
        match self {
            PolicyState::Diet => "diet",
            PolicyState::Hungry => "hungry",
            PolicyState::Steady => "steady",
            PolicyState::Overfed => "overfed",
        }
    }
}

pub struct Policy {
    state: PolicyState,
    cooldown: i64,
    /// Remaining ticks before the timer-driven return to steady.
    timer: i64,
    /// Latched request to enter diet on the next step.
    need_diet: bool,
}

impl Policy {
    pub fn new(cooldown: i64) -> Self {
        Policy {
            state: PolicyState::Hungry,
            cooldown,
            timer: cooldown,
            need_diet: false,
        }
    }

    /// Latch a transition to diet for the next step. Set when the pool
    /// reports a hard allocation failure, or on an operator's request
    /// for an immediate adjustment.
    pub fn request_diet(&mut self) {
        self.need_diet = true;
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn timer(&self) -> i64 {
        self.timer
    }

    fn transition(&mut self, to: PolicyState) {
        debug!("{} -> {}", self.state.name(), to.name());
        self.state = to;
        self.timer = self.cooldown;
    }

    /// One tick of the allocation policy.
    pub fn step(&mut self, recommendation: i64, pool: &mut dyn SwapPool) {
        if self.need_diet {
            self.need_diet = false;
            self.transition(PolicyState::Diet);
            return;
        }

        self.timer = (self.timer - 1).max(0);

        if recommendation > 0 && self.state != PolicyState::Diet {
            // A shortage of memory overrides whatever state we were in:
            // jump straight to hungry, allocating along the way. A hard
            // failure sends us to diet on the next step instead.
            match pool.grow(recommendation) {
                GrowOutcome::Grown => self.transition(PolicyState::Hungry),
                GrowOutcome::DeniedHard => self.need_diet = true,
                GrowOutcome::Denied => {}
            }
        } else if self.timer == 0 {
            // Every state except steady is designed to time out, and in
            // every case that leads back to steady. Timing out of overfed
            // is the one place swap is normally released.
            if self.state == PolicyState::Overfed {
                pool.shrink(-recommendation);
            }
            self.transition(PolicyState::Steady);
        } else {
            match self.state {
                PolicyState::Diet => {
                    // Overallocated while on a diet: release right away,
                    // but stay in diet or we may invite thrashing.
                    if recommendation < 0 {
                        pool.shrink(-recommendation);
                    }
                }
                PolicyState::Steady => {
                    if recommendation < 0 {
                        self.transition(PolicyState::Overfed);
                    }
                }
                PolicyState::Overfed => {
                    if recommendation >= 0 {
                        self.transition(PolicyState::Steady);
                    }
                }
                PolicyState::Hungry => {}
            }
        }
    }

    pub fn dump(&self) {
        info!("state: {}", self.state.name());
        if self.timer > 0 {
            info!("timer: {}", self.timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockPool {
        grown: Vec<i64>,
        shrunk: Vec<i64>,
        outcome: GrowOutcome,
    }

    impl MockPool {
        fn new(outcome: GrowOutcome) -> Self {
            MockPool {
                grown: Vec::new(),
                shrunk: Vec::new(),
                outcome,
            }
        }
    }

    impl SwapPool for MockPool {
        fn grow(&mut self, bytes: i64) -> GrowOutcome {
            self.grown.push(bytes);
            self.outcome
        }
        fn shrink(&mut self, max_bytes: i64) {
            self.shrunk.push(max_bytes);
        }
    }

    #[test]
    fn starts_hungry_with_full_timer() {
        let policy = Policy::new(600);
        assert_eq!(policy.state(), PolicyState::Hungry);
        assert_eq!(policy.timer(), 600);
    }

    #[test]
    fn positive_recommendation_allocates_and_resets_timer() {
        let mut policy = Policy::new(600);
        let mut pool = MockPool::new(GrowOutcome::Grown);

        policy.step(0, &mut pool);
        assert_eq!(policy.timer(), 599);

        policy.step(400 << 20, &mut pool);
        assert_eq!(pool.grown, vec![400 << 20]);
        assert_eq!(policy.state(), PolicyState::Hungry);
        assert_eq!(policy.timer(), 600);
    }

    #[test]
    fn denied_grow_changes_nothing() {
        let mut policy = Policy::new(600);
        let mut pool = MockPool::new(GrowOutcome::Denied);

        policy.step(1 << 20, &mut pool);
        assert_eq!(pool.grown.len(), 1);
        assert_eq!(policy.state(), PolicyState::Hungry);
        assert_eq!(policy.timer(), 599);
    }

    #[test]
    fn hard_failure_leads_to_diet() {
        let mut policy = Policy::new(600);
        let mut pool = MockPool::new(GrowOutcome::DeniedHard);

        policy.step(1 << 20, &mut pool);
        assert_eq!(policy.state(), PolicyState::Hungry);

        // The latched failure wins over the new recommendation.
        policy.step(1 << 20, &mut pool);
        assert_eq!(policy.state(), PolicyState::Diet);
        assert_eq!(policy.timer(), 600);
        assert_eq!(pool.grown.len(), 1);

        // In diet, positive recommendations are ignored entirely.
        policy.step(1 << 20, &mut pool);
        assert_eq!(pool.grown.len(), 1);
        assert_eq!(policy.state(), PolicyState::Diet);

        // A negative recommendation frees swap without leaving diet.
        policy.step(-(1 << 20), &mut pool);
        assert_eq!(pool.shrunk, vec![1 << 20]);
        assert_eq!(policy.state(), PolicyState::Diet);
    }

    #[test]
    fn requested_diet_applies_on_next_step() {
        let mut policy = Policy::new(600);
        let mut pool = MockPool::new(GrowOutcome::Grown);

        policy.request_diet();
        policy.step(1 << 20, &mut pool);
        assert_eq!(policy.state(), PolicyState::Diet);
        assert!(pool.grown.is_empty());
    }

    fn steady_policy(cooldown: i64, pool: &mut MockPool) -> Policy {
        let mut policy = Policy::new(cooldown);
        for _ in 0..cooldown {
            policy.step(0, pool);
        }
        assert_eq!(policy.state(), PolicyState::Steady);
        policy
    }

    #[test]
    fn surplus_must_persist_for_a_full_cooldown() {
        let mut pool = MockPool::new(GrowOutcome::Grown);
        let mut policy = steady_policy(3, &mut pool);

        policy.step(-256, &mut pool);
        assert_eq!(policy.state(), PolicyState::Overfed);
        assert!(pool.shrunk.is_empty());

        // Surplus evaporates before the timer runs out: back to steady,
        // nothing released.
        policy.step(0, &mut pool);
        assert_eq!(policy.state(), PolicyState::Steady);
        assert!(pool.shrunk.is_empty());
    }

    #[test]
    fn overfed_timeout_releases_swap() {
        let mut pool = MockPool::new(GrowOutcome::Grown);
        let mut policy = steady_policy(3, &mut pool);

        policy.step(-256, &mut pool);
        assert_eq!(policy.state(), PolicyState::Overfed);

        policy.step(-256, &mut pool);
        policy.step(-256, &mut pool);
        assert_eq!(policy.state(), PolicyState::Overfed);
        assert!(pool.shrunk.is_empty());

        // Third tick after the transition exhausts the cooldown.
        policy.step(-256, &mut pool);
        assert_eq!(policy.state(), PolicyState::Steady);
        assert_eq!(pool.shrunk, vec![256]);
    }

    #[test]
    fn timer_stays_within_bounds() {
        let mut pool = MockPool::new(GrowOutcome::Denied);
        let mut policy = Policy::new(5);
        for i in 0..20 {
            policy.step(if i % 3 == 0 { 1 } else { -1 }, &mut pool);
            assert!(policy.timer() >= 0 && policy.timer() <= 5);
        }
    }
}
