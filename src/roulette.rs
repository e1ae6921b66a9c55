//! Roulette strip geometry and spin animation.
//!
//! The strip repeats the catalog `copies` times. A spin scrolls the strip from
//! offset zero to a landing offset that puts the target card under a pointer
//! fixed at the middle of the container, after `extra_rotations` full loops.
//! Offsets are horizontal translations in pixels: negative values move the
//! strip to the left.
//!
//! Timing is driven by [`Roulette::tick`]. Nothing runs in the background, so
//! cancelling a spin is a plain state change.

use crate::api::Prize;
use std::time::{
    Duration,
    Instant,
};
use thiserror::Error;

pub const DEFAULT_CARD_WIDTH: f64 = 175.0;
pub const DEFAULT_CONTAINER_WIDTH: f64 = 1200.0;
pub const DEFAULT_MIN_COPIES: usize = 10;
pub const DEFAULT_MIN_SCREENS: f64 = 3.0;
pub const DEFAULT_EXTRA_ROTATIONS: usize = 5;
pub const DEFAULT_SPIN_DURATION: Duration = Duration::from_millis(6000);
pub const DEFAULT_SETTLE_DURATION: Duration = Duration::from_millis(1200);
pub const DEFAULT_LANDING_JITTER: f64 = 0.6;

// Share of the spin time spent accelerating and decelerating.
const LAUNCH_TIME_SHARE: f64 = 0.2;
const LANDING_TIME_SHARE: f64 = 0.4;

#[derive(Clone, Debug, PartialEq)]
pub struct RouletteConfig {
    pub card_width: f64,
    pub container_width: f64,
    /// Floor on strip copies regardless of catalog size.
    pub min_copies: usize,
    /// Minimum strip length measured in container widths.
    pub min_screens: f64,
    pub extra_rotations: usize,
    pub spin_duration: Duration,
    pub settle_duration: Duration,
    /// Fraction of half a card the landing point may drift from the card centre.
    pub landing_jitter: f64,
}

impl Default for RouletteConfig {
    fn default() -> Self {
        RouletteConfig {
            card_width: DEFAULT_CARD_WIDTH,
            container_width: DEFAULT_CONTAINER_WIDTH,
            min_copies: DEFAULT_MIN_COPIES,
            min_screens: DEFAULT_MIN_SCREENS,
            extra_rotations: DEFAULT_EXTRA_ROTATIONS,
            spin_duration: DEFAULT_SPIN_DURATION,
            settle_duration: DEFAULT_SETTLE_DURATION,
            landing_jitter: DEFAULT_LANDING_JITTER,
        }
    }
}

impl RouletteConfig {
    /// Translation that centres card zero under the pointer.
    pub fn pointer_adjust(&self) -> f64 {
        (self.container_width - self.card_width) / 2.0
    }

    fn tolerance(&self) -> f64 {
        self.landing_jitter.clamp(0.0, 0.9) * self.card_width / 2.0
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SpinError {
    #[error("The roulette is already spinning")]
    AlreadySpinning,
    #[error("All prizes have been claimed")]
    EmptyStrip,
    #[error("prize index {target} is outside a catalog of {len}")]
    TargetOutOfRange { target: usize, len: usize },
}

/// Number of catalog copies needed for a catalog of `n` prizes.
pub fn copies_for(n: usize, config: &RouletteConfig) -> usize {
    if n == 0 {
        return 0;
    }
    let loop_width = n as f64 * config.card_width;
    let for_screens = (config.min_screens * config.container_width / loop_width).ceil();
    // middle copy, the extra loops past it, and one trailing copy
    let for_spin = config.extra_rotations * 2 + 3;
    config.min_copies.max(for_screens as usize).max(for_spin)
}

/// The repeated sequence of prize cards rendered for the animation.
#[derive(Clone, Debug, PartialEq)]
pub struct Strip {
    prizes: Vec<Prize>,
    copies: usize,
    card_width: f64,
}

impl Strip {
    pub fn build(prizes: &[Prize], config: &RouletteConfig) -> Option<Self> {
        if prizes.is_empty() {
            return None;
        }
        Some(Strip {
            prizes: prizes.to_vec(),
            copies: copies_for(prizes.len(), config),
            card_width: config.card_width,
        })
    }

    pub fn prizes(&self) -> &[Prize] {
        &self.prizes
    }

    pub fn copies(&self) -> usize {
        self.copies
    }

    /// Total number of cards on the strip.
    pub fn len(&self) -> usize {
        self.copies * self.prizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prizes.is_empty()
    }

    pub fn card_width(&self) -> f64 {
        self.card_width
    }

    /// Width of one pass through the catalog.
    pub fn loop_width(&self) -> f64 {
        self.prizes.len() as f64 * self.card_width
    }

    pub fn total_width(&self) -> f64 {
        self.len() as f64 * self.card_width
    }

    pub fn card(&self, flat_index: usize) -> &Prize {
        &self.prizes[flat_index % self.prizes.len()]
    }

    pub fn middle_copy(&self) -> usize {
        self.copies / 2
    }

    /// Flat index of `target` in the copy reached after the extra loops.
    pub fn landing_index(&self, target: usize, extra_rotations: usize) -> usize {
        (self.middle_copy() + extra_rotations) * self.prizes.len() + target
    }

    /// Offset that centres `flat_index` under the pointer.
    pub fn centered_offset(&self, flat_index: usize, container_width: f64) -> f64 {
        (container_width - self.card_width) / 2.0 - flat_index as f64 * self.card_width
    }

    /// Flat index of the card under the pointer at `offset`.
    pub fn card_under_pointer(&self, offset: f64, container_width: f64) -> Option<usize> {
        let x = -offset + container_width / 2.0;
        if x < 0.0 {
            return None;
        }
        let index = (x / self.card_width).floor() as usize;
        (index < self.len()).then_some(index)
    }
}

/// Landing offset for `target`; `jitter` in `[-1, 1]` moves the landing point
/// within the card's tolerance window.
pub fn landing_offset(
    strip: &Strip,
    target: usize,
    jitter: f64,
    config: &RouletteConfig,
) -> f64 {
    let adjust = config.pointer_adjust();
    let k = strip.landing_index(target, config.extra_rotations);
    let mut distance =
        k as f64 * strip.card_width() + jitter.clamp(-1.0, 1.0) * config.tolerance();

    // never scroll past the end of the strip; step back by whole loops so the
    // landed prize is unchanged
    let bound = strip.total_width() - config.container_width + adjust;
    let loop_width = strip.loop_width();
    while distance > bound && distance - loop_width >= 0.0 {
        distance -= loop_width;
    }
    -distance + adjust
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpinStage {
    Launch,
    Cruise,
    Landing,
    Done,
}

/// Distance shares chosen so the velocity is continuous across stages.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SpinProfile {
    launch_time: f64,
    landing_time: f64,
    launch_distance: f64,
    cruise_distance: f64,
}

impl SpinProfile {
    fn new(launch_time: f64, landing_time: f64) -> Self {
        let cruise_time = 1.0 - launch_time - landing_time;
        let velocity = 1.0 / (launch_time / 2.0 + cruise_time + landing_time / 2.0);
        SpinProfile {
            launch_time,
            landing_time,
            launch_distance: velocity * launch_time / 2.0,
            cruise_distance: velocity * cruise_time,
        }
    }

    fn stage(&self, t: f64) -> SpinStage {
        if t >= 1.0 {
            SpinStage::Done
        } else if t < self.launch_time {
            SpinStage::Launch
        } else if t < 1.0 - self.landing_time {
            SpinStage::Cruise
        } else {
            SpinStage::Landing
        }
    }

    /// Travelled fraction of the distance at time fraction `t`.
    fn progress(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self.stage(t) {
            SpinStage::Launch => {
                let u = t / self.launch_time;
                self.launch_distance * u * u
            }
            SpinStage::Cruise => {
                let cruise_time = 1.0 - self.launch_time - self.landing_time;
                let u = (t - self.launch_time) / cruise_time;
                self.launch_distance + self.cruise_distance * u
            }
            SpinStage::Landing => {
                let landing_distance =
                    1.0 - self.launch_distance - self.cruise_distance;
                let u = (t - (1.0 - self.landing_time)) / self.landing_time;
                self.launch_distance
                    + self.cruise_distance
                    + landing_distance * (1.0 - (1.0 - u) * (1.0 - u))
            }
            SpinStage::Done => 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpinPlan {
    strip: Strip,
    target: usize,
    landing_index: usize,
    start_offset: f64,
    end_offset: f64,
    duration: Duration,
    profile: SpinProfile,
}

impl SpinPlan {
    pub fn new(
        strip: Strip,
        target: usize,
        jitter: f64,
        config: &RouletteConfig,
    ) -> Result<Self, SpinError> {
        if target >= strip.prizes().len() {
            return Err(SpinError::TargetOutOfRange {
                target,
                len: strip.prizes().len(),
            });
        }
        let end_offset = landing_offset(&strip, target, jitter, config);
        let landing_index = strip
            .card_under_pointer(end_offset, config.container_width)
            .unwrap_or_else(|| strip.landing_index(target, config.extra_rotations));
        Ok(SpinPlan {
            strip,
            target,
            landing_index,
            start_offset: 0.0,
            end_offset,
            duration: config.spin_duration,
            profile: SpinProfile::new(LAUNCH_TIME_SHARE, LANDING_TIME_SHARE),
        })
    }

    pub fn strip(&self) -> &Strip {
        &self.strip
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn target_prize(&self) -> &Prize {
        &self.strip.prizes()[self.target]
    }

    pub fn landing_index(&self) -> usize {
        self.landing_index
    }

    pub fn end_offset(&self) -> f64 {
        self.end_offset
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn fraction(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        elapsed.as_secs_f64() / self.duration.as_secs_f64()
    }

    pub fn stage_at(&self, elapsed: Duration) -> SpinStage {
        self.profile.stage(self.fraction(elapsed))
    }

    pub fn offset_at(&self, elapsed: Duration) -> f64 {
        let progress = self.profile.progress(self.fraction(elapsed));
        self.start_offset + (self.end_offset - self.start_offset) * progress
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RouletteState {
    Idle,
    Spinning { plan: SpinPlan, started_at: Instant },
    Settling { plan: SpinPlan, landed_at: Instant },
}

/// Completion signals emitted by [`Roulette::tick`].
#[derive(Clone, Debug, PartialEq)]
pub enum SpinEvent {
    Landed { prize: Prize, flat_index: usize },
    Settled,
}

pub struct Roulette {
    config: RouletteConfig,
    state: RouletteState,
    resting: Option<(Strip, f64)>,
}

impl Roulette {
    pub fn new(config: RouletteConfig) -> Self {
        Self {
            config,
            state: RouletteState::Idle,
            resting: None,
        }
    }

    pub fn config(&self) -> &RouletteConfig {
        &self.config
    }

    pub fn state(&self) -> &RouletteState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, RouletteState::Idle)
    }

    pub fn spin(
        &mut self,
        prizes: &[Prize],
        target: usize,
        jitter: f64,
        now: Instant,
    ) -> Result<(), SpinError> {
        if !self.is_idle() {
            return Err(SpinError::AlreadySpinning);
        }
        let strip = Strip::build(prizes, &self.config).ok_or(SpinError::EmptyStrip)?;
        let plan = SpinPlan::new(strip, target, jitter, &self.config)?;
        tracing::debug!(
            target,
            copies = plan.strip().copies(),
            end_offset = plan.end_offset(),
            "roulette spin started"
        );
        self.state = RouletteState::Spinning {
            plan,
            started_at: now,
        };
        Ok(())
    }

    /// Advance the state machine; at most one transition per call.
    pub fn tick(&mut self, now: Instant) -> Option<SpinEvent> {
        match &self.state {
            RouletteState::Idle => None,
            RouletteState::Spinning { plan, started_at } => {
                if now.saturating_duration_since(*started_at) < plan.duration() {
                    return None;
                }
                let plan = plan.clone();
                let event = SpinEvent::Landed {
                    prize: plan.strip().card(plan.landing_index()).clone(),
                    flat_index: plan.landing_index(),
                };
                self.state = RouletteState::Settling {
                    plan,
                    landed_at: now,
                };
                Some(event)
            }
            RouletteState::Settling { plan, landed_at } => {
                if now.saturating_duration_since(*landed_at) < self.config.settle_duration
                {
                    return None;
                }
                self.resting = Some((plan.strip().clone(), plan.end_offset()));
                self.state = RouletteState::Idle;
                Some(SpinEvent::Settled)
            }
        }
    }

    /// Abort a running spin. Returns whether anything was cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        tracing::debug!("roulette spin cancelled");
        self.state = RouletteState::Idle;
        self.resting = None;
        true
    }

    /// Forget the strip left on screen by the last spin.
    pub fn clear_resting(&mut self) {
        self.resting = None;
    }

    /// Strip and offset to render at `now`, if a spin ran or is running.
    pub fn frame(&self, now: Instant) -> Option<(&Strip, f64)> {
        match &self.state {
            RouletteState::Idle => self.resting.as_ref().map(|(s, o)| (s, *o)),
            RouletteState::Spinning { plan, started_at } => Some((
                plan.strip(),
                plan.offset_at(now.saturating_duration_since(*started_at)),
            )),
            RouletteState::Settling { plan, .. } => {
                Some((plan.strip(), plan.end_offset()))
            }
        }
    }

    /// Index of the highlighted card while settling.
    pub fn settled_index(&self) -> Option<usize> {
        match &self.state {
            RouletteState::Settling { plan, .. } => Some(plan.landing_index()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VisibleCard<'a> {
    pub flat_index: usize,
    pub prize: &'a Prize,
    /// Left edge relative to the container.
    pub left: f64,
}

/// Cards intersecting the container at `offset`.
pub fn visible_cards<'a>(
    strip: &'a Strip,
    offset: f64,
    container_width: f64,
) -> Vec<VisibleCard<'a>> {
    let card_width = strip.card_width();
    let first = ((-offset) / card_width).floor().max(0.0) as usize;
    (first..strip.len())
        .map(|flat_index| VisibleCard {
            flat_index,
            prize: strip.card(flat_index),
            left: flat_index as f64 * card_width + offset,
        })
        .skip_while(|card| card.left + card_width <= 0.0)
        .take_while(|card| card.left < container_width)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::catalog;
    use proptest::prelude::*;

    fn config() -> RouletteConfig {
        RouletteConfig::default()
    }

    fn names(n: usize) -> Vec<Prize> {
        let owned: Vec<String> = (0..n).map(|i| format!("P{i}")).collect();
        let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
        catalog(&refs)
    }

    #[test]
    fn landing_offset__matches_three_card_scenario() {
        // given
        let config = RouletteConfig {
            landing_jitter: 0.0,
            ..config()
        };
        let prizes = catalog(&["A", "B", "C"]);
        let strip = Strip::build(&prizes, &config).unwrap();

        // when
        let offset = landing_offset(&strip, 1, 0.0, &config);

        // then
        let k = strip.landing_index(1, config.extra_rotations);
        assert_eq!(offset, -(k as f64 * 175.0) + 512.5);
        assert_eq!(strip.card(k).name, "B");
        assert_eq!(k % 3, 1);
    }

    #[test]
    fn landing_offset__puts_every_target_under_pointer_for_sample_sizes() {
        let config = config();
        for n in [1usize, 3, 7, 50] {
            let prizes = names(n);
            let strip = Strip::build(&prizes, &config).unwrap();
            for target in 0..n {
                for jitter in [-1.0, 0.0, 1.0] {
                    let offset = landing_offset(&strip, target, jitter, &config);
                    let index = strip
                        .card_under_pointer(offset, config.container_width)
                        .unwrap();
                    assert_eq!(index % n, target, "n={n} target={target}");
                }
            }
        }
    }

    #[test]
    fn copies_for__respects_floor_and_screen_minimum() {
        let config = config();
        for n in [1usize, 3, 7, 50, 400] {
            let strip = Strip::build(&names(n), &config).unwrap();
            assert!(strip.copies() >= config.min_copies);
            assert!(
                strip.total_width() >= config.min_screens * config.container_width,
                "n={n}"
            );
        }
    }

    #[test]
    fn copies_for__empty_catalog_has_no_copies() {
        assert_eq!(copies_for(0, &config()), 0);
        assert!(Strip::build(&[], &config()).is_none());
    }

    #[test]
    fn landing_offset__clamps_by_whole_loops_when_strip_is_short() {
        // given
        let config = RouletteConfig {
            min_copies: 1,
            min_screens: 0.0,
            extra_rotations: 40,
            landing_jitter: 0.0,
            ..config()
        };
        let prizes = catalog(&["A", "B"]);
        let strip = Strip {
            prizes: prizes.clone(),
            copies: 12,
            card_width: config.card_width,
        };

        // when
        let offset = landing_offset(&strip, 1, 0.0, &config);

        // then
        let visible_end = -offset + config.container_width;
        assert!(visible_end <= strip.total_width() + f64::EPSILON);
        let index = strip
            .card_under_pointer(offset, config.container_width)
            .unwrap();
        assert_eq!(strip.card(index).name, "B");
    }

    #[test]
    fn spin_plan__offset_moves_monotonically_through_stages() {
        // given
        let config = config();
        let strip = Strip::build(&names(4), &config).unwrap();
        let plan = SpinPlan::new(strip, 2, 0.3, &config).unwrap();
        let steps = 60;

        // when
        let offsets: Vec<f64> = (0..=steps)
            .map(|i| plan.offset_at(plan.duration() * i / steps))
            .collect();

        // then
        assert_eq!(offsets[0], 0.0);
        assert!((offsets[steps as usize] - plan.end_offset()).abs() < 1e-9);
        assert!(offsets.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(plan.stage_at(Duration::ZERO), SpinStage::Launch);
        assert_eq!(plan.stage_at(plan.duration() / 2), SpinStage::Cruise);
        assert_eq!(plan.stage_at(plan.duration() * 9 / 10), SpinStage::Landing);
        assert_eq!(plan.stage_at(plan.duration()), SpinStage::Done);
    }

    #[test]
    fn spin_plan__rejects_target_outside_catalog() {
        let config = config();
        let strip = Strip::build(&names(3), &config).unwrap();

        let err = SpinPlan::new(strip, 3, 0.0, &config).unwrap_err();

        assert_eq!(err, SpinError::TargetOutOfRange { target: 3, len: 3 });
    }

    #[test]
    fn roulette__walks_idle_spinning_settling_idle() {
        // given
        let config = config();
        let mut roulette = Roulette::new(config.clone());
        let prizes = catalog(&["A", "B", "C"]);
        let start = Instant::now();

        // when
        roulette.spin(&prizes, 2, 0.0, start).unwrap();
        let early = roulette.tick(start + config.spin_duration / 2);
        let landed = roulette.tick(start + config.spin_duration);
        let settling_early = roulette.tick(start + config.spin_duration);
        let settled =
            roulette.tick(start + config.spin_duration + config.settle_duration);

        // then
        assert_eq!(early, None);
        match landed {
            Some(SpinEvent::Landed { prize, .. }) => assert_eq!(prize.name, "C"),
            other => panic!("expected landing, got {other:?}"),
        }
        assert_eq!(settling_early, None);
        assert_eq!(settled, Some(SpinEvent::Settled));
        assert!(roulette.is_idle());
        assert!(roulette.frame(start).is_some());
    }

    #[test]
    fn spin__stores_plan_for_requested_target() {
        let mut roulette = Roulette::new(config());
        let prizes = catalog(&["A", "B", "C"]);

        roulette.spin(&prizes, 1, 0.0, Instant::now()).unwrap();

        match roulette.state() {
            RouletteState::Spinning { plan, .. } => {
                assert_eq!(plan.target(), 1);
                assert_eq!(plan.target_prize().name, "B");
            }
            other => panic!("expected spinning, got {other:?}"),
        }
    }

    #[test]
    fn roulette__rejects_reentry_while_spinning() {
        let mut roulette = Roulette::new(config());
        let prizes = catalog(&["A", "B"]);
        let now = Instant::now();
        roulette.spin(&prizes, 0, 0.0, now).unwrap();

        let err = roulette.spin(&prizes, 1, 0.0, now).unwrap_err();

        assert_eq!(err, SpinError::AlreadySpinning);
        assert_eq!(err.to_string(), "The roulette is already spinning");
    }

    #[test]
    fn roulette__cancel_returns_to_idle_without_events() {
        let config = config();
        let mut roulette = Roulette::new(config.clone());
        let now = Instant::now();
        roulette.spin(&catalog(&["A"]), 0, 0.0, now).unwrap();

        assert!(roulette.cancel());
        assert!(!roulette.cancel());
        assert_eq!(roulette.tick(now + config.spin_duration * 2), None);
        assert!(roulette.frame(now).is_none());
    }

    #[test]
    fn centered_offset__matches_landing_offset_without_jitter() {
        let config = RouletteConfig {
            landing_jitter: 0.0,
            ..config()
        };
        let strip = Strip::build(&names(5), &config).unwrap();
        let k = strip.landing_index(4, config.extra_rotations);

        assert_eq!(
            strip.centered_offset(k, config.container_width),
            landing_offset(&strip, 4, 0.0, &config)
        );
    }

    #[test]
    fn visible_cards__cover_the_container_at_landing() {
        // given
        let config = config();
        let strip = Strip::build(&names(7), &config).unwrap();
        let offset = landing_offset(&strip, 3, 0.0, &config);

        // when
        let cards = visible_cards(&strip, offset, config.container_width);

        // then
        let first = cards.first().unwrap();
        let last = cards.last().unwrap();
        assert!(first.left <= 0.0);
        assert!(last.left + config.card_width >= config.container_width);
        assert!(cards.iter().any(|c| c.prize.name == "P3"
            && c.left <= config.container_width / 2.0
            && c.left + config.card_width > config.container_width / 2.0));
    }

    proptest! {
        #[test]
        fn landing_offset__target_always_lands_under_pointer(
            n in 1usize..80,
            target_seed in 0usize..1000,
            jitter in -1.0f64..=1.0,
            card_width in 40.0f64..300.0,
            container_width in 300.0f64..2400.0,
            extra_rotations in 0usize..10,
        ) {
            let config = RouletteConfig {
                card_width,
                container_width,
                extra_rotations,
                ..RouletteConfig::default()
            };
            let target = target_seed % n;
            let strip = Strip::build(&names(n), &config).unwrap();
            let offset = landing_offset(&strip, target, jitter, &config);
            let index = strip.card_under_pointer(offset, container_width).unwrap();
            prop_assert_eq!(index % n, target);
            prop_assert!(strip.total_width() + 1e-6 >= config.min_screens * container_width);
        }
    }
}
