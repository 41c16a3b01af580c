//! Telemetry jitter simulation for live-tracked markers.
//!
//! The simulator owns an id → position map ([`MarkerBoard`]) that a view
//! layer reads. On every tick it asks a [`MarkerSource`] which markers are
//! currently visible, nudges each one by a bounded random offset and clamps
//! the result. Markers seen for the first time are seeded at a random
//! position before their first nudge.
//!
//! Positions are percentages of the viewport on both axes.

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Identifier of a tracked marker.
pub type MarkerId = String;

/// A position in viewport percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Clamp both axes to `[min, max]`.
    #[must_use]
    pub fn clamped(self, min: f64, max: f64) -> Self {
        Self {
            x: self.x.clamp(min, max),
            y: self.y.clamp(min, max),
        }
    }
}

/// Jitter simulator configuration.
#[derive(Debug, Clone)]
pub struct JitterConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Maximum offset per axis per tick, in percentage points.
    pub max_offset: f64,
    /// Lower clamp bound on both axes.
    pub clamp_min: f64,
    /// Upper clamp bound on both axes.
    pub clamp_max: f64,
    /// Lower bound for seeded positions.
    pub seed_min: f64,
    /// Upper bound for seeded positions.
    pub seed_max: f64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_offset: 2.0,
            clamp_min: 5.0,
            clamp_max: 85.0,
            seed_min: 10.0,
            seed_max: 70.0,
        }
    }
}

/// Source of the markers currently present in the view.
///
/// Queried once per tick; an empty result makes the tick a no-op.
pub trait MarkerSource: Send + Sync {
    /// Ids of the markers currently visible.
    fn visible_markers(&self) -> Vec<MarkerId>;
}

impl<F> MarkerSource for F
where
    F: Fn() -> Vec<MarkerId> + Send + Sync,
{
    fn visible_markers(&self) -> Vec<MarkerId> {
        self()
    }
}

/// A fixed set of markers, for headless deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticMarkers(pub Vec<MarkerId>);

impl MarkerSource for StaticMarkers {
    fn visible_markers(&self) -> Vec<MarkerId> {
        self.0.clone()
    }
}

/// Positions of tracked markers, readable by the view layer.
#[derive(Debug, Default)]
pub struct MarkerBoard {
    positions: DashMap<MarkerId, Position>,
}

impl MarkerBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the position of a marker.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Position> {
        self.positions.get(id).map(|p| *p)
    }

    /// Record a marker's position.
    pub fn set(&self, id: impl Into<MarkerId>, position: Position) {
        self.positions.insert(id.into(), position);
    }

    /// Drop every marker not listed in `visible`.
    ///
    /// Returns the number of markers removed.
    pub fn retain_visible(&self, visible: &[MarkerId]) -> usize {
        let before = self.positions.len();
        self.positions.retain(|id, _| visible.contains(id));
        before.saturating_sub(self.positions.len())
    }

    /// Snapshot of all positions, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<MarkerId, Position> {
        self.positions
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Number of markers with a recorded position.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if no marker has a recorded position.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Applies periodic jitter to marker positions.
pub struct JitterSimulator {
    config: JitterConfig,
    board: Arc<MarkerBoard>,
    rng: ChaCha8Rng,
    ticks: u64,
}

impl JitterSimulator {
    /// Create a simulator seeded from entropy.
    #[must_use]
    pub fn new(config: JitterConfig, board: Arc<MarkerBoard>) -> Self {
        Self::with_seed(config, board, rand::random())
    }

    /// Create a simulator with a deterministic seed.
    #[must_use]
    pub fn with_seed(config: JitterConfig, board: Arc<MarkerBoard>, seed: u64) -> Self {
        Self {
            config,
            board,
            rng: ChaCha8Rng::seed_from_u64(seed),
            ticks: 0,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// Get the board this simulator writes to.
    #[must_use]
    pub fn board(&self) -> &Arc<MarkerBoard> {
        &self.board
    }

    /// Number of ticks applied so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Apply one tick to the given markers.
    ///
    /// Markers missing from `visible` are forgotten and get a fresh seed if
    /// they show up again. Returns the number of markers updated.
    pub fn tick(&mut self, visible: &[MarkerId]) -> usize {
        self.ticks += 1;

        let pruned = self.board.retain_visible(visible);
        if pruned > 0 {
            debug!(pruned, "Forgot markers no longer visible");
        }

        for id in visible {
            let current = match self.board.get(id) {
                Some(position) => position,
                None => {
                    let seeded = self.seed_position();
                    debug!(marker = %id, x = seeded.x, y = seeded.y, "Seeded marker position");
                    seeded
                }
            };

            let next = self.jitter(current);
            trace!(marker = %id, x = next.x, y = next.y, "Marker jittered");
            self.board.set(id.clone(), next);
        }

        visible.len()
    }

    fn seed_position(&mut self) -> Position {
        let (lo, hi) = (self.config.seed_min, self.config.seed_max);
        Position::new(self.rng.random_range(lo..=hi), self.rng.random_range(lo..=hi))
    }

    fn jitter(&mut self, position: Position) -> Position {
        let max = self.config.max_offset;
        let moved = if max > 0.0 {
            Position::new(
                position.x + self.rng.random_range(-max..=max),
                position.y + self.rng.random_range(-max..=max),
            )
        } else {
            position
        };
        moved.clamped(self.config.clamp_min, self.config.clamp_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<MarkerId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn simulator(seed: u64) -> JitterSimulator {
        JitterSimulator::with_seed(JitterConfig::default(), Arc::new(MarkerBoard::new()), seed)
    }

    #[test]
    fn test_position_clamped() {
        let p = Position::new(-3.0, 120.0).clamped(5.0, 85.0);
        assert_eq!(p, Position::new(5.0, 85.0));
    }

    #[test]
    fn test_new_marker_is_seeded_then_jittered() {
        let mut sim = simulator(7);
        sim.tick(&ids(&["truck-1"]));

        let p = sim.board().get("truck-1").unwrap();
        // Seed range widened by one jitter step.
        assert!((8.0..=72.0).contains(&p.x), "x = {}", p.x);
        assert!((8.0..=72.0).contains(&p.y), "y = {}", p.y);
    }

    #[test]
    fn test_five_ticks_from_center() {
        for seed in 0..50 {
            let mut sim = simulator(seed);
            sim.board().set("van-2", Position::new(50.0, 50.0));

            for _ in 0..5 {
                sim.tick(&ids(&["van-2"]));
            }

            let p = sim.board().get("van-2").unwrap();
            assert!((40.0..=60.0).contains(&p.x), "seed {} x = {}", seed, p.x);
            assert!((40.0..=60.0).contains(&p.y), "seed {} y = {}", seed, p.y);
        }
    }

    #[test]
    fn test_positions_stay_within_clamp_bounds() {
        let mut sim = simulator(42);
        sim.board().set("edge-low", Position::new(5.0, 5.0));
        sim.board().set("edge-high", Position::new(85.0, 85.0));
        let markers = ids(&["edge-low", "edge-high", "fresh"]);

        for _ in 0..1_000 {
            sim.tick(&markers);
            for (_, p) in sim.board().snapshot() {
                assert!((5.0..=85.0).contains(&p.x));
                assert!((5.0..=85.0).contains(&p.y));
            }
        }
        assert_eq!(sim.ticks(), 1_000);
    }

    #[test]
    fn test_out_of_range_position_is_clamped_on_next_tick() {
        let mut sim = simulator(3);
        sim.board().set("drifted", Position::new(99.0, 0.0));
        sim.tick(&ids(&["drifted"]));

        let p = sim.board().get("drifted").unwrap();
        assert!(p.x <= 85.0);
        assert!(p.y >= 5.0);
    }

    #[test]
    fn test_absent_marker_is_pruned_and_reseeded() {
        let mut sim = simulator(1);
        sim.board().set("parked", Position::new(84.0, 84.0));

        sim.tick(&ids(&["other"]));
        assert_eq!(sim.board().get("parked"), None);
        assert!(sim.board().get("other").is_some());

        // Back in view: seeded again instead of resuming near the old spot
        sim.tick(&ids(&["parked"]));
        let p = sim.board().get("parked").unwrap();
        assert!((8.0..=72.0).contains(&p.x), "x = {}", p.x);
        assert!((8.0..=72.0).contains(&p.y), "y = {}", p.y);
        assert_eq!(sim.board().len(), 1);

        assert_eq!(sim.tick(&[]), 0);
        assert!(sim.board().is_empty());
    }

    #[test]
    fn test_board_does_not_grow_with_churn() {
        let mut sim = simulator(5);
        for i in 0..1_000 {
            sim.tick(&[format!("m{}", i)]);
        }
        assert_eq!(sim.board().len(), 1);
        assert!(sim.board().get("m999").is_some());
    }

    #[test]
    fn test_zero_offset_only_clamps() {
        let config = JitterConfig {
            max_offset: 0.0,
            ..Default::default()
        };
        let mut sim = JitterSimulator::with_seed(config, Arc::new(MarkerBoard::new()), 9);
        sim.board().set("still", Position::new(50.0, 90.0));
        sim.tick(&ids(&["still"]));

        assert_eq!(sim.board().get("still"), Some(Position::new(50.0, 85.0)));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let mut a = simulator(11);
        let mut b = simulator(11);
        let markers = ids(&["a", "b"]);

        for _ in 0..10 {
            a.tick(&markers);
            b.tick(&markers);
        }
        assert_eq!(a.board().snapshot(), b.board().snapshot());
    }

    #[test]
    fn test_closure_marker_source() {
        let source = || ids(&["crew-1", "crew-2"]);
        assert_eq!(source.visible_markers().len(), 2);
        assert_eq!(StaticMarkers(ids(&["x"])).visible_markers(), ids(&["x"]));
    }
}
