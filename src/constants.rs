//! Engine parameters and defaults.
//!
//! Everything here can be overridden at runtime through the config structs
//! (`MctsConfig`, `CoordinatorConfig`, `ScoreWeights`) or the command line.

// =============================================================================
// Board Geometry
// =============================================================================

/// Largest supported board. Each row is packed into a `u64` with two bits per cell.
pub const MAX_BOARD_SIZE: usize = 32;

/// Offsets to the six hex neighbours of a cell on the skewed grid.
/// Order: N, NE, E, S, SW, W. Bridge lookups depend on this order.
pub const NEIGHBOURS: [(i32, i32); 6] = [(0, -1), (1, -1), (1, 0), (0, 1), (-1, 1), (-1, 0)];

/// Offsets to the six bridge partners of a cell. Bridge `i` is carried by
/// neighbours `(i + 5) % 6` and `i`.
pub const BRIDGES: [(i32, i32); 6] = [(-1, -1), (1, -2), (2, -1), (1, 1), (-1, 2), (-2, 1)];

// =============================================================================
// MCTS Parameters
// =============================================================================

/// UCT exploration constant.
pub const EXPLORATION: f64 = std::f64::consts::SQRT_2;

/// Minimum visits before a leaf is expanded.
pub const EXPAND_VISITS: u32 = 10;

/// Visits a node needs before it is sampled instead of becoming a
/// continuation candidate.
pub const SAMPLE_THRESHOLD: u32 = 100;

/// Score of a won playout.
pub const WIN_SCORE: f64 = 1.0;

/// Iterations between progress log lines.
pub const REPORT_PERIOD: u64 = 10_000;

// =============================================================================
// Coordinator Defaults
// =============================================================================

/// Default number of worker threads.
pub const WORKERS: usize = 2;

/// Default wall-clock budget for one sub-search, in milliseconds.
pub const TIME_BUDGET_MS: u64 = 1_000;

/// Default pattern catalogue location, relative to the crate root.
pub const PATTERN_FILE: &str = "data/patterns.txt";

// =============================================================================
// Alpha-Beta Parameters
// =============================================================================

/// Value of a decided position for the side that has won.
pub const WON: f64 = f64::INFINITY;

/// Weight of the occupied rows/columns difference in the static score.
pub const OCCUPANCY_WEIGHT: f64 = 2.0;

/// Weight of the summed centre distances in the static score.
pub const CENTER_WEIGHT: f64 = 0.5;

/// Weight of the reachable empty cells in the static score.
pub const REACH_WEIGHT: f64 = 0.25;
