//! Sample features and the static position score.
//!
//! A [`FeatureVector`] is what the sampler records for every well-visited
//! MCTS node; [`ScoreWeights`] turns the same vector into the leaf value
//! used by alpha-beta.

use std::fmt;
use std::iter;

use crate::board::{Board, Color};
use crate::connectivity::reachable_empty_cells;
use crate::constants::{CENTER_WEIGHT, OCCUPANCY_WEIGHT, REACH_WEIGHT};
use crate::patterns::PatternCounts;

/// Features of one position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureVector {
    pub num_stones: u32,
    /// 0 if red moved last, 1 if blue did.
    pub last_player: u32,
    pub center_distance_red: u32,
    pub center_distance_blue: u32,
    pub reachable_red: u32,
    pub reachable_blue: u32,
    pub occupied_red_rows: u32,
    pub occupied_red_cols: u32,
    pub occupied_blue_rows: u32,
    pub occupied_blue_cols: u32,
    pub red_patterns: Vec<u32>,
    pub blue_patterns: Vec<u32>,
}

impl FeatureVector {
    pub fn extract(board: &Board, counts: &PatternCounts) -> Self {
        Self {
            num_stones: board.stone_counts().stones() as u32,
            last_player: match board.last_mover() {
                Color::Red => 0,
                Color::Blue => 1,
            },
            center_distance_red: center_distance(board, Color::Red),
            center_distance_blue: center_distance(board, Color::Blue),
            reachable_red: reachable_empty_cells(board, Color::Red) as u32,
            reachable_blue: reachable_empty_cells(board, Color::Blue) as u32,
            occupied_red_rows: counts.occupied_rows(Color::Red),
            occupied_red_cols: counts.occupied_cols(Color::Red),
            occupied_blue_rows: counts.occupied_rows(Color::Blue),
            occupied_blue_cols: counts.occupied_cols(Color::Blue),
            red_patterns: counts.patterns(Color::Red).to_vec(),
            blue_patterns: counts.patterns(Color::Blue).to_vec(),
        }
    }

    /// Column names for a catalogue of `patterns` patterns.
    pub fn header(patterns: usize) -> Vec<String> {
        let mut names: Vec<String> = [
            "num_stones",
            "lp",
            "sdtc_r",
            "sdtc_b",
            "rec_r",
            "rec_b",
            "occ_red_rows",
            "occ_red_cols",
            "occ_blue_rows",
            "occ_blue_cols",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        names.extend((0..patterns).map(|i| format!("red_p{i}")));
        names.extend((0..patterns).map(|i| format!("blue_p{i}")));
        names
    }

    /// Values in [`FeatureVector::header`] order.
    pub fn values(&self) -> Vec<u32> {
        let mut values = vec![
            self.num_stones,
            self.last_player,
            self.center_distance_red,
            self.center_distance_blue,
            self.reachable_red,
            self.reachable_blue,
            self.occupied_red_rows,
            self.occupied_red_cols,
            self.occupied_blue_rows,
            self.occupied_blue_cols,
        ];
        values.extend_from_slice(&self.red_patterns);
        values.extend_from_slice(&self.blue_patterns);
        values
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values().iter().map(u32::to_string).collect();
        write!(f, "{}", values.join(","))
    }
}

/// A sampled MCTS node: its statistics and features. `q` is from red's
/// point of view.
#[derive(Clone, Debug)]
pub struct Sample {
    pub board: Board,
    pub n: u32,
    pub q: f64,
    pub features: FeatureVector,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{}", self.q, self.features)
    }
}

/// Hex distance between two cells on the skewed grid.
#[inline]
pub fn hex_distance((x1, y1): (i32, i32), (x2, y2): (i32, i32)) -> u32 {
    (((x1 - x2).abs() + (x1 + y1 - x2 - y2).abs() + (y1 - y2).abs()) / 2) as u32
}

/// The centre cell nearest to `(x, y)`. Even boards have four centre cells.
fn closest_center(size: usize, x: usize, y: usize) -> (i32, i32) {
    if size % 2 == 1 {
        let c = (size / 2) as i32;
        return (c, c);
    }
    let (small, big) = (size / 2 - 1, size / 2);
    let pick = |v: usize| (if v <= small { small } else { big }) as i32;
    (pick(x), pick(y))
}

fn center_distance(board: &Board, color: Color) -> u32 {
    let size = board.size();
    let mut sum = 0;
    for y in 0..size {
        for x in 0..size {
            if board.color_at(x, y) == Some(color) {
                sum += hex_distance((x as i32, y as i32), closest_center(size, x, y));
            }
        }
    }
    sum
}

/// Linear static score over [`FeatureVector::values`], one weight per
/// [`FeatureVector::header`] column. Missing weights count as `0.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreWeights {
    pub intercept: f64,
    pub features: Vec<f64>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::for_patterns(0)
    }
}

impl ScoreWeights {
    /// Hand-tuned weights for a catalogue of `patterns` patterns: centre
    /// distance and reachable cells for both sides, red's occupied rows
    /// against blue's occupied columns, and each pattern count at `±1`.
    pub fn for_patterns(patterns: usize) -> Self {
        let mut features = vec![
            0.0,
            0.0,
            -CENTER_WEIGHT,
            CENTER_WEIGHT,
            REACH_WEIGHT,
            -REACH_WEIGHT,
            OCCUPANCY_WEIGHT,
            0.0,
            0.0,
            -OCCUPANCY_WEIGHT,
        ];
        features.extend(iter::repeat_n(1.0, patterns));
        features.extend(iter::repeat_n(-1.0, patterns));
        Self {
            intercept: 0.0,
            features,
        }
    }

    /// Static value of a position for the side to move: red's view is
    /// `intercept + Σ wᵢ·xᵢ`, blue gets the negation.
    pub fn score(&self, features: &FeatureVector, to_move: Color) -> f64 {
        let value = self.intercept
            + features
                .values()
                .iter()
                .zip(&self.features)
                .map(|(&x, &w)| w * x as f64)
                .sum::<f64>();
        match to_move {
            Color::Red => value,
            Color::Blue => -value,
        }
    }
}
