//! Pattern catalogue and the pattern-counting evaluator.
//!
//! ## Catalogue
//!
//! A catalogue is a plain text file of small cell templates. Each pattern
//! lists one or more variants (usually its rotations):
//!
//! ```text
//! ### bridge
//! ---
//! * .
//! . *
//! ```
//!
//! Cell codes are `.` empty, `*` own stone, `/` opponent stone and `?` any.
//! An `exclude` line marks the following variants of the same pattern as
//! not contributing to row/column occupancy.
//!
//! ## Matching
//!
//! Every variant line is compiled into a two-bit-per-cell mask and the exact
//! value the masked row must have when the pattern belongs to red or to blue.
//! Matching a line at offset `x0` is then a shift, an `and` and a compare
//! against the packed board rows.
//!
//! ## Evaluator
//!
//! [`PatternEvaluator`] owns a thread that answers count requests. Search
//! workers each own one and talk to it over channels.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use crate::board::{Board, Color};
use crate::constants::MAX_BOARD_SIZE;
use crate::error::HexError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CellCode {
    Empty,
    Own,
    Opponent,
    Any,
}

impl CellCode {
    fn parse(token: &str) -> Option<CellCode> {
        match token {
            "." => Some(CellCode::Empty),
            "*" => Some(CellCode::Own),
            "/" => Some(CellCode::Opponent),
            "?" => Some(CellCode::Any),
            _ => None,
        }
    }

    /// Two-bit value of this cell when the pattern belongs to `owner`.
    fn bits_for(self, owner: Color) -> u64 {
        match self {
            CellCode::Own => owner.bits(),
            CellCode::Opponent => owner.opponent().bits(),
            CellCode::Empty | CellCode::Any => 0,
        }
    }
}

/// One compiled line of a variant.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LineMatch {
    mask: u64,
    red: u64,
    blue: u64,
}

impl LineMatch {
    fn compile(cells: &[CellCode]) -> Self {
        let mut line = LineMatch { mask: 0, red: 0, blue: 0 };
        for (x, &cell) in cells.iter().enumerate() {
            if cell == CellCode::Any {
                continue;
            }
            line.mask |= 0b11 << (2 * x);
            line.red |= cell.bits_for(Color::Red) << (2 * x);
            line.blue |= cell.bits_for(Color::Blue) << (2 * x);
        }
        line
    }
}

/// A single orientation of a pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variant {
    width: usize,
    height: usize,
    lines: Vec<LineMatch>,
    excluded: bool,
}

impl Variant {
    fn empty(excluded: bool) -> Self {
        Self {
            width: 0,
            height: 0,
            lines: Vec::new(),
            excluded,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// The color whose pattern sits with its top-left corner at `(x0, y0)`.
    /// Red is tried first.
    fn match_at(&self, rows: &[u64], x0: usize, y0: usize) -> Option<Color> {
        let shift = 2 * x0;
        let fits = |value: fn(&LineMatch) -> u64| {
            self.lines
                .iter()
                .enumerate()
                .all(|(dy, line)| (rows[y0 + dy] >> shift) & line.mask == value(line))
        };
        if fits(|l| l.red) {
            Some(Color::Red)
        } else if fits(|l| l.blue) {
            Some(Color::Blue)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    pub name: String,
    pub variants: Vec<Variant>,
}

/// The loaded pattern catalogue. Shared read-only between evaluators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalogue {
    patterns: Vec<Pattern>,
}

impl Catalogue {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HexError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| HexError::CatalogueIo {
            path: path.to_path_buf(),
            source,
        })?;
        let catalogue = Self::parse(&text)?;
        debug!("loaded {} patterns from {}", catalogue.len(), path.display());
        Ok(catalogue)
    }

    pub fn parse(text: &str) -> Result<Self, HexError> {
        let mut patterns: Vec<Pattern> = Vec::new();
        let mut exclude = false;
        let syntax = |line: usize, reason: &str| HexError::CatalogueSyntax {
            line,
            reason: reason.to_string(),
        };

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();

            if let Some(name) = line.strip_prefix("###") {
                exclude = false;
                patterns.push(Pattern {
                    name: name.trim().to_string(),
                    variants: Vec::new(),
                });
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let pattern = patterns
                .last_mut()
                .ok_or_else(|| syntax(line_no, "content before the first ###"))?;

            match line {
                "---" => pattern.variants.push(Variant::empty(exclude)),
                "exclude" => {
                    exclude = true;
                    if let Some(open) = pattern.variants.last_mut() {
                        if open.lines.is_empty() {
                            open.excluded = true;
                        }
                    }
                }
                _ => {
                    let variant = pattern
                        .variants
                        .last_mut()
                        .ok_or_else(|| syntax(line_no, "cell line before the first ---"))?;
                    let cells = line
                        .split_whitespace()
                        .map(CellCode::parse)
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| syntax(line_no, "unknown cell code"))?;
                    if cells.len() > MAX_BOARD_SIZE {
                        return Err(syntax(line_no, "line is wider than the largest board"));
                    }
                    variant.width = variant.width.max(cells.len());
                    variant.height += 1;
                    variant.lines.push(LineMatch::compile(&cells));
                }
            }
        }

        for pattern in &patterns {
            if pattern.variants.iter().any(|v| v.lines.is_empty()) {
                return Err(HexError::CatalogueSyntax {
                    line: text.lines().count(),
                    reason: format!("pattern '{}' has a variant without cells", pattern.name),
                });
            }
        }

        Ok(Self { patterns })
    }

    /// Number of patterns (not variants).
    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}

/// Match counts per pattern for each color. Both vectors have
/// `patterns + 2` entries; the last two are occupied rows and occupied
/// columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatternCounts {
    pub red: Vec<u32>,
    pub blue: Vec<u32>,
}

impl PatternCounts {
    pub fn for_color(&self, color: Color) -> &[u32] {
        match color {
            Color::Red => &self.red,
            Color::Blue => &self.blue,
        }
    }

    /// Pattern counts without the occupancy tail.
    pub fn patterns(&self, color: Color) -> &[u32] {
        let counts = self.for_color(color);
        &counts[..counts.len().saturating_sub(2)]
    }

    pub fn occupied_rows(&self, color: Color) -> u32 {
        let counts = self.for_color(color);
        counts[counts.len() - 2]
    }

    pub fn occupied_cols(&self, color: Color) -> u32 {
        let counts = self.for_color(color);
        counts[counts.len() - 1]
    }
}

impl fmt::Display for PatternCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "red:  {:?}", self.red)?;
        write!(f, "blue: {:?}", self.blue)
    }
}

/// Count catalogue matches on a square grid of packed rows.
///
/// `subset` restricts matching to the listed pattern indices; entries for
/// other patterns stay zero.
pub fn count_patterns(catalogue: &Catalogue, rows: &[u64], subset: Option<&[usize]>) -> PatternCounts {
    let size = rows.len();
    let n = catalogue.len();
    let mut counts = PatternCounts {
        red: vec![0; n + 2],
        blue: vec![0; n + 2],
    };
    // [red, blue] x cells
    let mut occupied_rows = [vec![false; size], vec![false; size]];
    let mut occupied_cols = [vec![false; size], vec![false; size]];

    let all: Vec<usize>;
    let selected = match subset {
        Some(indices) => indices,
        None => {
            all = (0..n).collect();
            &all
        }
    };

    for &pi in selected {
        let Some(pattern) = catalogue.patterns.get(pi) else {
            continue;
        };
        for variant in &pattern.variants {
            if variant.width > size || variant.height > size {
                continue;
            }
            for y0 in 0..=size - variant.height {
                for x0 in 0..=size - variant.width {
                    let Some(color) = variant.match_at(rows, x0, y0) else {
                        continue;
                    };
                    let side = match color {
                        Color::Red => 0,
                        Color::Blue => 1,
                    };
                    match color {
                        Color::Red => counts.red[pi] += 1,
                        Color::Blue => counts.blue[pi] += 1,
                    }
                    if !variant.excluded {
                        occupied_rows[side][y0..y0 + variant.height].fill(true);
                        occupied_cols[side][x0..x0 + variant.width].fill(true);
                    }
                }
            }
        }
    }

    let tally = |cells: &[bool]| cells.iter().filter(|&&c| c).count() as u32;
    counts.red[n] = tally(&occupied_rows[0]);
    counts.red[n + 1] = tally(&occupied_cols[0]);
    counts.blue[n] = tally(&occupied_rows[1]);
    counts.blue[n + 1] = tally(&occupied_cols[1]);
    counts
}

enum Request {
    Count {
        rows: Vec<u64>,
        subset: Option<Vec<usize>>,
    },
    Stop,
}

/// A pattern-counting service running on its own thread.
///
/// Requests are answered strictly one at a time; `count` takes `&mut self`
/// so a single handle can never have two requests in flight.
pub struct PatternEvaluator {
    catalogue: Arc<Catalogue>,
    requests: Sender<Request>,
    results: Receiver<PatternCounts>,
    handle: Option<JoinHandle<()>>,
}

impl PatternEvaluator {
    pub fn spawn(catalogue: Arc<Catalogue>) -> Self {
        let (requests, request_rx) = bounded::<Request>(1);
        let (result_tx, results) = bounded::<PatternCounts>(1);
        let shared = Arc::clone(&catalogue);

        let handle = thread::spawn(move || {
            while let Ok(Request::Count { rows, subset }) = request_rx.recv() {
                let counts = count_patterns(&shared, &rows, subset.as_deref());
                if result_tx.send(counts).is_err() {
                    break;
                }
            }
        });

        Self {
            catalogue,
            requests,
            results,
            handle: Some(handle),
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Count catalogue matches on `board`.
    pub fn count(&mut self, board: &Board, subset: Option<&[usize]>) -> Result<PatternCounts, HexError> {
        if self.handle.is_none() {
            return Err(HexError::EvaluatorGone);
        }
        self.requests
            .send(Request::Count {
                rows: board.rows().to_vec(),
                subset: subset.map(<[usize]>::to_vec),
            })
            .map_err(|_| HexError::EvaluatorGone)?;
        self.results.recv().map_err(|_| HexError::EvaluatorGone)
    }

    /// Stop the evaluator thread and wait for it. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            // A dead thread has already dropped its receiver.
            let _ = self.requests.send(Request::Stop);
            let _ = handle.join();
        }
    }
}

impl Drop for PatternEvaluator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color::{Blue, Red};

    const PAIR: &str = "### pair\n---\n* *\n---\n*\n*\n";

    #[test]
    fn test_parse_variants_and_sizes() {
        let catalogue = Catalogue::parse(PAIR).unwrap();
        assert_eq!(catalogue.len(), 1);
        let variants = &catalogue.patterns()[0].variants;
        assert_eq!(variants.len(), 2);
        assert_eq!((variants[0].width(), variants[0].height()), (2, 1));
        assert_eq!((variants[1].width(), variants[1].height()), (1, 2));
    }

    #[test]
    fn test_compile_line_values() {
        let line = LineMatch::compile(&[CellCode::Own, CellCode::Any, CellCode::Opponent]);
        assert_eq!(line.mask, 0b11_00_11);
        assert_eq!(line.red, 0b10_00_01);
        assert_eq!(line.blue, 0b01_00_10);
    }

    #[test]
    fn test_exclude_applies_to_open_variant() {
        let text = "###\n---\nexclude\n* /\n---\n/ *\n###\n---\n*\n";
        let catalogue = Catalogue::parse(text).unwrap();
        assert!(catalogue.patterns()[0].variants.iter().all(Variant::is_excluded));
        assert!(!catalogue.patterns()[1].variants[0].is_excluded());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Catalogue::parse("---\n*\n"),
            Err(HexError::CatalogueSyntax { line: 1, .. })
        ));
        assert!(matches!(
            Catalogue::parse("###\n* *\n"),
            Err(HexError::CatalogueSyntax { line: 2, .. })
        ));
        assert!(matches!(
            Catalogue::parse("###\n---\n* x\n"),
            Err(HexError::CatalogueSyntax { line: 3, .. })
        ));
        assert!(matches!(
            Catalogue::parse("###\n---\n"),
            Err(HexError::CatalogueSyntax { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Catalogue::load("/nonexistent/patterns.txt"),
            Err(HexError::CatalogueIo { .. })
        ));
    }

    #[test]
    fn test_empty_cell_pattern_matches_every_cell_for_red() {
        let catalogue = Catalogue::parse("###\n---\n.\n---\n.\n").unwrap();
        let board = Board::new(6, Red);
        let counts = count_patterns(&catalogue, board.rows(), None);
        assert_eq!(counts.red, vec![72, 6, 6]);
        assert_eq!(counts.blue, vec![0, 0, 0]);
    }

    #[test]
    fn test_own_cell_pattern_on_red_board() {
        let catalogue = Catalogue::parse("###\n---\n*\n---\n*\n").unwrap();
        let stones: Vec<_> = (0..6).flat_map(|y| (0..6).map(move |x| (x, y, Red))).collect();
        let board = Board::setup(6, &stones, Red);
        let counts = count_patterns(&catalogue, board.rows(), None);
        assert_eq!(counts.patterns(Red), &[72]);
        assert_eq!(counts.patterns(Blue), &[0]);
    }

    #[test]
    fn test_subset_skips_other_patterns() {
        let text = "###\n---\n*\n###\n---\n* *\n";
        let catalogue = Catalogue::parse(text).unwrap();
        let board = Board::setup(4, &[(0, 0, Red), (1, 0, Red)], Red);
        let all = count_patterns(&catalogue, board.rows(), None);
        assert_eq!(all.patterns(Red), &[2, 1]);
        let only_pair = count_patterns(&catalogue, board.rows(), Some(&[1]));
        assert_eq!(only_pair.patterns(Red), &[0, 1]);
        assert_eq!(only_pair.occupied_rows(Red), 1);
        assert_eq!(only_pair.occupied_cols(Red), 2);
    }

    #[test]
    fn test_excluded_variant_leaves_occupancy() {
        let text = "###\nexclude\n---\n* /\n";
        let catalogue = Catalogue::parse(text).unwrap();
        let board = Board::setup(4, &[(1, 1, Red), (2, 1, Blue)], Red);
        let counts = count_patterns(&catalogue, board.rows(), None);
        assert_eq!(counts.red, vec![1, 0, 0]);
        assert_eq!(counts.blue, vec![0, 0, 0]);
    }

    #[test]
    fn test_evaluator_thread_answers_and_shuts_down() {
        let catalogue = Arc::new(Catalogue::parse(PAIR).unwrap());
        let mut evaluator = PatternEvaluator::spawn(Arc::clone(&catalogue));
        let board = Board::setup(5, &[(2, 2, Blue), (2, 3, Blue)], Blue);

        let counts = evaluator.count(&board, None).unwrap();
        assert_eq!(counts, count_patterns(&catalogue, board.rows(), None));
        assert_eq!(counts.patterns(Blue), &[1]);

        evaluator.shutdown();
        assert!(matches!(evaluator.count(&board, None), Err(HexError::EvaluatorGone)));
    }
}
