//! Iterative-deepening negamax with alpha-beta pruning.
//!
//! Each round searches to a fixed depth with a fresh transposition table;
//! the previous round's table orders moves best-first. Rounds deepen by two
//! plies until every empty cell is covered, the game is decided or the
//! deadline expires. An interrupted round is thrown away and the result of
//! the deepest completed one is returned.
//!
//! Values are from the point of view of the side to move. A lost position
//! is worth `-WON` (negative infinity), a depth-limit leaf is scored by
//! [`ScoreWeights`] on its [`FeatureVector`], built from the evaluator's
//! pattern counts.
//!
//! A position always sits at the same depth of a round (its stone count
//! minus the root's), so table entries never need a depth.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::board::{Board, BoardKey, Move};
use crate::connectivity::{is_decided, Mode};
use crate::constants::WON;
use crate::error::HexError;
use crate::features::{FeatureVector, ScoreWeights};
use crate::patterns::PatternEvaluator;
use crate::tree::TreeNode;

/// When a search has to give up: a point in time, a shared cancel flag, or
/// both.
#[derive(Clone, Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Deadline {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
            || self.cancel.as_ref().is_some_and(|c| c.load(AtomicOrdering::Relaxed))
    }

    #[inline]
    fn check(&self) -> Result<(), HexError> {
        if self.expired() {
            Err(HexError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How a stored value relates to the true value of the position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    /// The true value is at least the stored one.
    Lower,
    /// The true value is at most the stored one.
    Upper,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TableEntry {
    pub value: f64,
    pub bound: Bound,
}

#[derive(Clone, Debug, Default)]
pub struct TranspositionTable {
    entries: HashMap<BoardKey, TableEntry>,
}

impl TranspositionTable {
    pub fn get(&self, key: &BoardKey) -> Option<TableEntry> {
        self.entries.get(key).copied()
    }

    fn store(&mut self, key: BoardKey, value: f64, bound: Bound) {
        self.entries.insert(key, TableEntry { value, bound });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a node of the diagnostic tree stopped where it did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AbTag {
    /// Answered from the transposition table.
    Table,
    /// The game is decided.
    Decided,
    /// Depth limit reached; statically evaluated.
    DepthLimit,
    /// Remaining children were cut off.
    Pruned,
    /// Fully searched.
    Searched,
}

impl fmt::Display for AbTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            AbTag::Table => "TT",
            AbTag::Decided => "G",
            AbTag::DepthLimit => "D",
            AbTag::Pruned => "P",
            AbTag::Searched => "",
        };
        write!(f, "{tag}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AbNodeValue {
    pub last_move: Option<Move>,
    pub value: f64,
    pub tag: AbTag,
}

impl fmt::Display for AbNodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_move {
            Some(mv) => write!(f, "{mv} ({:.3}) {}", self.value, self.tag),
            None => write!(f, "root ({:.3}) {}", self.value, self.tag),
        }
    }
}

/// Result of one fixed-depth round.
#[derive(Debug)]
pub struct Round {
    pub value: f64,
    pub best_move: Option<Move>,
    pub nodes: u64,
    pub table: TranspositionTable,
    pub tree: Option<TreeNode<AbNodeValue>>,
}

/// Result of a full iterative-deepening search.
#[derive(Debug, Default)]
pub struct AbOutcome {
    /// Best move of the deepest completed round.
    pub best_move: Option<Move>,
    pub value: f64,
    /// Depth of the deepest completed round, 0 if none completed.
    pub depth: usize,
    pub nodes: u64,
    pub tree: Option<TreeNode<AbNodeValue>>,
}

pub struct AlphaBeta<'a> {
    evaluator: &'a mut PatternEvaluator,
    weights: ScoreWeights,
}

impl<'a> AlphaBeta<'a> {
    pub fn new(evaluator: &'a mut PatternEvaluator, weights: ScoreWeights) -> Self {
        Self { evaluator, weights }
    }

    /// Search `board` until `deadline`, deepening two plies per round.
    pub fn search(&mut self, board: &Board, deadline: &Deadline, want_tree: bool) -> Result<AbOutcome, HexError> {
        let empty = board.stone_counts().empty;
        let mut outcome = AbOutcome::default();
        let mut previous: Option<TranspositionTable> = None;
        let mut limit = 2;

        loop {
            let depth = limit.min(empty);
            let round = match self.round(board, depth, previous.as_ref(), deadline, want_tree) {
                Ok(round) => round,
                Err(HexError::Cancelled) => {
                    warn!("depth {depth} round cancelled, keeping depth {}", outcome.depth);
                    break;
                }
                Err(e) => return Err(e),
            };
            outcome.nodes += round.nodes;
            debug!(
                "depth {depth}: value {:.3}, move {:?}, {} nodes, {} table entries",
                round.value,
                round.best_move,
                round.nodes,
                round.table.len()
            );

            // A deeper round cannot find a move a shallower one did not.
            let Some(best) = round.best_move else {
                break;
            };
            outcome.best_move = Some(best);
            outcome.value = round.value;
            outcome.depth = depth;
            outcome.tree = round.tree;
            previous = Some(round.table);

            if round.value.is_infinite() || depth >= empty {
                break;
            }
            limit += 2;
        }
        Ok(outcome)
    }

    /// A single round to `depth`, ordered by `previous` when given.
    pub fn search_depth(
        &mut self,
        board: &Board,
        depth: usize,
        previous: Option<&TranspositionTable>,
    ) -> Result<Round, HexError> {
        self.round(board, depth, previous, &Deadline::never(), false)
    }

    fn round(
        &mut self,
        board: &Board,
        limit: usize,
        previous: Option<&TranspositionTable>,
        deadline: &Deadline,
        want_tree: bool,
    ) -> Result<Round, HexError> {
        let mut search = RoundSearch {
            evaluator: &mut *self.evaluator,
            weights: &self.weights,
            limit,
            table: TranspositionTable::default(),
            previous,
            deadline,
            want_tree,
            nodes: 0,
        };
        let scored = search.negamax(board, 0, -WON, WON)?;
        Ok(Round {
            value: scored.value,
            best_move: scored.best_move,
            nodes: search.nodes,
            table: search.table,
            tree: scored.node,
        })
    }
}

struct Scored {
    value: f64,
    best_move: Option<Move>,
    node: Option<TreeNode<AbNodeValue>>,
}

struct RoundSearch<'r> {
    evaluator: &'r mut PatternEvaluator,
    weights: &'r ScoreWeights,
    limit: usize,
    table: TranspositionTable,
    previous: Option<&'r TranspositionTable>,
    deadline: &'r Deadline,
    want_tree: bool,
    nodes: u64,
}

impl RoundSearch<'_> {
    fn leaf(&self, board: &Board, value: f64, tag: AbTag) -> Scored {
        Scored {
            value,
            best_move: None,
            node: self.want_tree.then(|| {
                TreeNode::new(AbNodeValue {
                    last_move: board.last_move(),
                    value,
                    tag,
                })
            }),
        }
    }

    fn negamax(&mut self, board: &Board, depth: usize, mut alpha: f64, mut beta: f64) -> Result<Scored, HexError> {
        self.deadline.check()?;
        self.nodes += 1;

        let key = board.canonical_key();
        if let Some(entry) = self.table.get(&key) {
            match entry.bound {
                Bound::Exact => return Ok(self.leaf(board, entry.value, AbTag::Table)),
                Bound::Lower => alpha = alpha.max(entry.value),
                Bound::Upper => beta = beta.min(entry.value),
            }
            if alpha >= beta {
                return Ok(self.leaf(board, entry.value, AbTag::Table));
            }
        }

        if is_decided(board, Mode::Strict) {
            // The side to move has lost.
            self.table.store(key, -WON, Bound::Exact);
            return Ok(self.leaf(board, -WON, AbTag::Decided));
        }

        if depth >= self.limit {
            let counts = self.evaluator.count(board, None)?;
            let features = FeatureVector::extract(board, &counts);
            let value = self.weights.score(&features, board.to_move());
            self.table.store(key, value, Bound::Exact);
            return Ok(self.leaf(board, value, AbTag::DepthLimit));
        }

        let alpha_orig = alpha;
        let mut best_value = -WON;
        let mut best_move = None;
        let mut tag = AbTag::Searched;
        let mut children = Vec::new();

        for mv in self.ordered_moves(board) {
            self.deadline.check()?;

            let child = self.negamax(&board.play(mv), depth + 1, -beta, -alpha)?;
            let value = -child.value;
            if best_move.is_none() || value > best_value {
                best_value = value;
                best_move = Some(mv);
            }
            if let Some(node) = child.node {
                children.push(node);
            }
            if best_value > alpha {
                alpha = best_value;
                if alpha >= beta {
                    tag = AbTag::Pruned;
                    break;
                }
            }
        }

        let bound = if best_value <= alpha_orig {
            Bound::Upper
        } else if best_value >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.table.store(key, best_value, bound);

        Ok(Scored {
            value: best_value,
            best_move,
            node: self.want_tree.then(|| {
                TreeNode::with_children(
                    AbNodeValue {
                        last_move: board.last_move(),
                        value: best_value,
                        tag,
                    },
                    children,
                )
            }),
        })
    }

    /// Legal moves, best first by the previous round's value of the
    /// successor (lowest for the opponent). Unknown successors count as 0.
    fn ordered_moves(&self, board: &Board) -> Vec<Move> {
        let moves = board.legal_moves();
        let Some(previous) = self.previous else {
            return moves;
        };
        let mut keyed: Vec<(f64, Move)> = moves
            .into_iter()
            .map(|mv| {
                let value = previous
                    .get(&board.play(mv).canonical_key())
                    .map_or(0.0, |e| e.value);
                (value, mv)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        keyed.into_iter().map(|(_, mv)| mv).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color::{self, Blue, Red};
    use crate::patterns::Catalogue;

    fn evaluator() -> PatternEvaluator {
        let catalogue = Catalogue::parse("###\n---\n*\n###\n---\n* *\n---\n*\n*\n").unwrap();
        PatternEvaluator::spawn(Arc::new(catalogue))
    }

    /// Plain negamax over the whole game tree.
    fn brute_force(board: &Board) -> f64 {
        if is_decided(board, Mode::Strict) {
            return -WON;
        }
        board
            .legal_moves()
            .into_iter()
            .map(|mv| -brute_force(&board.play(mv)))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// [`brute_force`] with a table keyed by position.
    fn memo_brute_force(board: &Board, memo: &mut HashMap<BoardKey, f64>) -> f64 {
        let key = board.canonical_key();
        if let Some(&value) = memo.get(&key) {
            return value;
        }
        let value = if is_decided(board, Mode::Strict) {
            -WON
        } else {
            board
                .legal_moves()
                .into_iter()
                .map(|mv| -memo_brute_force(&board.play(mv), memo))
                .fold(f64::NEG_INFINITY, f64::max)
        };
        memo.insert(key, value);
        value
    }

    fn small_positions() -> Vec<Board> {
        vec![
            Board::setup(3, &[(1, 1, Red), (0, 2, Blue)], Blue),
            Board::setup(3, &[(0, 0, Red), (2, 2, Blue)], Blue),
            Board::setup(3, &[(1, 0, Red), (1, 1, Blue)], Blue),
            Board::setup(3, &[(2, 0, Blue), (0, 1, Red)], Red),
        ]
    }

    #[test]
    fn test_full_depth_matches_brute_force() {
        let mut evaluator = evaluator();
        let mut ab = AlphaBeta::new(&mut evaluator, ScoreWeights::default());
        for board in small_positions() {
            let round = ab.search_depth(&board, 7, None).unwrap();
            assert_eq!(round.value, brute_force(&board), "position\n{board}");
            let best = round.best_move.unwrap();
            assert_eq!(-brute_force(&board.play(best)), round.value, "move {best}\n{board}");
        }
    }

    #[test]
    fn test_full_depth_on_four_by_four() {
        let board = Board::setup(
            4,
            &[
                (0, 0, Red),
                (1, 1, Red),
                (2, 2, Red),
                (3, 3, Red),
                (1, 0, Blue),
                (3, 1, Blue),
                (0, 2, Blue),
                (2, 3, Blue),
            ],
            Blue,
        );
        assert_eq!(board.stone_counts().empty, 8);

        let mut evaluator = evaluator();
        let mut ab = AlphaBeta::new(&mut evaluator, ScoreWeights::default());
        let round = ab.search_depth(&board, 8, None).unwrap();

        let mut memo = HashMap::new();
        let expected = memo_brute_force(&board, &mut memo);
        assert_eq!(round.value, expected);
        let best = round.best_move.unwrap();
        assert_eq!(-memo_brute_force(&board.play(best), &mut memo), expected);
    }

    #[test]
    fn test_value_independent_of_move_order() {
        let mut evaluator = evaluator();
        let mut ab = AlphaBeta::new(&mut evaluator, ScoreWeights::default());

        for board in small_positions() {
            let shallow = ab.search_depth(&board, 2, None).unwrap();
            let plain = ab.search_depth(&board, 7, None).unwrap();
            let ordered = ab.search_depth(&board, 7, Some(&shallow.table)).unwrap();
            assert_eq!(plain.value, ordered.value);
        }

        let board = Board::setup(4, &[(1, 1, Red), (2, 2, Blue)], Blue);
        let shallow = ab.search_depth(&board, 2, None).unwrap();
        let plain = ab.search_depth(&board, 3, None).unwrap();
        let ordered = ab.search_depth(&board, 3, Some(&shallow.table)).unwrap();
        assert_eq!(plain.value, ordered.value);
    }

    #[test]
    fn test_takes_immediate_win() {
        let board = Board::setup(3, &[(0, 0, Red), (0, 1, Red), (1, 1, Blue), (2, 1, Blue)], Blue);
        let mut evaluator = evaluator();
        let mut ab = AlphaBeta::new(&mut evaluator, ScoreWeights::default());
        let outcome = ab.search(&board, &Deadline::never(), true).unwrap();
        assert_eq!(outcome.best_move, Some(Move::new(0, 2, Red)));
        assert_eq!(outcome.value, WON);
        assert_eq!(outcome.depth, 2);

        let tree = outcome.tree.unwrap();
        let mut decided = 0;
        tree.walk(&mut |node, _| {
            if node.value.tag == AbTag::Decided {
                decided += 1;
            }
        });
        assert!(decided > 0);
    }

    #[test]
    fn test_expired_deadline_gives_no_move() {
        let board = Board::new(4, Color::Red);
        let mut evaluator = evaluator();
        let mut ab = AlphaBeta::new(&mut evaluator, ScoreWeights::default());

        let outcome = ab.search(&board, &Deadline::after(Duration::ZERO), false).unwrap();
        assert_eq!(outcome.best_move, None);
        assert_eq!(outcome.depth, 0);

        let flag = Arc::new(AtomicBool::new(true));
        let outcome = ab
            .search(&board, &Deadline::never().with_cancel(flag), false)
            .unwrap();
        assert_eq!(outcome.best_move, None);
    }

    #[test]
    fn test_depth_limited_search_returns_a_move() {
        let board = Board::new(4, Color::Red);
        let mut evaluator = evaluator();
        let mut ab = AlphaBeta::new(&mut evaluator, ScoreWeights::for_patterns(2));
        let round = ab.search_depth(&board, 2, None).unwrap();
        assert!(round.best_move.is_some());
        assert!(round.value.is_finite());
        assert!(round.table.len() > 16);
    }

    #[test]
    fn test_tag_strings() {
        assert_eq!(AbTag::Table.to_string(), "TT");
        assert_eq!(AbTag::Decided.to_string(), "G");
        assert_eq!(AbTag::DepthLimit.to_string(), "D");
        assert_eq!(AbTag::Pruned.to_string(), "P");
        assert_eq!(AbTag::Searched.to_string(), "");
    }
}
