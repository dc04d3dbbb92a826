//! Monte Carlo Tree Search (UCT).
//!
//! Each iteration runs four phases:
//! - selection: descend through the child with the highest UCT value,
//!   unvisited children first
//! - expansion: a leaf visited often enough gets one child per legal move
//! - playout: random moves until the connectivity oracle reports a winner
//! - backpropagation: update every node on the path, negating the score at
//!   each level
//!
//! Values are stored from the point of view of the player who made the move
//! leading to the node, so a parent picks the child with the highest `q`.
//!
//! Under-explored parts of a finished tree can be harvested as continuation
//! candidates and searched further with [`Mcts::from_node`].

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::board::{Board, Color, Move};
use crate::connectivity::{is_decided, Mode};
use crate::constants::{EXPAND_VISITS, EXPLORATION, REPORT_PERIOD, WIN_SCORE};
use crate::error::HexError;
use crate::features::{FeatureVector, Sample};
use crate::patterns::PatternEvaluator;
use crate::tree::TreeNode;

#[derive(Clone, Debug, PartialEq)]
pub struct MctsConfig {
    /// UCT exploration constant.
    pub exploration: f64,
    /// Visits a leaf needs before it is expanded.
    pub expand_threshold: u32,
    /// Score wins by how early they happen instead of a flat 1.
    pub length_weighted: bool,
    /// Terminal test used by expansion and playouts.
    pub terminal: Mode,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            exploration: EXPLORATION,
            expand_threshold: EXPAND_VISITS,
            length_weighted: false,
            terminal: Mode::Strict,
        }
    }
}

/// Statistics of one tree node.
#[derive(Clone, Debug)]
pub struct MctsNodeValue {
    pub board: Board,
    /// Visit count.
    pub n: u32,
    /// Mean score for the player who moved into this position.
    pub q: f64,
}

impl MctsNodeValue {
    pub fn new(board: Board) -> Self {
        Self { board, n: 0, q: 0.0 }
    }

    #[inline]
    fn update(&mut self, score: f64) {
        self.n += 1;
        self.q += (score - self.q) / self.n as f64;
    }

    /// `q` seen from red's side.
    pub fn red_q(&self) -> f64 {
        match self.board.last_mover() {
            Color::Red => self.q,
            Color::Blue => -self.q,
        }
    }
}

impl fmt::Display for MctsNodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(N: {}, Q: {:.6})", self.board, self.n, self.q)
    }
}

pub type MctsNode = TreeNode<MctsNodeValue>;

/// Samples and continuation candidates collected from a finished tree.
#[derive(Clone, Debug, Default)]
pub struct Harvest {
    pub samples: Vec<Sample>,
    pub candidates: Vec<MctsNode>,
}

pub struct Mcts {
    root: MctsNode,
    config: MctsConfig,
    rng: fastrand::Rng,
    iterations: u64,
}

impl Mcts {
    pub fn new(board: Board, config: MctsConfig) -> Self {
        Self::from_node(TreeNode::new(MctsNodeValue::new(board)), config)
    }

    /// Continue searching an existing (sub)tree.
    pub fn from_node(root: MctsNode, config: MctsConfig) -> Self {
        Self {
            root,
            config,
            rng: fastrand::Rng::new(),
            iterations: 0,
        }
    }

    /// Fix the random source, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    #[inline]
    pub fn root(&self) -> &MctsNode {
        &self.root
    }

    pub fn into_root(self) -> MctsNode {
        self.root
    }

    #[inline]
    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    /// Iterations run by this instance.
    #[inline]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn run_iteration(&mut self) {
        select_expand_playout(&mut self.root, &self.config, &mut self.rng);
        self.iterations += 1;
    }

    /// Iterate until `budget` has elapsed. Returns the iterations run.
    pub fn run_for(&mut self, budget: Duration) -> u64 {
        let deadline = Instant::now() + budget;
        let start = self.iterations;
        while Instant::now() < deadline {
            self.run_iteration();
            let done = self.iterations - start;
            if done % REPORT_PERIOD == 0 {
                trace!("finished iteration {done}");
            }
        }
        self.iterations - start
    }

    /// Reuse the subtree of the root grandchild showing `board`, or start a
    /// fresh search there.
    pub fn continue_from(self, board: &Board) -> Mcts {
        let Mcts { root, config, rng, .. } = self;
        let found = root
            .children
            .into_iter()
            .flat_map(|child| child.children)
            .find(|grandchild| grandchild.value.board.same_position(board));

        let node = match found {
            Some(node) => {
                debug!("continuing from a subtree with {} visits", node.value.n);
                node
            }
            None => {
                debug!("position not in the tree, starting a new search");
                TreeNode::new(MctsNodeValue::new(board.clone()))
            }
        };
        Mcts {
            root: node,
            config,
            rng,
            iterations: 0,
        }
    }

    fn best_child(&self) -> Option<&MctsNode> {
        let mut best: Option<&MctsNode> = None;
        for child in &self.root.children {
            if best.is_none_or(|b| child.value.q > b.value.q) {
                best = Some(child);
            }
        }
        best
    }

    /// Board of the root child with the highest `q`.
    pub fn best_child_board(&self) -> Option<&Board> {
        self.best_child().map(|c| &c.value.board)
    }

    pub fn best_move(&self) -> Option<Move> {
        let child = self.best_child_board()?;
        self.root.value.board.transition_move(child)
    }

    /// Walk the tree depth-first. Nodes with at least `threshold` visits are
    /// sampled and descended into; the others are returned as continuation
    /// candidates.
    pub fn harvest(&self, threshold: u32, evaluator: &mut PatternEvaluator) -> Result<Harvest, HexError> {
        let mut harvest = Harvest::default();
        harvest_node(&self.root, threshold, evaluator, &mut harvest)?;
        Ok(harvest)
    }
}

fn harvest_node(
    node: &MctsNode,
    threshold: u32,
    evaluator: &mut PatternEvaluator,
    harvest: &mut Harvest,
) -> Result<(), HexError> {
    if node.value.n < threshold {
        harvest.candidates.push(node.clone());
        return Ok(());
    }
    let counts = evaluator.count(&node.value.board, None)?;
    harvest.samples.push(Sample {
        board: node.value.board.clone(),
        n: node.value.n,
        q: node.value.red_q(),
        features: FeatureVector::extract(&node.value.board, &counts),
    });
    for child in &node.children {
        harvest_node(child, threshold, evaluator, harvest)?;
    }
    Ok(())
}

/// One iteration below `node`. Returns the score for the player who moved
/// into `node`.
fn select_expand_playout(node: &mut MctsNode, config: &MctsConfig, rng: &mut fastrand::Rng) -> f64 {
    if node.is_leaf() {
        expand(node, config);

        let score = if node.children.is_empty() {
            playout(&node.value.board, config, rng)
        } else {
            let pick = rng.usize(..node.children.len());
            let child = &mut node.children[pick];
            let child_score = playout(&child.value.board, config, rng);
            child.value.update(child_score);
            -child_score
        };
        node.value.update(score);
        return score;
    }

    let best = most_urgent(&node.children, node.value.n, config.exploration);
    let score = -select_expand_playout(&mut node.children[best], config, rng);
    node.value.update(score);
    score
}

/// Add one child per legal move, unless the leaf is decided or has not been
/// visited `expand_threshold` times yet.
fn expand(node: &mut MctsNode, config: &MctsConfig) {
    let value = &node.value;
    if value.n < config.expand_threshold || is_decided(&value.board, config.terminal) {
        return;
    }
    node.children = value
        .board
        .legal_moves()
        .into_iter()
        .map(|mv| TreeNode::new(MctsNodeValue::new(value.board.play(mv))))
        .collect();
}

/// Random moves from `board` until the game is decided. The result is for
/// the player who made the last move on `board`.
fn playout(board: &Board, config: &MctsConfig, rng: &mut fastrand::Rng) -> f64 {
    let mut board = board.clone();
    let mut sign = 1.0;
    loop {
        if is_decided(&board, config.terminal) {
            return sign * win_score(&board, config);
        }
        let moves = board.legal_moves();
        if moves.is_empty() {
            panic!("no legal move in an undecided position\n{board}");
        }
        board = board.play(moves[rng.usize(..moves.len())]);
        sign = -sign;
    }
}

/// Score of a decided position for the winner.
fn win_score(board: &Board, config: &MctsConfig) -> f64 {
    if !config.length_weighted {
        return WIN_SCORE;
    }
    let cells = (board.size() * board.size()) as f64;
    0.5 + 0.5 * board.stone_counts().empty as f64 / cells
}

/// UCT value of a child given its parent's visit count.
fn uct_value(child: &MctsNodeValue, parent_n: u32, exploration: f64) -> f64 {
    if child.n == 0 {
        return f64::INFINITY;
    }
    child.q + exploration * ((parent_n as f64).ln() / child.n as f64).sqrt()
}

/// Index of the first child with the highest UCT value.
fn most_urgent(children: &[MctsNode], parent_n: u32, exploration: f64) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, child) in children.iter().enumerate() {
        let value = uct_value(&child.value, parent_n, exploration);
        if value > best_value {
            best = i;
            best_value = value;
        }
    }
    best
}
