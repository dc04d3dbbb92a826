//! hexai: search engines for the game of Hex.
//!
//! Two engines share one board representation and one connectivity oracle:
//! a Monte Carlo tree search that can fan out over worker threads to
//! harvest training samples, and an iterative-deepening alpha-beta search
//! scored by a pattern evaluator.
//!
//! ## Modules
//!
//! - [`constants`] - Board geometry and engine defaults
//! - [`board`] - Packed board state and moves
//! - [`connectivity`] - A* search for winning and virtually winning chains
//! - [`patterns`] - Pattern catalogue and the pattern-counting evaluator
//! - [`features`] - Feature vectors, samples and the static score
//! - [`tree`] - Generic search tree
//! - [`mcts`] - Monte Carlo Tree Search (UCT)
//! - [`candidates`] - Continuation candidates for further MCTS runs
//! - [`parallel`] - Worker threads running MCTS continuations
//! - [`alphabeta`] - Negamax with alpha-beta pruning and a transposition table
//! - [`endgame`] - Bridge defense once the game is decided
//! - [`agent`] - Computer players built on both engines
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use hexai::board::{Board, Color};
//! use hexai::mcts::{Mcts, MctsConfig};
//!
//! let board = Board::new(4, Color::Red);
//! let mut search = Mcts::new(board, MctsConfig::default()).with_seed(1);
//! search.run_for(Duration::from_millis(50));
//! println!("best move: {:?}", search.best_move());
//! ```

pub mod agent;
pub mod alphabeta;
pub mod board;
pub mod candidates;
pub mod connectivity;
pub mod constants;
pub mod endgame;
pub mod error;
pub mod features;
pub mod mcts;
pub mod parallel;
pub mod patterns;
pub mod tree;
