//! Integration tests for hexai
//!
//! End-to-end checks across modules: the bundled pattern catalogue, both
//! search engines on small boards, and the parallel sampler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;

use hexai::alphabeta::{AlphaBeta, Deadline};
use hexai::board::Color::{Blue, Red};
use hexai::board::{Board, Move, MoveError};
use hexai::connectivity::{connection, strict_winner, Mode};
use hexai::constants::{PATTERN_FILE, WON};
use hexai::features::{FeatureVector, ScoreWeights};
use hexai::mcts::{Mcts, MctsConfig};
use hexai::parallel::{Coordinator, CoordinatorConfig};
use hexai::patterns::{count_patterns, Catalogue, PatternEvaluator};

// =============================================================================
// Helpers
// =============================================================================

fn bundled_catalogue() -> Catalogue {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(PATTERN_FILE);
    Catalogue::load(&path).unwrap()
}

/// Play `cells` alternately, red first.
fn play_sequence(size: usize, cells: &[(usize, usize)]) -> Board {
    let mut board = Board::new(size, Red);
    for &(x, y) in cells {
        board = board.play(Move::new(x, y, board.to_move()));
    }
    board
}

// =============================================================================
// Board
// =============================================================================

#[test]
fn test_wrong_turn_is_rejected() {
    let board = Board::new(3, Red);
    assert_eq!(
        board.try_play(Move::new(0, 0, Blue)),
        Err(MoveError::WrongTurn { color: Blue })
    );
    let board = board.play(Move::new(0, 0, Red));
    assert_eq!(
        board.try_play(Move::new(1, 1, Red)),
        Err(MoveError::WrongTurn { color: Red })
    );
}

#[test]
fn test_play_leaves_receiver_untouched() {
    let board = play_sequence(4, &[(1, 1), (2, 2)]);
    let before = board.clone();
    let next = board.play(Move::new(0, 3, Red));
    assert_eq!(board, before);
    assert_ne!(next, before);
    assert_eq!(next.stone_counts().stones(), 3);
    assert_eq!(board.transition_move(&next), Some(Move::new(0, 3, Red)));
}

// =============================================================================
// Bundled pattern catalogue
// =============================================================================

#[test]
fn test_bundled_catalogue_fixture_counts() {
    let catalogue = bundled_catalogue();
    assert_eq!(catalogue.len(), 5);

    let board = Board::setup(6, &[(1, 2, Red), (4, 1, Blue)], Blue);
    let counts = count_patterns(&catalogue, board.rows(), None);
    assert_eq!(counts.red, vec![1, 0, 0, 0, 1, 3, 3]);
    assert_eq!(counts.blue, vec![1, 0, 0, 0, 1, 3, 3]);

    let features = FeatureVector::extract(&board, &counts);
    assert_eq!(features.values().len(), FeatureVector::header(catalogue.len()).len());
}

#[test]
fn test_evaluator_thread_agrees_with_direct_count() {
    let catalogue = Arc::new(bundled_catalogue());
    let board = play_sequence(6, &[(2, 2), (3, 2), (2, 3), (1, 4), (3, 3)]);
    let direct = count_patterns(&catalogue, board.rows(), None);

    let mut evaluator = PatternEvaluator::spawn(Arc::clone(&catalogue));
    assert_eq!(evaluator.count(&board, None).unwrap(), direct);
    assert_eq!(evaluator.count(&board, None).unwrap(), direct);
    evaluator.shutdown();
}

// =============================================================================
// Engines
// =============================================================================

#[test]
fn test_engines_agree_on_forced_win() {
    // Red to move; (0, 2) completes the left column.
    let board = Board::setup(3, &[(0, 0, Red), (0, 1, Red), (1, 1, Blue), (2, 1, Blue)], Blue);
    let winning = Move::new(0, 2, Red);

    let mut mcts = Mcts::new(board.clone(), MctsConfig::default()).with_seed(3);
    for _ in 0..2_000 {
        mcts.run_iteration();
    }
    assert_eq!(mcts.best_move(), Some(winning));

    let mut evaluator = PatternEvaluator::spawn(Arc::new(bundled_catalogue()));
    let outcome = AlphaBeta::new(&mut evaluator, ScoreWeights::default())
        .search(&board, &Deadline::never(), false)
        .unwrap();
    assert_eq!(outcome.best_move, Some(winning));
    assert_eq!(outcome.value, WON);

    let after = board.play(winning);
    assert_eq!(strict_winner(&after), Some(Red));
}

#[test]
fn test_virtual_connection_precedes_strict_one() {
    // (1, 0) and the (0, 2)-(0, 3) chain form a bridge over (0, 1) and (1, 1).
    let board = Board::setup(4, &[(1, 0, Red), (0, 2, Red), (0, 3, Red)], Red);
    assert!(!connection(&board, Red, Mode::Strict).exists);
    assert!(connection(&board, Red, Mode::Virtual).exists);

    let filled = Board::setup(4, &[(1, 0, Red), (0, 1, Red), (0, 2, Red), (0, 3, Red)], Red);
    assert!(connection(&filled, Red, Mode::Strict).exists);
}

#[test]
fn test_parallel_sampling_run() {
    let config = CoordinatorConfig {
        workers: 2,
        time_budget: Duration::from_millis(30),
        sample_threshold: 20,
        max_tasks: Some(4),
    };
    let coordinator = Coordinator::new(config, Arc::new(bundled_catalogue()));
    let (_stop_tx, stop_rx) = bounded(1);

    let initial = Mcts::new(Board::new(4, Red), MctsConfig::default());
    let summary = coordinator.run(initial, stop_rx).unwrap();

    assert!(!summary.stopped);
    assert!(summary.tasks_finished >= 1 && summary.tasks_finished <= 4);
    assert_eq!(summary.tasks_finished, summary.finished.len());
    for sample in &summary.samples {
        assert!(sample.n >= 20);
        assert!(sample.q.abs() <= 1.0);
    }
}
