use std::path::PathBuf;

use thiserror::Error;

use crate::board::MoveError;

/// Errors that abort a run. A rejected [`MoveError`] converts into
/// [`HexError::IllegalMove`] where it cannot be handled.
#[derive(Debug, Error)]
pub enum HexError {
    #[error("cannot read pattern catalogue {path}: {source}")]
    CatalogueIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pattern catalogue line {line}: {reason}")]
    CatalogueSyntax { line: usize, reason: String },

    #[error("board size {0} is not supported (1..={max})", max = crate::constants::MAX_BOARD_SIZE)]
    BoardSize(usize),

    #[error("pattern evaluator is no longer running")]
    EvaluatorGone,

    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("all workers disconnected before the run finished")]
    WorkersGone,

    #[error("search cancelled")]
    Cancelled,

    #[error("illegal move: {0}")]
    IllegalMove(#[from] MoveError),
}
