//! Computer players.
//!
//! An agent keeps its own copy of the game. All agents share the endgame
//! shortcuts: once they hold a virtual connection they only keep its bridges
//! intact, and once the opponent holds one they attack its carriers instead
//! of searching. Agents never resign.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::alphabeta::{AlphaBeta, Deadline};
use crate::board::{Board, Color, Move, MoveError};
use crate::connectivity::{connection, strict_winner, Mode};
use crate::endgame::{desperate_move, BridgeDefense};
use crate::error::HexError;
use crate::features::ScoreWeights;
use crate::mcts::{Mcts, MctsConfig};
use crate::patterns::{Catalogue, PatternEvaluator};

pub trait Agent {
    fn name(&self) -> &str;

    /// Start a game on an empty `size` board, playing `color`. Red moves
    /// first.
    fn new_game(&mut self, size: usize, color: Color) -> Result<(), HexError>;

    fn opponent_moved(&mut self, mv: Move) -> Result<(), MoveError>;

    /// Choose and play a move. `None` once the game is over.
    fn next_move(&mut self) -> Result<Option<Move>, HexError>;
}

/// Game state and endgame shortcuts common to all agents.
#[derive(Clone)]
struct Seat {
    board: Board,
    color: Color,
    last_opponent: Option<Move>,
    defense: Option<BridgeDefense>,
}

impl Seat {
    fn new(size: usize, color: Color) -> Result<Self, HexError> {
        Ok(Self {
            board: Board::try_new(size, Color::Red)?,
            color,
            last_opponent: None,
            defense: None,
        })
    }

    fn opponent_moved(&mut self, mv: Move) -> Result<(), MoveError> {
        if mv.color == self.color {
            return Err(MoveError::WrongTurn { color: mv.color });
        }
        self.board = self.board.try_play(mv)?;
        self.last_opponent = Some(mv);
        Ok(())
    }

    fn game_over(&self) -> bool {
        strict_winner(&self.board).is_some() || self.board.to_move() != self.color
    }

    /// A move that needs no search, if the game is already decided
    /// virtually.
    fn endgame_move(&mut self) -> Option<Move> {
        if self.defense.is_none() {
            self.defense = BridgeDefense::find(&self.board, self.color);
        }
        if let Some(defense) = self.defense.as_mut() {
            match defense.respond(self.last_opponent) {
                Some(mv) if self.board.is_empty_at(mv.x as i32, mv.y as i32) => return Some(mv),
                _ => {
                    debug!("bridge defense exhausted, back to searching");
                    self.defense = None;
                }
            }
        }

        if connection(&self.board, self.color.opponent(), Mode::Virtual).exists {
            if let Some(mv) = desperate_move(&self.board, self.color) {
                debug!("{} is lost, attacking a bridge", self.color);
                return Some(mv);
            }
        }
        None
    }

    fn fallback_move(&self) -> Option<Move> {
        let mv = self.board.legal_moves().into_iter().next();
        if let Some(mv) = mv {
            warn!("search found no move, playing {mv}");
        }
        mv
    }

    fn play(&mut self, mv: Move) -> Move {
        self.board = self.board.play(mv);
        mv
    }
}

pub struct MctsAgent {
    config: MctsConfig,
    budget: Duration,
    seed: Option<u64>,
    seat: Option<Seat>,
    search: Option<Mcts>,
}

impl MctsAgent {
    pub fn new(config: MctsConfig, budget: Duration) -> Self {
        Self {
            config,
            budget,
            seed: None,
            seat: None,
            search: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Agent for MctsAgent {
    fn name(&self) -> &str {
        "mcts"
    }

    fn new_game(&mut self, size: usize, color: Color) -> Result<(), HexError> {
        self.seat = Some(Seat::new(size, color)?);
        self.search = None;
        Ok(())
    }

    fn opponent_moved(&mut self, mv: Move) -> Result<(), MoveError> {
        match self.seat.as_mut() {
            Some(seat) => seat.opponent_moved(mv),
            None => Err(MoveError::WrongTurn { color: mv.color }),
        }
    }

    fn next_move(&mut self) -> Result<Option<Move>, HexError> {
        let Some(seat) = self.seat.as_mut() else {
            return Ok(None);
        };
        if seat.game_over() {
            return Ok(None);
        }
        if let Some(mv) = seat.endgame_move() {
            self.search = None;
            return Ok(Some(seat.play(mv)));
        }

        let mut search = match self.search.take() {
            Some(previous) => previous.continue_from(&seat.board),
            None => {
                let search = Mcts::new(seat.board.clone(), self.config.clone());
                match self.seed {
                    Some(seed) => search.with_seed(seed),
                    None => search,
                }
            }
        };
        let iterations = search.run_for(self.budget);
        let chosen = search.best_move().or_else(|| seat.fallback_move());
        debug!(
            "mcts ran {iterations} iterations, root q {:.3}, chose {chosen:?}",
            search.root().value.q
        );
        self.search = Some(search);
        Ok(chosen.map(|mv| seat.play(mv)))
    }
}

pub struct AlphaBetaAgent {
    evaluator: PatternEvaluator,
    weights: ScoreWeights,
    budget: Duration,
    seat: Option<Seat>,
}

impl AlphaBetaAgent {
    pub fn new(catalogue: Arc<Catalogue>, weights: ScoreWeights, budget: Duration) -> Self {
        Self {
            evaluator: PatternEvaluator::spawn(catalogue),
            weights,
            budget,
            seat: None,
        }
    }
}

impl Agent for AlphaBetaAgent {
    fn name(&self) -> &str {
        "alpha-beta"
    }

    fn new_game(&mut self, size: usize, color: Color) -> Result<(), HexError> {
        self.seat = Some(Seat::new(size, color)?);
        Ok(())
    }

    fn opponent_moved(&mut self, mv: Move) -> Result<(), MoveError> {
        match self.seat.as_mut() {
            Some(seat) => seat.opponent_moved(mv),
            None => Err(MoveError::WrongTurn { color: mv.color }),
        }
    }

    fn next_move(&mut self) -> Result<Option<Move>, HexError> {
        let Some(seat) = self.seat.as_mut() else {
            return Ok(None);
        };
        if seat.game_over() {
            return Ok(None);
        }
        if let Some(mv) = seat.endgame_move() {
            return Ok(Some(seat.play(mv)));
        }

        let mut search = AlphaBeta::new(&mut self.evaluator, self.weights.clone());
        let outcome = search.search(&seat.board, &Deadline::after(self.budget), false)?;
        debug!(
            "alpha-beta reached depth {} ({} nodes), value {:.3}",
            outcome.depth, outcome.nodes, outcome.value
        );
        let chosen = outcome.best_move.or_else(|| seat.fallback_move());
        Ok(chosen.map(|mv| seat.play(mv)))
    }
}

/// Alpha-beta for the opening, MCTS once the board holds `switch_at`
/// stones.
pub struct HybridAgent {
    alpha_beta: AlphaBetaAgent,
    mcts: MctsAgent,
    switch_at: usize,
    switched: bool,
}

impl HybridAgent {
    pub fn new(alpha_beta: AlphaBetaAgent, mcts: MctsAgent, switch_at: usize) -> Self {
        Self {
            alpha_beta,
            mcts,
            switch_at,
            switched: false,
        }
    }

    /// Whether MCTS has taken over.
    pub fn switched(&self) -> bool {
        self.switched
    }

    fn active(&mut self) -> &mut dyn Agent {
        if self.switched {
            &mut self.mcts
        } else {
            &mut self.alpha_beta
        }
    }
}

impl Agent for HybridAgent {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn new_game(&mut self, size: usize, color: Color) -> Result<(), HexError> {
        self.switched = false;
        self.mcts.seat = None;
        self.mcts.search = None;
        self.alpha_beta.new_game(size, color)
    }

    fn opponent_moved(&mut self, mv: Move) -> Result<(), MoveError> {
        self.active().opponent_moved(mv)
    }

    fn next_move(&mut self) -> Result<Option<Move>, HexError> {
        if !self.switched {
            if let Some(seat) = &self.alpha_beta.seat {
                if seat.board.stone_counts().stones() >= self.switch_at {
                    debug!("{} stones on the board, handing over to mcts", self.switch_at);
                    self.mcts.seat = Some(seat.clone());
                    self.mcts.search = None;
                    self.switched = true;
                }
            }
        }
        self.active().next_move()
    }
}

/// A finished game between two agents.
#[derive(Clone, Debug, Default)]
pub struct GameRecord {
    pub moves: Vec<Move>,
    pub winner: Option<Color>,
}

/// Play `red` against `blue` on an empty `size` board until one side
/// connects.
pub fn play_game<'a>(red: &'a mut dyn Agent, blue: &'a mut dyn Agent, size: usize) -> Result<GameRecord, HexError> {
    let mut board = Board::try_new(size, Color::Red)?;
    red.new_game(size, Color::Red)?;
    blue.new_game(size, Color::Blue)?;

    let mut record = GameRecord::default();
    while record.winner.is_none() {
        let (mover, waiting) = match board.to_move() {
            Color::Red => (&mut *red, &mut *blue),
            Color::Blue => (&mut *blue, &mut *red),
        };
        let Some(mv) = mover.next_move()? else {
            break;
        };
        board = board.try_play(mv)?;
        waiting.opponent_moved(mv)?;
        debug!("{} played {mv}", mover.name());
        record.moves.push(mv);
        record.winner = strict_winner(&board);
    }

    if let Some(winner) = record.winner {
        info!("{winner} wins after {} moves\n{board}", record.moves.len());
    }
    Ok(record)
}
