//! Hex board state: bit-packed rows, move application and inspection.
//!
//! A board of size S has S rows, each packed into a `u64` with two bits per
//! cell (`00` empty, `01` red, `10` blue). Cell `x` of a row lives at bits
//! `2x..2x+2`, which is what the pattern matcher relies on.
//!
//! Red connects the top row to the bottom row, Blue connects the left column
//! to the right column. The grid is skewed: the neighbours of `(x, y)` are
//! listed in [`crate::constants::NEIGHBOURS`].
//!
//! Boards are immutable values. [`Board::play`] returns a new board and never
//! touches its receiver.

use std::fmt;

use thiserror::Error;

use crate::constants::MAX_BOARD_SIZE;
use crate::error::HexError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    #[inline]
    pub fn opponent(self) -> Color {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }

    /// Two-bit cell code of this color.
    #[inline]
    pub fn bits(self) -> u64 {
        match self {
            Color::Red => 0b01,
            Color::Blue => 0b10,
        }
    }

    #[inline]
    fn from_bits(bits: u64) -> Option<Color> {
        match bits {
            0b01 => Some(Color::Red),
            0b10 => Some(Color::Blue),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "r"),
            Color::Blue => write!(f, "b"),
        }
    }
}

/// A stone of `color` placed on `(x, y)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub x: usize,
    pub y: usize,
    pub color: Color,
}

impl Move {
    pub fn new(x: usize, y: usize, color: Color) -> Self {
        Self { x, y, color }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({}, {})", self.color, self.x, self.y)
    }
}

/// Reasons a move cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("{color} cannot move twice in a row")]
    WrongTurn { color: Color },
    #[error("cell ({x}, {y}) is already occupied")]
    Occupied { x: usize, y: usize },
    #[error("cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: usize, y: usize },
}

/// Stones of each color and remaining empty cells.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoneCounts {
    pub red: usize,
    pub blue: usize,
    pub empty: usize,
}

impl StoneCounts {
    pub fn stones(&self) -> usize {
        self.red + self.blue
    }
}

/// Key identifying a position for transposition lookups: packed rows plus
/// the side that made the last move.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoardKey {
    rows: Vec<u64>,
    last: Color,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Board {
    size: usize,
    rows: Vec<u64>,
    /// Last move played. On a fresh board this is an off-board placeholder
    /// that only carries the color of the "previous" mover.
    last: Move,
}

impl Board {
    /// Create an empty board where `first` moves first.
    ///
    /// # Panics
    ///
    /// If `size` is zero or larger than [`MAX_BOARD_SIZE`]. Use
    /// [`Board::try_new`] to validate user input.
    pub fn new(size: usize, first: Color) -> Self {
        Self::try_new(size, first).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(size: usize, first: Color) -> Result<Self, HexError> {
        if size == 0 || size > MAX_BOARD_SIZE {
            return Err(HexError::BoardSize(size));
        }
        Ok(Self {
            size,
            rows: vec![0; size],
            last: Move::new(size, size, first.opponent()),
        })
    }

    /// Place stones directly, without checking turn order. `last_mover`
    /// decides who is to move next.
    ///
    /// Meant for setting up positions to analyse; games should use
    /// [`Board::play`].
    pub fn setup(size: usize, stones: &[(usize, usize, Color)], last_mover: Color) -> Self {
        let mut board = Self::new(size, last_mover.opponent());
        for &(x, y, color) in stones {
            assert!(x < size && y < size, "stone ({x}, {y}) outside a {size}x{size} board");
            assert!(board.color_at(x, y).is_none(), "stone ({x}, {y}) placed twice");
            board.set_cell(x, y, color);
        }
        board
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Packed rows, one `u64` per row.
    #[inline]
    pub fn rows(&self) -> &[u64] {
        &self.rows
    }

    /// The last move, or `None` on a board where nobody has played.
    pub fn last_move(&self) -> Option<Move> {
        (self.last.x < self.size).then_some(self.last)
    }

    /// Color of the player who made the last move.
    #[inline]
    pub fn last_mover(&self) -> Color {
        self.last.color
    }

    #[inline]
    pub fn to_move(&self) -> Color {
        self.last.color.opponent()
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.size && (y as usize) < self.size
    }

    #[inline]
    pub fn color_at(&self, x: usize, y: usize) -> Option<Color> {
        Color::from_bits((self.rows[y] >> (2 * x)) & 0b11)
    }

    /// Color at a signed coordinate; off-board cells read as `None`.
    #[inline]
    pub fn color_at_signed(&self, x: i32, y: i32) -> Option<Color> {
        if self.in_bounds(x, y) {
            self.color_at(x as usize, y as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_empty_at(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.color_at(x as usize, y as usize).is_none()
    }

    #[inline]
    fn set_cell(&mut self, x: usize, y: usize, color: Color) {
        self.rows[y] |= color.bits() << (2 * x);
    }

    /// Apply a move, returning the successor board.
    pub fn try_play(&self, mv: Move) -> Result<Board, MoveError> {
        if mv.color == self.last.color {
            return Err(MoveError::WrongTurn { color: mv.color });
        }
        if mv.x >= self.size || mv.y >= self.size {
            return Err(MoveError::OutOfBounds { x: mv.x, y: mv.y });
        }
        if self.color_at(mv.x, mv.y).is_some() {
            return Err(MoveError::Occupied { x: mv.x, y: mv.y });
        }
        let mut next = self.clone();
        next.set_cell(mv.x, mv.y, mv.color);
        next.last = mv;
        Ok(next)
    }

    /// Apply a move that is known to be legal.
    ///
    /// # Panics
    ///
    /// On a turn or occupancy violation. These are programming errors, so
    /// the panic message carries the whole board.
    pub fn play(&self, mv: Move) -> Board {
        match self.try_play(mv) {
            Ok(next) => next,
            Err(e) => panic!("illegal move {mv}: {e}\n{self}"),
        }
    }

    /// All empty cells in row-major order, attributed to the side to move.
    pub fn legal_moves(&self) -> Vec<Move> {
        let color = self.to_move();
        let mut moves = Vec::with_capacity(self.size * self.size);
        for (y, &row) in self.rows.iter().enumerate() {
            let mut r = row;
            for x in 0..self.size {
                if r & 0b11 == 0 {
                    moves.push(Move::new(x, y, color));
                }
                r >>= 2;
            }
        }
        moves
    }

    pub fn stone_counts(&self) -> StoneCounts {
        let mut counts = StoneCounts::default();
        for &row in &self.rows {
            let mut r = row;
            for _ in 0..self.size {
                match Color::from_bits(r & 0b11) {
                    Some(Color::Red) => counts.red += 1,
                    Some(Color::Blue) => counts.blue += 1,
                    None => counts.empty += 1,
                }
                r >>= 2;
            }
        }
        counts
    }

    pub fn canonical_key(&self) -> BoardKey {
        BoardKey {
            rows: self.rows.clone(),
            last: self.last.color,
        }
    }

    /// Same stones and same side to move.
    pub fn same_position(&self, other: &Board) -> bool {
        self.size == other.size && self.last.color == other.last.color && self.rows == other.rows
    }

    /// The move that turns `self` into `next`, if they differ by one stone.
    pub fn transition_move(&self, next: &Board) -> Option<Move> {
        if self.size != next.size {
            return None;
        }
        let mut found = None;
        for y in 0..self.size {
            if self.rows[y] == next.rows[y] {
                continue;
            }
            for x in 0..self.size {
                match (self.color_at(x, y), next.color_at(x, y)) {
                    (None, Some(color)) if found.is_none() => found = Some(Move::new(x, y, color)),
                    (a, b) if a == b => {}
                    _ => return None,
                }
            }
        }
        found
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size {
            write!(f, "{:indent$}", "", indent = y)?;
            for x in 0..self.size {
                match self.color_at(x, y) {
                    Some(color) => write!(f, "{color} ")?,
                    None => write!(f, ". ")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new(5, Color::Red);
        assert_eq!(board.to_move(), Color::Red);
        assert_eq!(board.last_move(), None);
        assert_eq!(board.legal_moves().len(), 25);
        assert_eq!(
            board.stone_counts(),
            StoneCounts { red: 0, blue: 0, empty: 25 }
        );
    }

    #[test]
    fn test_play_sets_bits() {
        let board = Board::new(4, Color::Red).play(Move::new(2, 1, Color::Red));
        assert_eq!(board.rows()[1], 0b01 << 4);
        assert_eq!(board.color_at(2, 1), Some(Color::Red));
        assert_eq!(board.to_move(), Color::Blue);
        assert_eq!(board.last_move(), Some(Move::new(2, 1, Color::Red)));
    }

    #[test]
    fn test_wrong_turn_rejected() {
        let board = Board::new(4, Color::Blue);
        assert_eq!(
            board.try_play(Move::new(0, 0, Color::Red)),
            Err(MoveError::WrongTurn { color: Color::Red })
        );
    }

    #[test]
    fn test_occupied_rejected() {
        let board = Board::new(4, Color::Red).play(Move::new(1, 1, Color::Red));
        assert_eq!(
            board.try_play(Move::new(1, 1, Color::Blue)),
            Err(MoveError::Occupied { x: 1, y: 1 })
        );
    }

    #[test]
    #[should_panic(expected = "illegal move")]
    fn test_play_panics_on_violation() {
        let board = Board::new(3, Color::Red);
        board.play(Move::new(0, 0, Color::Blue));
    }

    #[test]
    fn test_legal_moves_belong_to_side_to_move() {
        let board = Board::new(3, Color::Red).play(Move::new(0, 0, Color::Red));
        let moves = board.legal_moves();
        assert_eq!(moves.len(), 8);
        assert!(moves.iter().all(|m| m.color == Color::Blue));
        assert_eq!(moves[0], Move::new(1, 0, Color::Blue));
    }

    #[test]
    fn test_canonical_key_tracks_side_to_move() {
        let a = Board::setup(3, &[(0, 0, Color::Red)], Color::Red);
        let b = Board::setup(3, &[(0, 0, Color::Red)], Color::Blue);
        assert_ne!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key(), a.clone().canonical_key());
    }

    #[test]
    fn test_transition_move() {
        let a = Board::new(4, Color::Red);
        let b = a.play(Move::new(3, 2, Color::Red));
        assert_eq!(a.transition_move(&b), Some(Move::new(3, 2, Color::Red)));
        assert_eq!(b.transition_move(&a), None);
    }

    #[test]
    fn test_try_new_rejects_oversized_board() {
        assert!(Board::try_new(MAX_BOARD_SIZE + 1, Color::Red).is_err());
        assert!(Board::try_new(0, Color::Red).is_err());
    }

    #[test]
    fn test_display() {
        let board = Board::new(2, Color::Red).play(Move::new(1, 0, Color::Red));
        assert_eq!(board.to_string(), ". r \n . . \n");
    }
}
