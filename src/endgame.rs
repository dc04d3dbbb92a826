//! Play once the game is decided.
//!
//! When a side holds a virtual connection, searching is pointless: every
//! bridge on the chain only has to be answered when the opponent intrudes,
//! and filled otherwise. When a side is lost, it still plays on by attacking
//! the opponent's bridges and hoping for a mistake.

use log::debug;

use crate::board::{Board, Color, Move};
use crate::connectivity::{are_adjacent, bridge_carriers, connection, Cell, Mode};

/// Carrier pairs of every bridge on a virtual winning `path` of `color`,
/// including the edge bridge onto the near edge.
pub fn safe_cells(path: &[Cell], color: Color) -> Vec<[Cell; 2]> {
    let mut bridges: Vec<[Cell; 2]> = path
        .windows(2)
        .filter(|pair| !are_adjacent(pair[0], pair[1]))
        .filter_map(|pair| bridge_carriers(pair[0], pair[1]))
        .collect();

    if let Some(&(x, y)) = path.last() {
        match color {
            Color::Red if y > 0 => bridges.push([(x, y - 1), (x + 1, y - 1)]),
            Color::Blue if x > 0 => bridges.push([(x - 1, y), (x - 1, y + 1)]),
            _ => {}
        }
    }
    bridges
}

/// Keeps a secured connection intact until it is completed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeDefense {
    color: Option<Color>,
    bridges: Vec<[Cell; 2]>,
}

impl BridgeDefense {
    /// The defense for `color` if it holds a virtual connection on `board`.
    pub fn find(board: &Board, color: Color) -> Option<Self> {
        let found = connection(board, color, Mode::Virtual);
        if !found.exists {
            return None;
        }
        let bridges = safe_cells(&found.path, color);
        debug!("{color} holds a virtual connection with {} open bridges", bridges.len());
        Some(Self {
            color: Some(color),
            bridges,
        })
    }

    pub fn open_bridges(&self) -> &[[Cell; 2]] {
        &self.bridges
    }

    /// Next move of the defended chain. An intrusion into a bridge is
    /// answered with that bridge's other carrier; otherwise the first open
    /// bridge is filled. `None` once every bridge is closed.
    pub fn respond(&mut self, last_opponent_move: Option<Move>) -> Option<Move> {
        let color = self.color?;
        let intruded = last_opponent_move.and_then(|mv| {
            let hit = (mv.x as i32, mv.y as i32);
            self.bridges
                .iter()
                .enumerate()
                .find_map(|(i, pair)| pair.iter().position(|&c| c == hit).map(|k| (i, 1 - k)))
        });

        let cell = match intruded {
            Some((i, other)) => self.bridges.remove(i)[other],
            None if self.bridges.is_empty() => return None,
            None => self.bridges.remove(0)[0],
        };
        Some(Move::new(cell.0 as usize, cell.1 as usize, color))
    }
}

/// A move for a lost `color`: occupy a carrier of the opponent's virtual
/// connection.
pub fn desperate_move(board: &Board, color: Color) -> Option<Move> {
    let opponent = connection(board, color.opponent(), Mode::Virtual);
    if !opponent.exists {
        return None;
    }
    safe_cells(&opponent.path, color.opponent())
        .into_iter()
        .flatten()
        .find(|&(x, y)| board.is_empty_at(x, y))
        .map(|(x, y)| Move::new(x as usize, y as usize, color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color::{Blue, Red};

    fn bridged_board() -> Board {
        Board::setup(4, &[(1, 0, Red), (0, 2, Red), (0, 3, Red), (3, 3, Blue)], Red)
    }

    #[test]
    fn test_safe_cells_of_inner_bridge() {
        let path = [(0, 3), (0, 2), (1, 0)];
        assert_eq!(safe_cells(&path, Red), vec![[(0, 1), (1, 1)]]);
    }

    #[test]
    fn test_safe_cells_of_edge_bridges() {
        let red = [(1, 3), (1, 2), (1, 1)];
        assert_eq!(safe_cells(&red, Red), vec![[(1, 0), (2, 0)]]);

        let blue = [(3, 2), (2, 2), (1, 2)];
        assert_eq!(safe_cells(&blue, Blue), vec![[(0, 2), (0, 3)]]);

        // Past the far edge: the carriers are the last row.
        let beyond = [(1, 4), (2, 2), (2, 1), (2, 0)];
        assert_eq!(safe_cells(&beyond, Red), vec![[(1, 3), (2, 3)]]);
    }

    #[test]
    fn test_respond_to_intrusion() {
        let board = bridged_board();
        let mut defense = BridgeDefense::find(&board, Red).unwrap();
        assert_eq!(defense.open_bridges().len(), 1);

        let reply = defense.respond(Some(Move::new(1, 1, Blue)));
        assert_eq!(reply, Some(Move::new(0, 1, Red)));
        assert_eq!(defense.respond(None), None);
    }

    #[test]
    fn test_fill_first_bridge_without_intrusion() {
        let board = bridged_board();
        let mut defense = BridgeDefense::find(&board, Red).unwrap();
        assert_eq!(defense.respond(Some(Move::new(3, 0, Blue))), Some(Move::new(0, 1, Red)));
    }

    #[test]
    fn test_no_defense_without_connection() {
        let board = Board::setup(4, &[(1, 0, Red)], Red);
        assert!(BridgeDefense::find(&board, Red).is_none());
    }

    #[test]
    fn test_desperate_move_attacks_carrier() {
        let board = bridged_board();
        assert_eq!(desperate_move(&board, Blue), Some(Move::new(0, 1, Blue)));
        assert_eq!(desperate_move(&board, Red), None);
    }
}
