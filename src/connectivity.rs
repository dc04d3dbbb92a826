//! Connectivity oracle: does a color connect its two edges?
//!
//! The oracle runs an A* search over cells of one color. Strict mode follows
//! only adjacent own stones and answers "has this side won". Virtual mode
//! also crosses two-cell bridges whose carriers are both empty, and edge
//! bridges onto the first and past the last row, answering "can this side
//! no longer be stopped".
//!
//! This is the terminal test of both search engines and by far the most
//! frequently called routine, so it works on the packed board directly and
//! keeps its bookkeeping in flat vectors.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::board::{Board, Color};
use crate::constants::{BRIDGES, NEIGHBOURS};

/// A signed cell coordinate. Virtual paths may end one step past the far
/// edge, so coordinates can leave the board.
pub type Cell = (i32, i32);

/// Which links the search may follow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Adjacent stones only: a completed chain.
    Strict,
    /// Adjacent stones plus uncontested bridges.
    Virtual,
}

/// Result of a connectivity query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Connection {
    pub exists: bool,
    /// Cells of the chain, from the far edge back to the near edge.
    pub path: Vec<Cell>,
}

struct SearchNode {
    /// `None` for the synthetic start in front of the near edge.
    cell: Option<Cell>,
    parent: Option<usize>,
    /// Empty cells of the bridge used to reach this node.
    carriers: Option<[Cell; 2]>,
    cost: i32,
}

/// Search for a chain of `color` between its two edges.
pub fn connection(board: &Board, color: Color, mode: Mode) -> Connection {
    let size = board.size();
    let mut arena = vec![SearchNode {
        cell: None,
        parent: None,
        carriers: None,
        cost: 0,
    }];
    let mut frontier = BinaryHeap::new();
    let mut visited = vec![false; size * size];
    frontier.push(Reverse((size as i32, 0usize)));

    while let Some(Reverse((_, idx))) = frontier.pop() {
        let (cell, carriers, cost) = (arena[idx].cell, arena[idx].carriers, arena[idx].cost);

        let successors = match cell {
            None => start_successors(board, color, mode),
            Some(c) => {
                if reaches_far_edge(c, color, size) {
                    return Connection {
                        exists: true,
                        path: trace_path(&arena, idx),
                    };
                }
                let slot = c.1 as usize * size + c.0 as usize;
                if visited[slot] {
                    continue;
                }
                visited[slot] = true;
                cell_successors(board, color, mode, c, carriers)
            }
        };

        for (next, via) in successors {
            if board.in_bounds(next.0, next.1) && visited[next.1 as usize * size + next.0 as usize] {
                continue;
            }
            arena.push(SearchNode {
                cell: Some(next),
                parent: Some(idx),
                carriers: via,
                cost: cost + 1,
            });
            let priority = cost + 1 + remaining(next, color, size);
            frontier.push(Reverse((priority, arena.len() - 1)));
        }
    }

    Connection::default()
}

/// Has the player who made the last move completed (or, in virtual mode,
/// secured) a chain?
#[inline]
pub fn is_decided(board: &Board, mode: Mode) -> bool {
    connection(board, board.last_mover(), mode).exists
}

/// The color with a completed chain, if any.
pub fn strict_winner(board: &Board) -> Option<Color> {
    [Color::Red, Color::Blue]
        .into_iter()
        .find(|&c| connection(board, c, Mode::Strict).exists)
}

/// Distance in rows (red) or columns (blue) to the far edge.
#[inline]
fn remaining(cell: Cell, color: Color, size: usize) -> i32 {
    match color {
        Color::Red => size as i32 - 1 - cell.1,
        Color::Blue => size as i32 - 1 - cell.0,
    }
}

#[inline]
fn reaches_far_edge(cell: Cell, color: Color, size: usize) -> bool {
    remaining(cell, color, size) <= 0
}

/// Beyond the far edge, reachable only through a bridge whose carriers are
/// the last row (red) or column (blue).
#[inline]
fn is_ending_cell(cell: Cell, color: Color, size: usize) -> bool {
    let size = size as i32;
    match color {
        Color::Red => cell.1 >= size && cell.0 >= 0,
        Color::Blue => cell.0 >= size && cell.1 >= 0,
    }
}

fn start_successors(board: &Board, color: Color, mode: Mode) -> Vec<(Cell, Option<[Cell; 2]>)> {
    let size = board.size() as i32;
    // Map "position along the edge" and "distance from the edge" to (x, y).
    let at = |along: i32, depth: i32| -> Cell {
        match color {
            Color::Red => (along, depth),
            Color::Blue => (depth, along),
        }
    };

    let mut successors = Vec::new();
    for a in 0..size {
        let c = at(a, 0);
        if board.color_at_signed(c.0, c.1) == Some(color) {
            successors.push((c, None));
        }
    }

    if mode == Mode::Virtual {
        for a in 0..size - 1 {
            let c = at(a, 1);
            let (e1, e2) = (at(a, 0), at(a + 1, 0));
            if board.color_at_signed(c.0, c.1) == Some(color)
                && board.is_empty_at(e1.0, e1.1)
                && board.is_empty_at(e2.0, e2.1)
            {
                successors.push((c, Some([e1, e2])));
            }
        }
    }
    successors
}

fn cell_successors(
    board: &Board,
    color: Color,
    mode: Mode,
    (x, y): Cell,
    incoming: Option<[Cell; 2]>,
) -> Vec<(Cell, Option<[Cell; 2]>)> {
    let mut successors = Vec::with_capacity(6);
    let mut empty = [false; 6];

    for (i, &(dx, dy)) in NEIGHBOURS.iter().enumerate() {
        let (nx, ny) = (x + dx, y + dy);
        if !board.in_bounds(nx, ny) {
            continue;
        }
        match board.color_at(nx as usize, ny as usize) {
            Some(c) if c == color => successors.push(((nx, ny), None)),
            None => empty[i] = true,
            _ => {}
        }
    }

    if mode == Mode::Virtual {
        for (i, &(bx, by)) in BRIDGES.iter().enumerate() {
            let j = (i + 5) % 6;
            if !empty[j] || !empty[i] {
                continue;
            }
            let carriers = [
                (x + NEIGHBOURS[j].0, y + NEIGHBOURS[j].1),
                (x + NEIGHBOURS[i].0, y + NEIGHBOURS[i].1),
            ];
            if let Some(prev) = incoming {
                if carriers.iter().any(|c| prev.contains(c)) {
                    continue;
                }
            }
            let target = (x + bx, y + by);
            if is_ending_cell(target, color, board.size())
                || board.color_at_signed(target.0, target.1) == Some(color)
            {
                successors.push((target, Some(carriers)));
            }
        }
    }
    successors
}

fn trace_path(arena: &[SearchNode], mut idx: usize) -> Vec<Cell> {
    let mut path = Vec::new();
    while let Some(cell) = arena[idx].cell {
        path.push(cell);
        match arena[idx].parent {
            Some(parent) => idx = parent,
            None => break,
        }
    }
    path
}

/// Do two cells share a side?
pub fn are_adjacent(a: Cell, b: Cell) -> bool {
    NEIGHBOURS.iter().any(|&(dx, dy)| (a.0 + dx, a.1 + dy) == b)
}

/// The two carrier cells of the bridge between `a` and `b`, or `None` if
/// the cells do not form a bridge.
pub fn bridge_carriers(a: Cell, b: Cell) -> Option<[Cell; 2]> {
    let offset = (b.0 - a.0, b.1 - a.1);
    let i = BRIDGES.iter().position(|&o| o == offset)?;
    let j = (i + 5) % 6;
    Some([
        (a.0 + NEIGHBOURS[j].0, a.1 + NEIGHBOURS[j].1),
        (a.0 + NEIGHBOURS[i].0, a.1 + NEIGHBOURS[i].1),
    ])
}

/// Empty cells adjacent to a `color` stone, or joined to one by a bridge with
/// two empty carriers.
pub fn reachable_empty_cells(board: &Board, color: Color) -> usize {
    let size = board.size();
    let mut reached = vec![false; size * size];

    for y in 0..size as i32 {
        for x in 0..size as i32 {
            if board.color_at_signed(x, y) != Some(color) {
                continue;
            }
            for &(dx, dy) in &NEIGHBOURS {
                if board.is_empty_at(x + dx, y + dy) {
                    reached[(y + dy) as usize * size + (x + dx) as usize] = true;
                }
            }
            for (i, &(bx, by)) in BRIDGES.iter().enumerate() {
                let j = (i + 5) % 6;
                let (tx, ty) = (x + bx, y + by);
                if board.is_empty_at(tx, ty)
                    && board.is_empty_at(x + NEIGHBOURS[j].0, y + NEIGHBOURS[j].1)
                    && board.is_empty_at(x + NEIGHBOURS[i].0, y + NEIGHBOURS[i].1)
                {
                    reached[ty as usize * size + tx as usize] = true;
                }
            }
        }
    }
    reached.iter().filter(|&&r| r).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color::{Blue, Red};

    #[test]
    fn test_empty_board_has_no_connection() {
        let board = Board::new(5, Red);
        assert!(!connection(&board, Red, Mode::Strict).exists);
        assert!(!connection(&board, Blue, Mode::Virtual).exists);
        assert!(!is_decided(&board, Mode::Virtual));
    }

    #[test]
    fn test_strict_column_for_red() {
        let board = Board::setup(
            4,
            &[(0, 0, Red), (0, 1, Red), (0, 2, Red), (0, 3, Red), (3, 0, Blue), (3, 1, Blue), (3, 2, Blue)],
            Red,
        );
        let result = connection(&board, Red, Mode::Strict);
        assert!(result.exists);
        assert_eq!(result.path, vec![(0, 3), (0, 2), (0, 1), (0, 0)]);
        assert!(is_decided(&board, Mode::Strict));
        assert_eq!(strict_winner(&board), Some(Red));
    }

    #[test]
    fn test_strict_row_for_blue() {
        let board = Board::setup(
            4,
            &[(0, 1, Blue), (1, 1, Blue), (2, 1, Blue), (3, 1, Blue), (0, 0, Red), (1, 0, Red), (2, 0, Red)],
            Blue,
        );
        let result = connection(&board, Blue, Mode::Strict);
        assert!(result.exists);
        assert_eq!(result.path.len(), 4);
        assert_eq!(result.path[0], (3, 1));
    }

    #[test]
    fn test_skewed_diagonal_is_connected() {
        // (2,0) -> (1,1) -> (0,2) are neighbours on the hex grid.
        let board = Board::setup(3, &[(2, 0, Red), (1, 1, Red), (0, 2, Red)], Red);
        assert!(connection(&board, Red, Mode::Strict).exists);
    }

    #[test]
    fn test_bridge_counts_only_in_virtual_mode() {
        // (1,0) and (0,2) form a bridge carried by (1,1) and (0,1).
        let board = Board::setup(4, &[(1, 0, Red), (0, 2, Red), (0, 3, Red), (3, 3, Blue)], Red);
        assert!(!connection(&board, Red, Mode::Strict).exists);
        let result = connection(&board, Red, Mode::Virtual);
        assert!(result.exists);
        assert_eq!(result.path, vec![(0, 3), (0, 2), (1, 0)]);

        let blocked = Board::setup(4, &[(1, 0, Red), (0, 2, Red), (0, 3, Red), (1, 1, Blue)], Red);
        assert!(!connection(&blocked, Red, Mode::Virtual).exists);
    }

    #[test]
    fn test_edge_bridges() {
        // (1,1) hangs off the top edge through (1,0) and (2,0); (2,2) reaches
        // past the bottom edge through (2,3) and (1,3).
        let board = Board::setup(4, &[(1, 1, Red), (1, 2, Red), (3, 0, Blue)], Red);
        let result = connection(&board, Red, Mode::Virtual);
        assert!(result.exists);
        assert!(!connection(&board, Red, Mode::Strict).exists);

        let board = Board::setup(4, &[(2, 0, Red), (2, 1, Red), (2, 2, Red), (0, 0, Blue)], Red);
        let result = connection(&board, Red, Mode::Virtual);
        assert!(result.exists);
        assert_eq!(result.path.last(), Some(&(2, 0)));
        assert!(result.path[0].1 >= 3);
    }

    #[test]
    fn test_overlapping_bridges_rejected() {
        // (1,1) -> (2,2) uses carriers (2,1), (1,2); (2,2) -> (0,3) would
        // reuse (1,2), so the chain is not a virtual connection.
        let board = Board::setup(
            4,
            &[(1, 1, Red), (2, 2, Red), (0, 3, Red), (2, 3, Blue), (0, 2, Blue)],
            Red,
        );
        assert!(!connection(&board, Red, Mode::Virtual).exists);
    }

    #[test]
    fn test_bridge_helpers() {
        assert!(are_adjacent((1, 1), (2, 0)));
        assert!(!are_adjacent((1, 1), (2, 2)));
        assert_eq!(bridge_carriers((1, 1), (2, 2)), Some([(2, 1), (1, 2)]));
        assert_eq!(bridge_carriers((0, 0), (3, 3)), None);
    }

    #[test]
    fn test_reachable_empty_cells() {
        let board = Board::setup(3, &[(1, 1, Red)], Red);
        // Six neighbours plus the bridge targets (0,0) and (2,2).
        assert_eq!(reachable_empty_cells(&board, Red), 8);
        assert_eq!(reachable_empty_cells(&board, Blue), 0);
    }
}
