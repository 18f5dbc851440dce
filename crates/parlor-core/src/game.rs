//! 3×3 board state machine.
//!
//! A [`Game`] holds the nine cells, whose turn it is, and the terminal
//! state (over / winner). Moves arrive as short ASCII strings
//! (`"5"`, `"5X"`, `"5->X"`, ...), are parsed into [`Move`]s in the
//! context of the role making them, and are applied under the rules:
//! the cell must be free, the game must not be over, and the piece must
//! belong to the role currently on the move.
//!
//! The board renders as five lines, `X|O| ` rows separated by `-----`
//! rules, which is what clients are shown after each move.

use std::fmt;

use crate::role::Role;

/// All eight winning lines, as cell indices.
const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Errors arising from interpreting or applying a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    /// The move text could not be interpreted, or the piece named in it
    /// does not belong to the player making the move.
    InvalidMove,
    /// The move is well-formed but not legal in the current game state
    /// (game over, cell occupied, or not this piece's turn).
    IllegalMove,
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidMove => write!(f, "move could not be parsed"),
            GameError::IllegalMove => write!(f, "move is not legal in the current state"),
        }
    }
}

impl std::error::Error for GameError {}

/// A parsed move: which cell (1..=9, left-to-right, top-to-bottom) and
/// which role is placing its piece there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    cell: usize,
    role: Role,
}

impl Move {
    /// The 1-based cell number (1 = top-left, 9 = bottom-right).
    pub fn cell(self) -> usize {
        self.cell
    }

    /// The role placing the piece.
    pub fn role(self) -> Role {
        self.role
    }
}

/// The state of one 3×3 game.
#[derive(Debug)]
pub struct Game {
    cells: [Option<Role>; 9],
    turn: Role,
    over: bool,
    winner: Option<Role>,
}

impl Default for Game {
    fn default() -> Self {
        Game::new()
    }
}

impl Game {
    /// An empty board with the first player to move.
    pub fn new() -> Self {
        Game {
            cells: [None; 9],
            turn: Role::First,
            over: false,
            winner: None,
        }
    }

    /// Whether the game has terminated. Monotonic: once true it stays true
    /// and the board no longer changes.
    pub fn is_over(&self) -> bool {
        self.over
    }

    /// The winning role, if the game is over and was not drawn.
    pub fn winner(&self) -> Option<Role> {
        self.winner
    }

    /// The role currently on the move.
    pub fn turn(&self) -> Role {
        self.turn
    }

    /// Interpret `text` as a move made by `role`.
    ///
    /// Accepted forms: a single cell digit (`"5"`), in which case the
    /// piece is the mover's own, or a cell digit followed by any
    /// separator and a piece character (`"5X"`, `"5->x"`). A piece that
    /// does not belong to `role` is rejected.
    pub fn parse_move(role: Role, text: &str) -> Result<Move, GameError> {
        let trimmed = text.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');
        let mut chars = trimmed.chars();
        let cell = match chars.next().and_then(|c| c.to_digit(10)) {
            Some(d @ 1..=9) => d as usize,
            _ => return Err(GameError::InvalidMove),
        };
        let piece = chars.find_map(Role::from_piece);
        match piece {
            Some(p) if p != role => Err(GameError::InvalidMove),
            _ => Ok(Move { cell, role }),
        }
    }

    /// Render a move in a form that [`Game::parse_move`] accepts,
    /// e.g. `"5->X"`.
    pub fn unparse_move(mv: Move) -> String {
        format!("{}->{}", mv.cell, mv.role.piece())
    }

    /// Apply a parsed move, flipping the turn and detecting a win or draw.
    pub fn apply_move(&mut self, mv: Move) -> Result<(), GameError> {
        let idx = mv.cell - 1;
        if self.over || self.cells[idx].is_some() || mv.role != self.turn {
            return Err(GameError::IllegalMove);
        }
        self.cells[idx] = Some(mv.role);
        self.turn = self.turn.opponent();

        for line in WIN_LINES {
            if let Some(role) = self.cells[line[0]] {
                if self.cells[line[1]] == Some(role) && self.cells[line[2]] == Some(role) {
                    self.over = true;
                    self.winner = Some(role);
                    return Ok(());
                }
            }
        }
        if self.cells.iter().all(Option::is_some) {
            self.over = true;
            self.winner = None;
        }
        Ok(())
    }

    /// Record that `role` has resigned, awarding the win to the opponent.
    /// Fails if the game has already terminated.
    pub fn resign(&mut self, role: Role) -> Result<(), GameError> {
        if self.over {
            return Err(GameError::IllegalMove);
        }
        self.over = true;
        self.winner = Some(role.opponent());
        Ok(())
    }

    /// Render the board as five lines: `c|c|c` rows separated by `-----`
    /// rules, empty cells as spaces, no trailing newline.
    pub fn unparse_state(&self) -> String {
        let mut out = String::with_capacity(29);
        for (row, cells) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                out.push_str("\n-----\n");
            }
            for (col, cell) in cells.iter().enumerate() {
                if col > 0 {
                    out.push('|');
                }
                out.push(cell.map(Role::piece).unwrap_or(' '));
            }
        }
        out
    }
}
