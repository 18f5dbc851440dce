//! Player roles (First / Second) for a match.

/// One of the two seats in a match.
///
/// The first player marks `X` and moves first; the second player marks `O`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    First,
    Second,
}

impl Role {
    /// The other seat.
    pub fn opponent(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }

    /// The board piece drawn by this role (`'X'` / `'O'`).
    pub fn piece(self) -> char {
        match self {
            Role::First => 'X',
            Role::Second => 'O',
        }
    }

    /// Interpret a piece character (either case) as a role.
    pub fn from_piece(c: char) -> Option<Role> {
        match c {
            'X' | 'x' => Some(Role::First),
            'O' | 'o' => Some(Role::Second),
            _ => None,
        }
    }

    /// Wire code for this role (`1` = first, `2` = second).
    pub fn code(self) -> u8 {
        match self {
            Role::First => 1,
            Role::Second => 2,
        }
    }

    /// Decode a wire role code; `0` and anything unknown is `None`.
    pub fn from_code(v: u8) -> Option<Role> {
        match v {
            1 => Some(Role::First),
            2 => Some(Role::Second),
            _ => None,
        }
    }
}

/// Wire code for an optional role; `None` encodes as `0`.
pub fn role_code(role: Option<Role>) -> u8 {
    role.map(Role::code).unwrap_or(0)
}
