//! Rated player identities.
//!
//! A [`Player`] is a name plus an Elo rating. Names are immutable after
//! creation; the rating lives behind its own lock and only changes
//! through [`Player::post_result`], which updates both participants of a
//! finished match as one atomic step.

use std::sync::{Mutex, MutexGuard};

/// Rating assigned to every newly created player.
pub const INITIAL_RATING: i32 = 1500;

/// Elo K-factor.
const K_FACTOR: f64 = 32.0;

/// Outcome of a finished match between two players, from the point of
/// view of the `(player1, player2)` argument order of
/// [`Player::post_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Draw,
    Player1Wins,
    Player2Wins,
}

impl MatchOutcome {
    /// The Elo scores `(S1, S2)` awarded by this outcome.
    fn scores(self) -> (f64, f64) {
        match self {
            MatchOutcome::Draw => (0.5, 0.5),
            MatchOutcome::Player1Wins => (1.0, 0.0),
            MatchOutcome::Player2Wins => (0.0, 1.0),
        }
    }
}

/// A named, rated identity. Lives for the whole process once created.
#[derive(Debug)]
pub struct Player {
    name: String,
    rating: Mutex<i32>,
}

impl Player {
    /// Create a player with the standard initial rating.
    pub fn new(name: impl Into<String>) -> Self {
        Player {
            name: name.into(),
            rating: Mutex::new(INITIAL_RATING),
        }
    }

    /// The player's username.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current rating.
    pub fn rating(&self) -> i32 {
        *self.rating.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_rating(&self) -> MutexGuard<'_, i32> {
        self.rating.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Post the result of a match, updating both ratings atomically with
    /// respect to any concurrent reader or other update.
    ///
    /// Uses the Elo rule with K = 32: each player's expected score is
    /// `E = 1 / (1 + 10^((R_other - R_self) / 400))` and the new rating is
    /// `round(R + K * (S - E))`, which preserves the rating sum to within
    /// rounding.
    pub fn post_result(player1: &Player, player2: &Player, outcome: MatchOutcome) {
        if std::ptr::eq(player1, player2) {
            return;
        }
        // Rating locks are ordered by name so concurrent updates of the
        // same pair cannot deadlock. Names are unique per registry.
        let (mut g1, mut g2) = if player1.name <= player2.name {
            let g1 = player1.lock_rating();
            let g2 = player2.lock_rating();
            (g1, g2)
        } else {
            let g2 = player2.lock_rating();
            let g1 = player1.lock_rating();
            (g1, g2)
        };

        let (s1, s2) = outcome.scores();
        let r1 = f64::from(*g1);
        let r2 = f64::from(*g2);
        let e1 = 1.0 / (1.0 + 10f64.powf((r2 - r1) / 400.0));
        let e2 = 1.0 / (1.0 + 10f64.powf((r1 - r2) / 400.0));
        *g1 = (r1 + K_FACTOR * (s1 - e1)).round() as i32;
        *g2 = (r2 + K_FACTOR * (s2 - e2)).round() as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_starts_at_initial_rating() {
        let p = Player::new("alice");
        assert_eq!(p.name(), "alice");
        assert_eq!(p.rating(), INITIAL_RATING);
    }

    #[test]
    fn even_match_win_moves_sixteen_points() {
        let alice = Player::new("alice");
        let bob = Player::new("bob");
        Player::post_result(&bob, &alice, MatchOutcome::Player1Wins);
        assert_eq!(bob.rating(), 1516);
        assert_eq!(alice.rating(), 1484);
    }

    #[test]
    fn draw_between_equals_changes_nothing() {
        let alice = Player::new("alice");
        let bob = Player::new("bob");
        Player::post_result(&alice, &bob, MatchOutcome::Draw);
        assert_eq!(alice.rating(), 1500);
        assert_eq!(bob.rating(), 1500);
    }

    #[test]
    fn favorite_gains_little_underdog_gains_much() {
        let strong = Player::new("strong");
        let weak = Player::new("weak");
        // Pull the ratings apart first.
        for _ in 0..10 {
            Player::post_result(&strong, &weak, MatchOutcome::Player1Wins);
        }
        let (rs, rw) = (strong.rating(), weak.rating());
        assert!(rs > 1600 && rw < 1400);

        // An upset now swings more than 16 points.
        Player::post_result(&strong, &weak, MatchOutcome::Player2Wins);
        assert!(weak.rating() - rw > 16);
    }

    #[test]
    fn rating_sum_is_preserved_within_rounding() {
        let a = Player::new("a");
        let b = Player::new("b");
        let outcomes = [
            MatchOutcome::Player1Wins,
            MatchOutcome::Player1Wins,
            MatchOutcome::Draw,
            MatchOutcome::Player2Wins,
            MatchOutcome::Player1Wins,
            MatchOutcome::Draw,
        ];
        for outcome in outcomes {
            let before = a.rating() + b.rating();
            Player::post_result(&a, &b, outcome);
            let after = a.rating() + b.rating();
            assert!((after - before).abs() <= 1);
        }
    }
}
