//! Duel rating update (logistic expectation, base 400).

use crate::store::RatingRecord;

pub const RATING_FLOOR: i32 = 100;
pub const PROVISIONAL_MATCHES: u32 = 30;
pub const HIGH_RATING: i32 = 2400;

/// Expected score of a player rated `rating` against `opponent`.
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
}

pub fn k_factor(record: &RatingRecord) -> u32 {
    if record.matches < PROVISIONAL_MATCHES {
        40
    } else if record.rating >= HIGH_RATING {
        16
    } else {
        24
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange {
    pub k: u32,
    pub delta: i32,
    pub winner_rating: i32,
    pub loser_rating: i32,
}

/// Computes new ratings for a concluded duel.
pub fn compute_rating_change(winner: &RatingRecord, loser: &RatingRecord) -> RatingChange {
    let k = ((k_factor(winner) + k_factor(loser)) as f64 / 2.0).round() as u32;
    let expected = expected_score(winner.rating, loser.rating);
    let delta = ((k as f64 * (1.0 - expected)).round() as i32).max(1);
    RatingChange {
        k,
        delta,
        winner_rating: (winner.rating + delta).max(RATING_FLOOR),
        loser_rating: (loser.rating - delta).max(RATING_FLOOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn record(rating: i32, matches: u32) -> RatingRecord {
        RatingRecord {
            user_id: "u".to_string(),
            rating,
            wins: 0,
            losses: 0,
            matches,
        }
    }

    #[test]
    fn test_equal_new_players() {
        let change = compute_rating_change(&record(1000, 0), &record(1000, 0));
        assert_eq!(change.k, 40);
        assert_eq!(change.delta, 20);
        assert_eq!(change.winner_rating, 1020);
        assert_eq!(change.loser_rating, 980);
    }

    #[test]
    fn test_expected_score_symmetry() {
        assert_approx_eq!(expected_score(1000, 1000), 0.5, 1e-12);
        let a = expected_score(1400, 1000);
        let b = expected_score(1000, 1400);
        assert_approx_eq!(a + b, 1.0, 1e-12);
        assert!(a > 0.9);
    }

    #[test]
    fn test_k_factor_tiers() {
        assert_eq!(k_factor(&record(2600, 5)), 40);
        assert_eq!(k_factor(&record(2400, 30)), 16);
        assert_eq!(k_factor(&record(1500, 30)), 24);
    }

    #[test]
    fn test_match_k_is_rounded_average() {
        // 40 and 24 average to 32; 40 and 16 to 28.
        assert_eq!(compute_rating_change(&record(1000, 0), &record(1000, 50)).k, 32);
        assert_eq!(compute_rating_change(&record(2500, 0), &record(2500, 50)).k, 28);
    }

    #[test]
    fn test_delta_never_below_one() {
        let change = compute_rating_change(&record(3000, 100), &record(800, 100));
        assert_eq!(change.delta, 1);
    }

    #[test]
    fn test_loser_floor() {
        let change = compute_rating_change(&record(110, 0), &record(105, 0));
        assert_eq!(change.loser_rating, RATING_FLOOR);
        assert!(change.winner_rating > 110);
    }
}
