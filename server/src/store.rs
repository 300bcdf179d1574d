//! Profile/rating store seam plus an in-memory implementation.

use crate::rating::compute_rating_change;
use arena_shared::EndReason;
use log::info;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_RATING: i32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRecord {
    pub user_id: String,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub matches: u32,
}

impl RatingRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            rating: DEFAULT_RATING,
            wins: 0,
            losses: 0,
            matches: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub winner: String,
    pub loser: String,
    pub reason: EndReason,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedResult {
    pub winner: RatingRecord,
    pub loser: RatingRecord,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("winner and loser are the same user: {0}")]
    SameUser(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait ProfileStore: Send + Sync {
    fn get_rating_profile(&self, user_id: &str) -> Result<RatingRecord, StoreError>;

    /// Applies the rating change for one duel and records the match as a
    /// single atomic step.
    fn commit_match_result(
        &self,
        winner_id: &str,
        loser_id: &str,
        reason: EndReason,
    ) -> Result<CommittedResult, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    profiles: HashMap<String, RatingRecord>,
    matches: Vec<MatchRecord>,
}

/// Process-local store; unknown users start at [`DEFAULT_RATING`].
#[derive(Default)]
pub struct InMemoryProfileStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, record: RatingRecord) {
        self.inner.lock().profiles.insert(record.user_id.clone(), record);
    }

    pub fn match_history(&self) -> Vec<MatchRecord> {
        self.inner.lock().matches.clone()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get_rating_profile(&self, user_id: &str) -> Result<RatingRecord, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| RatingRecord::new(user_id)))
    }

    fn commit_match_result(
        &self,
        winner_id: &str,
        loser_id: &str,
        reason: EndReason,
    ) -> Result<CommittedResult, StoreError> {
        if winner_id == loser_id {
            return Err(StoreError::SameUser(winner_id.to_string()));
        }

        // One lock for read-modify-write of both rows and the history.
        let mut inner = self.inner.lock();
        let mut winner = inner
            .profiles
            .get(winner_id)
            .cloned()
            .unwrap_or_else(|| RatingRecord::new(winner_id));
        let mut loser = inner
            .profiles
            .get(loser_id)
            .cloned()
            .unwrap_or_else(|| RatingRecord::new(loser_id));

        let change = compute_rating_change(&winner, &loser);
        winner.rating = change.winner_rating;
        winner.wins += 1;
        winner.matches += 1;
        loser.rating = change.loser_rating;
        loser.losses += 1;
        loser.matches += 1;

        inner.profiles.insert(winner_id.to_string(), winner.clone());
        inner.profiles.insert(loser_id.to_string(), loser.clone());
        inner.matches.push(MatchRecord {
            winner: winner_id.to_string(),
            loser: loser_id.to_string(),
            reason,
            delta: change.delta,
        });

        info!(
            "Committed {} result: {} -> {} (+{}), {} -> {}",
            reason.as_str(),
            winner_id,
            winner.rating,
            change.delta,
            loser_id,
            loser.rating
        );
        Ok(CommittedResult { winner, loser })
    }
}
