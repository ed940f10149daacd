//! Persistence seam shared by every handler.
//!
//! `PgStore` is the production implementation. `MemoryStore` keeps the same
//! invariants in process and backs the router tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Channel, Identifier, NewPoll, NewVote, Poll, PollOption, PollStatus, PollView, User,
    VoteOutcome,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, user_id: i32) -> Result<Option<User>, StoreError>;

    async fn find_user_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<User>, StoreError>;

    /// Stores a fresh code for the identifier, creating an unverified user
    /// named `default_name` when none exists. Existing users keep their name.
    async fn upsert_verification_code(
        &self,
        identifier: &Identifier,
        default_name: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Marks the user verified on `channel`, records the login and consumes
    /// the pending code.
    async fn complete_verification(
        &self,
        user_id: i32,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Creates a placeholder user with this id if none exists.
    async fn ensure_user(&self, user_id: i32) -> Result<(), StoreError>;

    /// Inserts the poll and all its options atomically.
    async fn create_poll(&self, poll: NewPoll) -> Result<PollView, StoreError>;

    /// Returns `false` when no poll has this id.
    async fn set_poll_status(&self, poll_id: i32, status: PollStatus) -> Result<bool, StoreError>;

    /// Removes the poll with its votes and options. Returns `false` when no
    /// poll has this id.
    async fn delete_poll(&self, poll_id: i32) -> Result<bool, StoreError>;

    /// Active polls, newest first.
    async fn list_active_polls(&self) -> Result<Vec<PollView>, StoreError>;

    async fn find_poll(&self, poll_id: i32) -> Result<Option<Poll>, StoreError>;

    async fn find_option(&self, option_id: i32) -> Result<Option<PollOption>, StoreError>;

    /// Records the vote and bumps the option counter in one step, or reports
    /// that the user already voted in this poll.
    async fn cast_vote(&self, vote: NewVote) -> Result<VoteOutcome, StoreError>;
}

pub(crate) fn placeholder_email(user_id: i32) -> String {
    format!("user{user_id}@example.com")
}

pub(crate) fn placeholder_name(user_id: i32) -> String {
    format!("User {user_id}")
}
