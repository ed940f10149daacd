// src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Owner => "owner",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "owner" => Ok(Role::Owner),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Closed,
}

impl PollStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PollStatus::Active),
            "closed" => Ok(PollStatus::Closed),
            other => Err(ParseEnumError {
                kind: "poll status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for PollStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Channel a verification code was requested through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    /// Column on `users` holding the identifier for this channel.
    pub fn column(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }
}

/// A normalized email address or phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Phone(String),
}

impl Identifier {
    pub fn channel(&self) -> Channel {
        match self {
            Identifier::Email(_) => Channel::Email,
            Identifier::Phone(_) => Channel::Phone,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Email(v) | Identifier::Phone(v) => v,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub verification_code: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
}

/// Public view of a user returned after login.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            phone: user.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Poll {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub created_by: i32,
    #[sqlx(try_from = "String")]
    pub status: PollStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: i32,
    #[serde(skip_serializing)]
    pub poll_id: i32,
    pub option_text: String,
    pub votes_count: i32,
}

/// A poll as shown to voters: creator, options and tallies.
#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub status: PollStatus,
    pub creator: String,
    pub creator_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOption>,
    #[serde(rename = "totalVotes")]
    pub total_votes: i64,
}

impl PollView {
    pub fn new(
        poll: Poll,
        creator: String,
        creator_email: Option<String>,
        options: Vec<PollOption>,
    ) -> Self {
        let total_votes = options.iter().map(|o| i64::from(o.votes_count)).sum();
        Self {
            id: poll.id,
            title: poll.title,
            description: poll.description,
            status: poll.status,
            creator,
            creator_email,
            created_at: poll.created_at,
            options,
            total_votes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub created_by: i32,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewVote {
    pub poll_id: i32,
    pub option_id: i32,
    pub user_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    AlreadyVoted,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthRequest {
    pub action: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreatePollRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub options: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateStatusRequest {
    pub poll_id: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeletePollRequest {
    pub poll_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VoteRequest {
    pub poll_id: Option<i32>,
    pub option_id: Option<i32>,
    pub user_id: Option<i32>,
}
