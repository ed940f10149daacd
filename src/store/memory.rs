// src/store/memory.rs
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{placeholder_email, placeholder_name, Store, StoreError};
use crate::models::{
    Channel, Identifier, NewPoll, NewVote, Poll, PollOption, PollStatus, PollView, Role, User,
    VoteOutcome,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    polls: BTreeMap<i32, Poll>,
    options: BTreeMap<i32, PollOption>,
    votes: Vec<NewVote>,
    next_user_id: i32,
    next_poll_id: i32,
    next_option_id: i32,
}

impl Tables {
    fn user_by_identifier(&self, identifier: &Identifier) -> Option<&User> {
        self.users.values().find(|u| match identifier {
            Identifier::Email(email) => u.email.as_deref() == Some(email.as_str()),
            Identifier::Phone(phone) => u.phone.as_deref() == Some(phone.as_str()),
        })
    }

    fn view(&self, poll: &Poll) -> PollView {
        let (creator, creator_email) = self
            .users
            .get(&poll.created_by)
            .map(|u| (u.name.clone(), u.email.clone()))
            .unwrap_or_default();
        let options = self
            .options
            .values()
            .filter(|o| o.poll_id == poll.id)
            .cloned()
            .collect();
        PollView::new(poll.clone(), creator, creator_email, options)
    }

    fn bump_user_id(&mut self, id: i32) {
        self.next_user_id = self.next_user_id.max(id);
    }
}

/// In-process [`Store`] with the same uniqueness rules as the database schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn vote_count(&self) -> usize {
        self.lock().votes.len()
    }

    /// Inserts a user directly, e.g. to seed an owner account.
    pub fn insert_user(&self, email: &str, name: &str, role: Role) -> User {
        let mut tables = self.lock();
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            email: Some(email.to_string()),
            phone: None,
            name: name.to_string(),
            role,
            verification_code: None,
            code_expires_at: None,
            is_verified: true,
            email_verified: true,
            phone_verified: false,
            last_login: None,
        };
        tables.users.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_user_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.lock().user_by_identifier(identifier).cloned())
    }

    async fn upsert_verification_code(
        &self,
        identifier: &Identifier,
        default_name: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut tables = self.lock();
        let existing = tables.user_by_identifier(identifier).map(|u| u.id);
        let id = match existing {
            Some(id) => id,
            None => {
                tables.next_user_id += 1;
                let id = tables.next_user_id;
                let (email, phone) = match identifier {
                    Identifier::Email(v) => (Some(v.clone()), None),
                    Identifier::Phone(v) => (None, Some(v.clone())),
                };
                tables.users.insert(
                    id,
                    User {
                        id,
                        email,
                        phone,
                        name: default_name.to_string(),
                        role: Role::User,
                        verification_code: None,
                        code_expires_at: None,
                        is_verified: false,
                        email_verified: false,
                        phone_verified: false,
                        last_login: None,
                    },
                );
                id
            }
        };

        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        user.verification_code = Some(code.to_string());
        user.code_expires_at = Some(expires_at);
        Ok(user.clone())
    }

    async fn complete_verification(
        &self,
        user_id: i32,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut tables = self.lock();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        user.is_verified = true;
        match channel {
            Channel::Email => user.email_verified = true,
            Channel::Phone => user.phone_verified = true,
        }
        user.last_login = Some(now);
        user.verification_code = None;
        user.code_expires_at = None;
        Ok(user.clone())
    }

    async fn ensure_user(&self, user_id: i32) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.users.contains_key(&user_id) {
            return Ok(());
        }
        tables.bump_user_id(user_id);
        let email = placeholder_email(user_id);
        let email_taken = tables.users.values().any(|u| u.email.as_deref() == Some(email.as_str()));
        tables.users.insert(
            user_id,
            User {
                id: user_id,
                email: (!email_taken).then_some(email),
                phone: None,
                name: placeholder_name(user_id),
                role: Role::User,
                verification_code: None,
                code_expires_at: None,
                is_verified: false,
                email_verified: false,
                phone_verified: false,
                last_login: None,
            },
        );
        Ok(())
    }

    async fn create_poll(&self, new_poll: NewPoll) -> Result<PollView, StoreError> {
        let mut tables = self.lock();
        tables.next_poll_id += 1;
        let poll = Poll {
            id: tables.next_poll_id,
            title: new_poll.title,
            description: new_poll.description,
            created_by: new_poll.created_by,
            status: PollStatus::Active,
            created_at: Utc::now(),
        };
        for text in new_poll.options {
            tables.next_option_id += 1;
            let option = PollOption {
                id: tables.next_option_id,
                poll_id: poll.id,
                option_text: text,
                votes_count: 0,
            };
            tables.options.insert(option.id, option);
        }
        tables.polls.insert(poll.id, poll.clone());
        Ok(tables.view(&poll))
    }

    async fn set_poll_status(&self, poll_id: i32, status: PollStatus) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.polls.get_mut(&poll_id) {
            Some(poll) => {
                poll.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_poll(&self, poll_id: i32) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.votes.retain(|v| v.poll_id != poll_id);
        tables.options.retain(|_, o| o.poll_id != poll_id);
        Ok(tables.polls.remove(&poll_id).is_some())
    }

    async fn list_active_polls(&self) -> Result<Vec<PollView>, StoreError> {
        let tables = self.lock();
        let mut polls: Vec<&Poll> = tables
            .polls
            .values()
            .filter(|p| p.status == PollStatus::Active)
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(polls.into_iter().map(|p| tables.view(p)).collect())
    }

    async fn find_poll(&self, poll_id: i32) -> Result<Option<Poll>, StoreError> {
        Ok(self.lock().polls.get(&poll_id).cloned())
    }

    async fn find_option(&self, option_id: i32) -> Result<Option<PollOption>, StoreError> {
        Ok(self.lock().options.get(&option_id).cloned())
    }

    async fn cast_vote(&self, vote: NewVote) -> Result<VoteOutcome, StoreError> {
        let mut tables = self.lock();
        if tables
            .votes
            .iter()
            .any(|v| v.poll_id == vote.poll_id && v.user_id == vote.user_id)
        {
            return Ok(VoteOutcome::AlreadyVoted);
        }
        tables.votes.push(vote);
        if let Some(option) = tables
            .options
            .get_mut(&vote.option_id)
            .filter(|o| o.poll_id == vote.poll_id)
        {
            option.votes_count += 1;
        }
        Ok(VoteOutcome::Recorded)
    }
}
