// src/store/postgres.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::{placeholder_email, placeholder_name, Store, StoreError};
use crate::models::{
    Channel, Identifier, NewPoll, NewVote, Poll, PollOption, PollStatus, PollView, User,
    VoteOutcome,
};

const USER_COLUMNS: &str = "id, email, phone, name, role, verification_code, code_expires_at, \
     is_verified, email_verified, phone_verified, last_login";

const POLL_COLUMNS: &str = "id, title, description, created_by, status, created_at";

const OPTION_COLUMNS: &str = "id, poll_id, option_text, votes_count";

#[derive(sqlx::FromRow)]
struct PollRow {
    #[sqlx(flatten)]
    poll: Poll,
    creator_name: String,
    creator_email: Option<String>,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_user_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<User>, StoreError> {
        let column = identifier.channel().column();
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(identifier.value())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn upsert_verification_code(
        &self,
        identifier: &Identifier,
        default_name: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let column = identifier.channel().column();
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                ({column}, name, verification_code, code_expires_at, role, is_verified)
            VALUES ($1, $2, $3, $4, 'user', FALSE)
            ON CONFLICT ({column}) DO UPDATE
            SET verification_code = EXCLUDED.verification_code,
                code_expires_at = EXCLUDED.code_expires_at
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(identifier.value())
        .bind(default_name)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn complete_verification(
        &self,
        user_id: i32,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let verified_column = match channel {
            Channel::Email => "email_verified",
            Channel::Phone => "phone_verified",
        };
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_verified = TRUE, {verified_column} = TRUE, last_login = $2,
                verification_code = NULL, code_expires_at = NULL
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn ensure_user(&self, user_id: i32) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        // The placeholder address may already belong to a real user; the
        // placeholder then goes without an email.
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role)
            SELECT $1,
                   CASE WHEN EXISTS (SELECT 1 FROM users WHERE email = $2) THEN NULL ELSE $2 END,
                   $3,
                   'user'
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(placeholder_email(user_id))
        .bind(placeholder_name(user_id))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted > 0 {
            // Keep the serial ahead of explicitly inserted ids, never moving
            // it backwards past values handed out to uncommitted inserts.
            sqlx::query(
                r#"
                SELECT setval(
                    'users_id_seq',
                    GREATEST((SELECT MAX(id) FROM users), (SELECT last_value FROM users_id_seq))
                )
                "#,
            )
            .execute(&mut *tx)
            .await?;
            debug!(user_id, "created placeholder user");
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_poll(&self, new_poll: NewPoll) -> Result<PollView, StoreError> {
        let mut tx = self.pool.begin().await?;

        let poll = sqlx::query_as::<_, Poll>(&format!(
            r#"
            INSERT INTO polls (title, description, created_by, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING {POLL_COLUMNS}
            "#
        ))
        .bind(&new_poll.title)
        .bind(&new_poll.description)
        .bind(new_poll.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let mut options = Vec::with_capacity(new_poll.options.len());
        for text in &new_poll.options {
            let option = sqlx::query_as::<_, PollOption>(&format!(
                r#"
                INSERT INTO poll_options (poll_id, option_text, votes_count)
                VALUES ($1, $2, 0)
                RETURNING {OPTION_COLUMNS}
                "#
            ))
            .bind(poll.id)
            .bind(text)
            .fetch_one(&mut *tx)
            .await?;
            options.push(option);
        }

        let (creator, creator_email): (String, Option<String>) =
            sqlx::query_as("SELECT name, email FROM users WHERE id = $1")
                .bind(new_poll.created_by)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(PollView::new(poll, creator, creator_email, options))
    }

    async fn set_poll_status(&self, poll_id: i32, status: PollStatus) -> Result<bool, StoreError> {
        let updated = sqlx::query("UPDATE polls SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(poll_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn delete_poll(&self, poll_id: i32) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM votes WHERE poll_id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM poll_options WHERE poll_id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn list_active_polls(&self) -> Result<Vec<PollView>, StoreError> {
        let rows = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT p.id, p.title, p.description, p.created_by, p.status, p.created_at,
                   u.name AS creator_name, u.email AS creator_email
            FROM polls p
            JOIN users u ON p.created_by = u.id
            WHERE p.status = 'active'
            ORDER BY p.created_at DESC, p.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|r| r.poll.id).collect();
        let options = sqlx::query_as::<_, PollOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM poll_options WHERE poll_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_poll: HashMap<i32, Vec<PollOption>> = HashMap::new();
        for option in options {
            by_poll.entry(option.poll_id).or_default().push(option);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let options = by_poll.remove(&row.poll.id).unwrap_or_default();
                PollView::new(row.poll, row.creator_name, row.creator_email, options)
            })
            .collect())
    }

    async fn find_poll(&self, poll_id: i32) -> Result<Option<Poll>, StoreError> {
        let poll =
            sqlx::query_as::<_, Poll>(&format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1"))
                .bind(poll_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(poll)
    }

    async fn find_option(&self, option_id: i32) -> Result<Option<PollOption>, StoreError> {
        let option = sqlx::query_as::<_, PollOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM poll_options WHERE id = $1"
        ))
        .bind(option_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(option)
    }

    async fn cast_vote(&self, vote: NewVote) -> Result<VoteOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The unique (poll_id, user_id) constraint decides who wins a race.
        let inserted: Option<(i32,)> = sqlx::query_as(
            r#"
            INSERT INTO votes (poll_id, option_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (poll_id, user_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(vote.poll_id)
        .bind(vote.option_id)
        .bind(vote.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            return Ok(VoteOutcome::AlreadyVoted);
        }

        sqlx::query(
            "UPDATE poll_options SET votes_count = votes_count + 1 WHERE id = $1 AND poll_id = $2",
        )
            .bind(vote.option_id)
            .bind(vote.poll_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(VoteOutcome::Recorded)
    }
}
