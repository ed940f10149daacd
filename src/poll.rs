// src/poll.rs
use tracing::info;

use crate::auth::Caller;
use crate::error::AppError;
use crate::models::{
    CreatePollRequest, DeletePollRequest, NewPoll, NewVote, PollStatus, PollView,
    UpdateStatusRequest, VoteOutcome, VoteRequest,
};
use crate::store::Store;

/// Voter assumed when a vote request carries no `user_id`.
pub const DEFAULT_VOTER_ID: i32 = 1;

/// Serial ids start at 1, so a zero id is treated as absent.
fn present(id: Option<i32>) -> Option<i32> {
    id.filter(|id| *id != 0)
}

/// Trims the request and drops blank options.
pub fn validate_new_poll(caller: &Caller, req: CreatePollRequest) -> Result<NewPoll, AppError> {
    let title = req.title.as_deref().map(str::trim).unwrap_or_default();
    let options: Vec<String> = req
        .options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if title.is_empty() || options.len() < 2 {
        return Err(AppError::bad_request("Title and at least 2 options required"));
    }

    Ok(NewPoll {
        title: title.to_string(),
        description: req.description.as_deref().map(str::trim).unwrap_or_default().to_string(),
        created_by: caller.user_id,
        options,
    })
}

pub async fn create_poll(
    store: &dyn Store,
    caller: &Caller,
    req: CreatePollRequest,
) -> Result<PollView, AppError> {
    let new_poll = validate_new_poll(caller, req)?;
    if store.find_user(caller.user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }
    let poll = store.create_poll(new_poll).await?;
    info!(
        poll_id = poll.id,
        user_id = caller.user_id,
        options = poll.options.len(),
        "poll created"
    );
    Ok(poll)
}

pub async fn change_status(
    store: &dyn Store,
    caller: &Caller,
    req: UpdateStatusRequest,
) -> Result<(i32, PollStatus), AppError> {
    if !caller.is_owner() {
        return Err(AppError::Forbidden("Only owner can change poll status".into()));
    }
    let (Some(poll_id), Some(status)) = (present(req.poll_id), req.status.as_deref()) else {
        return Err(AppError::bad_request("poll_id and status required"));
    };
    let status: PollStatus = status
        .parse()
        .map_err(|_| AppError::bad_request("Invalid status. Use active or closed"))?;

    if !store.set_poll_status(poll_id, status).await? {
        return Err(AppError::NotFound("Poll not found".into()));
    }
    info!(poll_id, %status, user_id = caller.user_id, "poll status changed");
    Ok((poll_id, status))
}

pub async fn delete_poll(
    store: &dyn Store,
    caller: &Caller,
    req: DeletePollRequest,
) -> Result<i32, AppError> {
    if !caller.is_owner() {
        return Err(AppError::Forbidden("Only owner can delete polls".into()));
    }
    let poll_id =
        present(req.poll_id).ok_or_else(|| AppError::bad_request("poll_id required"))?;

    if !store.delete_poll(poll_id).await? {
        return Err(AppError::NotFound("Poll not found".into()));
    }
    info!(poll_id, user_id = caller.user_id, "poll deleted");
    Ok(poll_id)
}

pub async fn list_polls(store: &dyn Store) -> Result<Vec<PollView>, AppError> {
    Ok(store.list_active_polls().await?)
}

pub async fn cast_vote(store: &dyn Store, req: VoteRequest) -> Result<NewVote, AppError> {
    let (Some(poll_id), Some(option_id)) = (present(req.poll_id), present(req.option_id)) else {
        return Err(AppError::bad_request("poll_id and option_id are required"));
    };
    let user_id = req.user_id.unwrap_or(DEFAULT_VOTER_ID);

    let poll = store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Poll not found".into()))?;
    if poll.status != PollStatus::Active {
        return Err(AppError::bad_request("Poll is closed"));
    }
    match store.find_option(option_id).await? {
        Some(option) if option.poll_id == poll_id => {}
        _ => return Err(AppError::bad_request("Option does not belong to this poll")),
    }

    store.ensure_user(user_id).await?;

    let vote = NewVote { poll_id, option_id, user_id };
    match store.cast_vote(vote).await? {
        VoteOutcome::Recorded => {
            info!(poll_id, option_id, user_id, "vote recorded");
            Ok(vote)
        }
        VoteOutcome::AlreadyVoted => {
            Err(AppError::bad_request("User already voted in this poll"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::store::MemoryStore;

    fn caller(user_id: i32, role: &str) -> Caller {
        Caller { user_id, role: Some(role.to_string()) }
    }

    fn request(title: &str, options: &[&str]) -> CreatePollRequest {
        CreatePollRequest {
            title: Some(title.to_string()),
            description: Some("  about  ".to_string()),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    #[test]
    fn blank_options_do_not_count() {
        let err = validate_new_poll(&caller(1, "user"), request("Q", &["a", "  "])).unwrap_err();
        assert_eq!(err.to_string(), "Title and at least 2 options required");

        let req = request(" Q ", &[" a ", "", "b"]);
        let poll = validate_new_poll(&caller(1, "user"), req).unwrap();
        assert_eq!(poll.title, "Q");
        assert_eq!(poll.description, "about");
        assert_eq!(poll.options, vec!["a", "b"]);
    }

    #[test]
    fn title_is_required() {
        let err = validate_new_poll(&caller(1, "user"), request("   ", &["a", "b"])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn owner_can_close_and_others_cannot() {
        let store = MemoryStore::new();
        let user = store.insert_user("u@example.com", "U", Role::User);
        let poll = create_poll(&store, &caller(user.id, "user"), request("Q", &["a", "b"]))
            .await
            .unwrap();

        let req = || UpdateStatusRequest { poll_id: Some(poll.id), status: Some("closed".into()) };
        let err = change_status(&store, &caller(user.id, "user"), req()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let (_, status) = change_status(&store, &caller(user.id, "owner"), req()).await.unwrap();
        assert_eq!(status, PollStatus::Closed);
        assert!(list_polls(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_status_is_rejected() {
        let store = MemoryStore::new();
        let req = UpdateStatusRequest { poll_id: Some(1), status: Some("paused".into()) };
        let err = change_status(&store, &caller(1, "owner"), req).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid status. Use active or closed");
    }

    #[tokio::test]
    async fn vote_creates_placeholder_user_and_rejects_repeat() {
        let store = MemoryStore::new();
        let user = store.insert_user("u@example.com", "U", Role::User);
        let poll = create_poll(&store, &caller(user.id, "user"), request("Q", &["a", "b"]))
            .await
            .unwrap();
        let vote = || VoteRequest {
            poll_id: Some(poll.id),
            option_id: Some(poll.options[1].id),
            user_id: Some(99),
        };

        cast_vote(&store, vote()).await.unwrap();
        assert_eq!(store.find_user(99).await.unwrap().unwrap().name, "User 99");

        let err = cast_vote(&store, vote()).await.unwrap_err();
        assert_eq!(err.to_string(), "User already voted in this poll");

        let polls = list_polls(&store).await.unwrap();
        assert_eq!(polls[0].options[1].votes_count, 1);
        assert_eq!(polls[0].total_votes, 1);
    }

    #[tokio::test]
    async fn vote_checks_poll_and_option() {
        let store = MemoryStore::new();
        let user = store.insert_user("u@example.com", "U", Role::User);
        let c = caller(user.id, "owner");
        let first = create_poll(&store, &c, request("One", &["a", "b"])).await.unwrap();
        let second = create_poll(&store, &c, request("Two", &["c", "d"])).await.unwrap();

        let err = cast_vote(&store, VoteRequest { poll_id: Some(first.id), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "poll_id and option_id are required");

        let foreign = VoteRequest {
            poll_id: Some(first.id),
            option_id: Some(second.options[0].id),
            user_id: None,
        };
        let err = cast_vote(&store, foreign).await.unwrap_err();
        assert_eq!(err.to_string(), "Option does not belong to this poll");

        let err = cast_vote(
            &store,
            VoteRequest { poll_id: Some(404), option_id: Some(1), user_id: None },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        change_status(
            &store,
            &c,
            UpdateStatusRequest { poll_id: Some(second.id), status: Some("closed".into()) },
        )
        .await
        .unwrap();
        let closed = VoteRequest {
            poll_id: Some(second.id),
            option_id: Some(second.options[0].id),
            user_id: None,
        };
        let err = cast_vote(&store, closed).await.unwrap_err();
        assert_eq!(err.to_string(), "Poll is closed");
    }

    #[tokio::test]
    async fn delete_requires_owner_and_existing_poll() {
        let store = MemoryStore::new();
        let err = delete_poll(&store, &caller(1, "user"), DeletePollRequest { poll_id: Some(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = delete_poll(&store, &caller(1, "owner"), DeletePollRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "poll_id required");

        let err = delete_poll(&store, &caller(1, "owner"), DeletePollRequest { poll_id: Some(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn zero_ids_count_as_missing() {
        let store = MemoryStore::new();
        let owner = caller(1, "owner");

        let req = VoteRequest { poll_id: Some(0), option_id: Some(0), user_id: None };
        let err = cast_vote(&store, req).await.unwrap_err();
        assert_eq!(err.to_string(), "poll_id and option_id are required");

        let req = VoteRequest { poll_id: Some(1), option_id: Some(0), user_id: None };
        let err = cast_vote(&store, req).await.unwrap_err();
        assert_eq!(err.to_string(), "poll_id and option_id are required");

        let req = UpdateStatusRequest { poll_id: Some(0), status: Some("closed".into()) };
        let err = change_status(&store, &owner, req).await.unwrap_err();
        assert_eq!(err.to_string(), "poll_id and status required");

        let req = DeletePollRequest { poll_id: Some(0) };
        let err = delete_poll(&store, &owner, req).await.unwrap_err();
        assert_eq!(err.to_string(), "poll_id required");
    }
}
