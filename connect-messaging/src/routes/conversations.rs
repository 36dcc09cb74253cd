use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use connect_shared::errors::{AppError, AppResult, ErrorCode};
use connect_shared::types::api::ApiResponse;
use connect_shared::types::auth::AuthUser;

use crate::models::{
    Conversation, ConversationParticipant, Message, NewConversationParticipant, UserProfile,
};
use crate::schema::{conversation_participants, conversations, messages, users};
use crate::AppState;

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct ParticipantProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub last_read_at: Option<chrono::DateTime<chrono::Utc>>,
    pub has_unread: bool,
    pub user: UserProfile,
}

impl From<(ConversationParticipant, UserProfile)> for ParticipantProfile {
    fn from((participant, user): (ConversationParticipant, UserProfile)) -> Self {
        Self {
            id: participant.id,
            user_id: participant.user_id,
            last_read_at: participant.last_read_at,
            has_unread: participant.has_unread,
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantProfile>,
}

#[derive(Debug, Serialize)]
pub struct ConversationPreview {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantProfile>,
    pub last_message: Option<Message>,
    /// The requester's own unread flag for this conversation.
    pub has_unread: bool,
}

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
}

// --- Helpers ---

/// Set-containment match: a conversation qualifies when every one of its
/// participants belongs to {principal} ∪ targets, the principal is a
/// participant, and at least one target is a participant. This is not strict
/// set equality: a conversation whose participant set is a subset of the
/// query can match.
fn conversation_matches(member_ids: &[Uuid], principal: Uuid, targets: &[Uuid]) -> bool {
    let allowed: HashSet<Uuid> = std::iter::once(principal)
        .chain(targets.iter().copied())
        .collect();

    member_ids.iter().all(|id| allowed.contains(id))
        && member_ids.contains(&principal)
        && targets.iter().any(|t| member_ids.contains(t))
}

/// Load a conversation's participant rows with their user profiles embedded.
fn load_participants(
    conn: &mut diesel::pg::PgConnection,
    conversation_id: Uuid,
) -> AppResult<Vec<ParticipantProfile>> {
    let rows: Vec<(ConversationParticipant, UserProfile)> = conversation_participants::table
        .inner_join(users::table)
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .select((
            conversation_participants::all_columns,
            UserProfile::columns(),
        ))
        .load::<(ConversationParticipant, UserProfile)>(conn)?;

    Ok(rows.into_iter().map(ParticipantProfile::from).collect())
}

// --- Handlers ---

/// GET /conversations - list the principal's conversations, newest activity
/// first, with participants and the last message embedded.
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<ConversationPreview>>>> {
    let mut conn = state.db.get()?;
    let user_id = auth_user.id;

    let memberships: Vec<ConversationParticipant> = conversation_participants::table
        .filter(conversation_participants::user_id.eq(user_id))
        .load::<ConversationParticipant>(&mut conn)?;

    if memberships.is_empty() {
        return Ok(Json(ApiResponse::ok(vec![])));
    }

    let conv_ids: Vec<Uuid> = memberships.iter().map(|m| m.conversation_id).collect();

    let convs: Vec<Conversation> = conversations::table
        .filter(conversations::id.eq_any(&conv_ids))
        .order(conversations::updated_at.desc())
        .load::<Conversation>(&mut conn)?;

    let mut previews = Vec::with_capacity(convs.len());
    for conv in convs {
        let participants = load_participants(&mut conn, conv.id)?;

        let last_message: Option<Message> = messages::table
            .filter(messages::conversation_id.eq(conv.id))
            .order(messages::created_at.desc())
            .first::<Message>(&mut conn)
            .optional()?;

        let has_unread = memberships
            .iter()
            .find(|m| m.conversation_id == conv.id)
            .map(|m| m.has_unread)
            .unwrap_or(false);

        previews.push(ConversationPreview {
            conversation: conv,
            participants,
            last_message,
            has_unread,
        });
    }

    Ok(Json(ApiResponse::ok(previews)))
}

/// POST /conversations - return the existing conversation for this participant
/// set, or create a new one. 200 on a hit, 201 on creation.
pub async fn find_or_create_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ConversationDetail>>)> {
    if req.participant_ids.is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "Au moins un participant est requis",
        ));
    }

    let mut conn = state.db.get()?;
    let principal = auth_user.id;

    // Deduplicate targets; the principal is always a participant and never
    // counted among the targets.
    let targets: Vec<Uuid> = {
        let mut seen = HashSet::new();
        req.participant_ids
            .iter()
            .copied()
            .filter(|id| *id != principal && seen.insert(*id))
            .collect()
    };

    if targets.is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "Au moins un participant est requis",
        ));
    }

    // Check whether a conversation already exists for this participant set.
    // No lock is held between this check and the insert below, so two
    // concurrent first calls can each create a conversation.
    let candidate_ids: Vec<Uuid> = conversation_participants::table
        .filter(conversation_participants::user_id.eq(principal))
        .select(conversation_participants::conversation_id)
        .load::<Uuid>(&mut conn)?;

    for conv_id in &candidate_ids {
        let member_ids: Vec<Uuid> = conversation_participants::table
            .filter(conversation_participants::conversation_id.eq(conv_id))
            .select(conversation_participants::user_id)
            .load::<Uuid>(&mut conn)?;

        if conversation_matches(&member_ids, principal, &targets) {
            let conversation: Conversation = conversations::table
                .find(conv_id)
                .first::<Conversation>(&mut conn)?;
            let participants = load_participants(&mut conn, *conv_id)?;

            tracing::debug!(
                conversation_id = %conv_id,
                principal = %principal,
                "existing conversation matched"
            );

            return Ok((
                StatusCode::OK,
                Json(ApiResponse::ok(ConversationDetail {
                    conversation,
                    participants,
                })),
            ));
        }
    }

    // No match: create the conversation and its participant rows atomically.
    let conversation = conn.transaction::<Conversation, AppError, _>(|conn| {
        let conversation: Conversation = diesel::insert_into(conversations::table)
            .default_values()
            .get_result(conn)?;

        let new_participants: Vec<NewConversationParticipant> = std::iter::once(principal)
            .chain(targets.iter().copied())
            .map(|user_id| NewConversationParticipant {
                conversation_id: conversation.id,
                user_id,
            })
            .collect();

        diesel::insert_into(conversation_participants::table)
            .values(&new_participants)
            .execute(conn)?;

        Ok(conversation)
    })?;

    let participants = load_participants(&mut conn, conversation.id)?;

    tracing::info!(
        conversation_id = %conversation.id,
        principal = %principal,
        participant_count = participants.len(),
        "conversation created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ConversationDetail {
            conversation,
            participants,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn exact_participant_set_matches() {
        let users = ids(3);
        let members = vec![users[0], users[1], users[2]];
        assert!(conversation_matches(&members, users[0], &[users[1], users[2]]));
        // Target order is irrelevant.
        assert!(conversation_matches(&members, users[0], &[users[2], users[1]]));
    }

    #[test]
    fn conversation_without_principal_does_not_match() {
        let users = ids(3);
        let members = vec![users[1], users[2]];
        assert!(!conversation_matches(&members, users[0], &[users[1], users[2]]));
    }

    #[test]
    fn conversation_without_any_target_does_not_match() {
        let users = ids(3);
        let members = vec![users[0]];
        assert!(!conversation_matches(&members, users[0], &[users[1], users[2]]));
    }

    #[test]
    fn conversation_with_outside_member_does_not_match() {
        let users = ids(4);
        let members = vec![users[0], users[1], users[3]];
        assert!(!conversation_matches(&members, users[0], &[users[1], users[2]]));
    }

    #[test]
    fn subset_conversation_matches_superset_query() {
        // Containment, not equality: the 2-party thread {P, A} answers a
        // query for {P, A, B}.
        let users = ids(3);
        let members = vec![users[0], users[1]];
        assert!(conversation_matches(&members, users[0], &[users[1], users[2]]));
    }
}
