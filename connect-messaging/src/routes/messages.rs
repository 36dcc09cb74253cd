use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use connect_shared::errors::{AppError, AppResult, ErrorCode};
use connect_shared::types::api::ApiResponse;
use connect_shared::types::auth::AuthUser;

use crate::events::publisher;
use crate::models::{Message, NewMessage, UserProfile};
use crate::schema::{conversation_participants, conversations, messages, users};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
    /// Epoch milliseconds of the oldest message already seen.
    pub cursor: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: Option<String>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct MessageWithSender {
    #[serde(flatten)]
    pub message: Message,
    pub sender: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageWithSender>,
    pub next_cursor: Option<i64>,
}

// --- Helpers ---

/// Returns the raw content if it is non-empty once trimmed.
fn validate_content(content: Option<&str>) -> Option<&str> {
    let raw = content?;
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Floor an instant to the millisecond grid. The pagination cursor is an
/// epoch-millis integer, so every message timestamp is pinned to this grid at
/// insert time; a finer-grained stored value would fall between cursors and
/// vanish at page boundaries.
fn millis_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t.timestamp_millis()).single().unwrap_or(t)
}

/// Keyset pagination: `rows` holds up to `limit + 1` entries, newest first.
/// When the extra row is present it is popped and its creation time (epoch
/// milliseconds) becomes the next cursor; the page is then reversed to
/// chronological order.
fn page_with_cursor<T>(
    rows: &mut Vec<T>,
    limit: i64,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Option<i64> {
    let next_cursor = if rows.len() as i64 > limit {
        rows.pop().map(|row| created_at(&row).timestamp_millis())
    } else {
        None
    };
    rows.reverse();
    next_cursor
}

/// Turn a participant-row count into the 403 used for outsiders.
fn ensure_participant(membership_rows: i64) -> AppResult<()> {
    if membership_rows == 0 {
        return Err(AppError::new(
            ErrorCode::NotConversationParticipant,
            "Vous ne participez pas à cette conversation",
        ));
    }
    Ok(())
}

/// Verify the user is a participant of the given conversation.
fn verify_participation(
    conn: &mut diesel::pg::PgConnection,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    let membership_rows: i64 = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .filter(conversation_participants::user_id.eq(user_id))
        .select(count_star())
        .first::<i64>(conn)?;

    ensure_participant(membership_rows)
}

// --- Handlers ---

/// GET /conversations/:id/messages - cursor-paginated message fetch.
///
/// Fetching doubles as the read receipt: every unread message authored by
/// someone else in the conversation is marked read, and the requester's
/// participant row gets its last_read_at/has_unread state refreshed. The
/// receipt covers the whole conversation, not just the returned page.
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<MessagesQuery>,
) -> AppResult<Json<ApiResponse<MessagePage>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 100);

    let cursor_time: Option<DateTime<Utc>> = match params.cursor {
        Some(ms) => Some(Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
            AppError::new(ErrorCode::ValidationError, "Curseur invalide")
        })?),
        None => None,
    };

    let mut conn = state.db.get()?;
    let user_id = auth_user.id;

    let mut rows = conn.transaction::<Vec<(Message, UserProfile)>, AppError, _>(|conn| {
        let mut query = messages::table
            .inner_join(users::table)
            .filter(messages::conversation_id.eq(conversation_id))
            .select((messages::all_columns, UserProfile::columns()))
            .into_boxed();

        // Inclusive bound: the cursor is the creation time of the row that
        // was popped off the previous page, so it must appear on this one.
        // Exact because stored timestamps sit on the millisecond grid (see
        // millis_floor in the insert path).
        if let Some(cursor) = cursor_time {
            query = query.filter(messages::created_at.le(cursor));
        }

        let rows: Vec<(Message, UserProfile)> = query
            .order(messages::created_at.desc())
            .limit(limit + 1)
            .load::<(Message, UserProfile)>(conn)?;

        let now = Utc::now();

        diesel::update(
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::sender_id.ne(user_id))
                .filter(messages::read.eq(false)),
        )
        .set((messages::read.eq(true), messages::read_at.eq(now)))
        .execute(conn)?;

        diesel::update(
            conversation_participants::table
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.eq(user_id)),
        )
        .set((
            conversation_participants::last_read_at.eq(now),
            conversation_participants::has_unread.eq(false),
        ))
        .execute(conn)?;

        Ok(rows)
    })?;

    let next_cursor = page_with_cursor(&mut rows, limit, |(m, _)| m.created_at);

    let page = MessagePage {
        messages: rows
            .into_iter()
            .map(|(message, sender)| MessageWithSender { message, sender })
            .collect(),
        next_cursor,
    };

    Ok(Json(ApiResponse::ok(page)))
}

/// POST /conversations/:id/messages - append a message.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MessageWithSender>>)> {
    let content = validate_content(req.content.as_deref()).ok_or_else(|| {
        AppError::new(ErrorCode::ValidationError, "Le contenu du message est requis")
    })?;

    let mut conn = state.db.get()?;
    let sender_id = auth_user.id;

    let (message, recipient_ids) =
        conn.transaction::<(Message, Vec<Uuid>), AppError, _>(|conn| {
            verify_participation(conn, conversation_id, sender_id)?;

            let new_message = NewMessage {
                conversation_id,
                sender_id,
                content: content.to_string(),
                created_at: millis_floor(Utc::now()),
            };

            let message: Message = diesel::insert_into(messages::table)
                .values(&new_message)
                .get_result(conn)?;

            diesel::update(conversations::table.find(conversation_id))
                .set(conversations::updated_at.eq(Utc::now()))
                .execute(conn)?;

            let recipient_ids: Vec<Uuid> = conversation_participants::table
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.ne(sender_id))
                .select(conversation_participants::user_id)
                .load::<Uuid>(conn)?;

            diesel::update(
                conversation_participants::table
                    .filter(conversation_participants::conversation_id.eq(conversation_id))
                    .filter(conversation_participants::user_id.ne(sender_id)),
            )
            .set(conversation_participants::has_unread.eq(true))
            .execute(conn)?;

            Ok((message, recipient_ids))
        })?;

    let content_preview: String = message.content.chars().take(100).collect();

    publisher::publish_message_sent(
        &state.rabbitmq,
        message.id,
        conversation_id,
        sender_id,
        auth_user.display_name(),
        &recipient_ids,
        &content_preview,
    )
    .await;

    tracing::info!(
        sender = %sender_id,
        conversation = %conversation_id,
        message_id = %message.id,
        "message sent"
    );

    let sender = UserProfile {
        id: auth_user.id,
        name: auth_user.name,
        email: auth_user.email,
        image: auth_user.image,
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(MessageWithSender { message, sender })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_at(created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            content: format!("m{}", created_at.timestamp_millis()),
            read: false,
            read_at: None,
            created_at,
        }
    }

    fn msg(ms: i64) -> Message {
        msg_at(Utc.timestamp_millis_opt(ms).single().unwrap())
    }

    /// Replays the handler's query against an in-memory slice: newest first,
    /// bounded by the cursor, `limit + 1` rows. The bound compares the
    /// full-precision stored instant against the instant reconstructed from
    /// the epoch-millis cursor, exactly as the SQL predicate does.
    fn fetch(all: &[Message], limit: i64, cursor: Option<i64>) -> Vec<Message> {
        let cursor_time = cursor.map(|c| Utc.timestamp_millis_opt(c).single().unwrap());
        let mut rows: Vec<Message> = all
            .iter()
            .filter(|m| match cursor_time {
                Some(c) => m.created_at <= c,
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate((limit + 1) as usize);
        rows
    }

    /// Full pagination walk, collecting every returned timestamp in
    /// chronological order.
    fn walk(all: &[Message], limit: i64) -> Vec<i64> {
        let mut collected: Vec<i64> = Vec::new();
        let mut cursor: Option<i64> = None;
        loop {
            let mut rows = fetch(all, limit, cursor);
            let next = page_with_cursor(&mut rows, limit, |m| m.created_at);
            // Each page is chronological; pages themselves walk backwards,
            // so each new page is prepended.
            let mut times: Vec<i64> =
                rows.iter().map(|m| m.created_at.timestamp_millis()).collect();
            times.extend(collected);
            collected = times;
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        collected
    }

    #[test]
    fn content_must_be_non_empty_after_trim() {
        assert!(validate_content(None).is_none());
        assert!(validate_content(Some("")).is_none());
        assert!(validate_content(Some("   \n\t")).is_none());
        assert_eq!(validate_content(Some(" hello ")), Some(" hello "));
    }

    #[test]
    fn first_page_pops_extra_row_into_cursor() {
        let all = vec![msg(100), msg(200), msg(300)];
        let mut rows = fetch(&all, 2, None);
        let next_cursor = page_with_cursor(&mut rows, 2, |m| m.created_at);

        assert_eq!(next_cursor, Some(100));
        let times: Vec<i64> = rows.iter().map(|m| m.created_at.timestamp_millis()).collect();
        assert_eq!(times, vec![200, 300]);
    }

    #[test]
    fn second_page_returns_boundary_row_then_exhausts() {
        let all = vec![msg(100), msg(200), msg(300)];
        let mut rows = fetch(&all, 2, Some(100));
        let next_cursor = page_with_cursor(&mut rows, 2, |m| m.created_at);

        assert_eq!(next_cursor, None);
        let times: Vec<i64> = rows.iter().map(|m| m.created_at.timestamp_millis()).collect();
        assert_eq!(times, vec![100]);
    }

    #[test]
    fn exact_fit_page_has_no_cursor() {
        let all = vec![msg(100), msg(200)];
        let mut rows = fetch(&all, 2, None);
        let next_cursor = page_with_cursor(&mut rows, 2, |m| m.created_at);

        assert_eq!(next_cursor, None);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn paging_to_exhaustion_yields_every_message_in_order() {
        let all: Vec<Message> = (1..=23).map(|i| msg(i * 10)).collect();
        let expected: Vec<i64> = (1..=23).map(|i| i * 10).collect();
        assert_eq!(walk(&all, 5), expected);
    }

    #[test]
    fn insert_timestamps_land_on_the_cursor_grid() {
        let raw = Utc.timestamp_millis_opt(100).single().unwrap()
            + chrono::Duration::microseconds(500);
        let floored = millis_floor(raw);

        assert_eq!(floored, Utc.timestamp_millis_opt(100).single().unwrap());
        assert_eq!(floored.timestamp_millis(), 100);
    }

    #[test]
    fn pagination_survives_sub_millisecond_clock_readings() {
        // The wall clock hands out microsecond instants; the insert path
        // floors them. A raw t=100.5ms stored as-is would satisfy neither
        // `<= 100` nor appear on any later page.
        let all: Vec<Message> = (1..=7)
            .map(|i| {
                let raw = Utc.timestamp_millis_opt(i * 100).single().unwrap()
                    + chrono::Duration::microseconds(500);
                msg_at(millis_floor(raw))
            })
            .collect();

        let expected: Vec<i64> = (1..=7).map(|i| i * 100).collect();
        assert_eq!(walk(&all, 2), expected);
    }

    #[test]
    fn outsider_send_is_rejected_before_any_write() {
        let err = ensure_participant(0).unwrap_err();
        match err {
            AppError::Known { code, .. } => {
                assert_eq!(code, ErrorCode::NotConversationParticipant);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(ensure_participant(1).is_ok());
    }

    #[test]
    fn empty_conversation_paginates_to_nothing() {
        let mut rows = fetch(&[], 50, None);
        let next_cursor = page_with_cursor(&mut rows, 50, |m| m.created_at);
        assert!(rows.is_empty());
        assert_eq!(next_cursor, None);
    }
}
