use diesel::prelude::*;
use uuid::Uuid;

use connect_shared::clients::db::DbPool;
use connect_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewNotification, Notification};
use crate::schema::notifications;

/// Listing is capped to the most recent notifications per user.
pub const LIST_LIMIT: i64 = 50;

/// Create a notification row.
pub fn create_notification(
    pool: &DbPool,
    user_id: Uuid,
    notification_type: &str,
    title: &str,
    message: &str,
) -> AppResult<Notification> {
    let mut conn = pool.get()?;

    let new_notification = NewNotification {
        user_id,
        notification_type: notification_type.to_string(),
        title: title.to_string(),
        message: message.to_string(),
    };

    let notification = diesel::insert_into(notifications::table)
        .values(&new_notification)
        .get_result::<Notification>(&mut conn)?;

    tracing::debug!(
        notification_id = %notification.id,
        user_id = %user_id,
        notification_type = %notification_type,
        "notification created"
    );

    Ok(notification)
}

/// Fire-and-forget create: the failure is logged and swallowed so the action
/// that triggered the notification is never blocked by it.
pub fn notify(pool: &DbPool, user_id: Uuid, notification_type: &str, title: &str, message: &str) {
    if let Err(e) = create_notification(pool, user_id, notification_type, title, message) {
        tracing::error!(
            error = %e,
            user_id = %user_id,
            notification_type = %notification_type,
            "failed to create notification"
        );
    }
}

/// List the 50 most recent notifications for a user, newest first.
pub fn list_notifications(pool: &DbPool, user_id: Uuid) -> AppResult<Vec<Notification>> {
    let mut conn = pool.get()?;

    let items = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .limit(LIST_LIMIT)
        .load::<Notification>(&mut conn)?;

    Ok(items)
}

/// The UPDATE predicate filters on ownership, so a notification owned by
/// someone else hits the same NotFound as a missing one; the response must
/// not tell the two apart.
fn missing_notification(e: diesel::result::Error) -> AppError {
    match e {
        diesel::result::Error::NotFound => {
            AppError::new(ErrorCode::NotificationNotFound, "Notification introuvable")
        }
        other => AppError::Database(other),
    }
}

/// Set the read state of a notification, only if it belongs to the user.
pub fn set_read(
    pool: &DbPool,
    notification_id: Uuid,
    user_id: Uuid,
    read: bool,
) -> AppResult<Notification> {
    let mut conn = pool.get()?;

    let notification = diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .set(notifications::read.eq(read))
    .get_result::<Notification>(&mut conn)
    .map_err(missing_notification)?;

    Ok(notification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_and_missing_notifications_get_the_same_answer() {
        match missing_notification(diesel::result::Error::NotFound) {
            AppError::Known { code, message } => {
                assert_eq!(code, ErrorCode::NotificationNotFound);
                assert_eq!(message, "Notification introuvable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_database_errors_pass_through() {
        let err = missing_notification(diesel::result::Error::RollbackTransaction);
        assert!(matches!(err, AppError::Database(_)));
    }
}
