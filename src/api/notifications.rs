/// Notification endpoints: unread listing and the live WebSocket feed
///
/// The WebSocket side authenticates during the handshake (Authorization
/// header, or `?token=` for browser clients that cannot set headers),
/// joins the hub group for the user's id, and relays published
/// notifications as JSON frames. Backpressure handling follows the same
/// pattern everywhere in this codebase: a bounded channel behind the
/// hub, a send timeout that disconnects slow consumers, and periodic
/// pings to detect dead connections.
use crate::{
    api::middleware,
    auth::authenticate_token,
    context::AppContext,
    db::models::Notification,
    error::AppResult,
    metrics,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, timeout, Duration, Instant};

const SEND_TIMEOUT_MS: u64 = 5000; // Timeout for sending a frame
const PING_INTERVAL_SECS: u64 = 30; // Send ping every 30 seconds

/// How many notifications a single list call returns
const LIST_LIMIT: i64 = 50;

/// Build notification routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread", get(unread_count))
        .route("/ws/notifications", get(subscribe_notifications))
}

/// Wire frame pushed over the socket
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationFrame<'a> {
    message: &'a str,
    id: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl<'a> NotificationFrame<'a> {
    fn from_notification(n: &'a Notification) -> Self {
        Self {
            message: &n.message,
            id: n.id,
            created_at: n.created_at,
        }
    }
}

/// List the caller's notifications, newest first. Listing marks
/// everything read; the returned rows still show their pre-call flag.
async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: crate::auth::AuthUser,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = ctx
        .notification_manager
        .list_and_mark_read(auth.user.id, LIST_LIMIT)
        .await?;
    Ok(Json(notifications))
}

/// Unread badge count. Unlike the list call this does not mark
/// anything read.
async fn unread_count(
    State(ctx): State<AppContext>,
    auth: crate::auth::AuthUser,
) -> AppResult<Json<serde_json::Value>> {
    let count = ctx.notification_manager.unread_count(auth.user.id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    /// Bearer token fallback for clients that cannot set headers
    token: Option<String>,
}

/// Upgrade to the live notification feed
async fn subscribe_notifications(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    headers: HeaderMap,
    State(ctx): State<AppContext>,
) -> Response {
    let token = middleware::extract_bearer_token(&headers).or(params.token);
    ws.on_upgrade(move |socket| handle_subscription(socket, token, ctx))
}

/// Drive one WebSocket session
async fn handle_subscription(socket: WebSocket, token: Option<String>, ctx: AppContext) {
    let (mut sender, mut receiver) = socket.split();

    // Authenticate before joining any group; a bad handshake is closed
    // without leaking why
    let auth = match token {
        Some(token) => authenticate_token(&ctx, &token).await.ok(),
        None => None,
    };
    let Some(auth) = auth else {
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let user_id = auth.user.id;
    let hub = ctx.notification_manager.hub().clone();
    let (session_id, mut notification_rx) = hub.join(user_id);
    metrics::NOTIFICATION_SESSIONS_ACTIVE.inc();
    tracing::debug!(user_id, %session_id, "notification session opened");

    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // Relay published notifications
            maybe = notification_rx.recv() => {
                let Some(notification) = maybe else {
                    // Hub dropped our sender; nothing left to relay
                    break;
                };
                match send_frame_with_timeout(&mut sender, &notification).await {
                    Ok(_) => {
                        last_activity = Instant::now();
                    }
                    Err(SendError::Timeout) => {
                        tracing::warn!(user_id, "Send timeout, client may be slow");
                        break;
                    }
                    Err(SendError::Disconnected) => {
                        tracing::debug!(user_id, "Client disconnected during send");
                        break;
                    }
                }
            }

            // Send periodic pings
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(PING_INTERVAL_SECS) {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
            }

            // Handle client messages
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!(user_id, "Client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Err(e)) => {
                        tracing::debug!(user_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        tracing::debug!(user_id, "Client disconnected");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    hub.leave(user_id, &session_id);
    metrics::NOTIFICATION_SESSIONS_ACTIVE.dec();
    tracing::debug!(user_id, %session_id, "notification session closed");
}

/// Error type for sending frames
#[derive(Debug)]
enum SendError {
    Timeout,
    Disconnected,
}

/// Send a frame with timeout
async fn send_frame_with_timeout(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    notification: &Notification,
) -> Result<(), SendError> {
    let frame = NotificationFrame::from_notification(notification);
    let json = serde_json::to_string(&frame).map_err(|_| SendError::Disconnected)?;

    match timeout(
        Duration::from_millis(SEND_TIMEOUT_MS),
        sender.send(Message::Text(json)),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(SendError::Disconnected),
        Err(_) => Err(SendError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_frame_shape() {
        let notification = Notification {
            id: 7,
            user_id: 1,
            message: "alice started following you.".to_string(),
            is_read: false,
            created_at: Utc::now(),
        };

        let frame = NotificationFrame::from_notification(&notification);
        let json = serde_json::to_string(&frame).unwrap();

        assert!(json.contains("\"message\":\"alice started following you.\""));
        assert!(json.contains("\"id\":7"));
        // Read state is client-side styling, not wire data
        assert!(!json.contains("is_read"));
    }
}
