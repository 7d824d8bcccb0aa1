//! WebSocket feed of ride request changes for the logged-in driver.
//!
//! Messages are the JSON form of [`RideRequestEvent`]. When the feed falls
//! behind, a `{"type":"resync"}` message tells the client to re-read
//! `GET /api/driver/ride-requests`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::driver;
use crate::services::notify::RideRequestEvent;
use crate::utils::jwt::Claims;
use crate::AppState;

pub async fn ride_request_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Response> {
    let driver = driver::driver_for_user(&state.db, claims.sub).await?;
    let events = state.ride_requests.subscribe();

    tracing::info!(driver_id = %driver.id, "Ride request feed requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, driver.id, events)))
}

async fn handle_socket(
    socket: WebSocket,
    driver_id: Uuid,
    mut events: broadcast::Receiver<RideRequestEvent>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let payload = match events.recv().await {
                Ok(event) if event.driver_id() == driver_id => match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize ride request event");
                        continue;
                    }
                },
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%driver_id, skipped, "Ride request feed lagged");
                    r#"{"type":"resync"}"#.to_string()
                }
                Err(RecvError::Closed) => break,
            };

            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain client frames so close and ping are noticed
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    tracing::debug!(%driver_id, "Ride request feed closed");
}
