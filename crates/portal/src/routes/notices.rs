//! Per-user notice stream.

use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::middleware::{Gated, RequireUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notices/stream", get(stream))
}

/// Notices for the signed-in user, one `notice` event each.
///
/// A client that falls behind skips the notices it missed.
async fn stream(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.notices().subscribe(&session.email);

    let events = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(notice) => {
                    let json = serde_json::to_string(&notice).unwrap_or_else(|_| {
                        r#"{"level":"error","message":"Failed to serialize notice"}"#.to_string()
                    });
                    yield Ok(Event::default().event("notice").data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Notice stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
