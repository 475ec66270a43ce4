//! Library change notifications
//!
//! Clients keep a list of their own songs on screen. When an upload
//! completes, a `songs-changed` event tells them to re-fetch it.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::session::PrincipalId;

/// Event delivered to connected clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LibraryEvent {
    /// The song list of `user_id` changed
    #[serde(rename_all = "camelCase")]
    SongsChanged { user_id: PrincipalId },
}

impl LibraryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LibraryEvent::SongsChanged { .. } => "songs-changed",
        }
    }

    /// User whose library the event is about
    pub fn user_id(&self) -> &PrincipalId {
        match self {
            LibraryEvent::SongsChanged { user_id } => user_id,
        }
    }
}

/// Fan-out of [`LibraryEvent`]s
#[derive(Clone)]
pub struct LibraryEvents {
    tx: broadcast::Sender<LibraryEvent>,
}

impl LibraryEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Ask clients of `user_id` to refresh their song list
    ///
    /// Returns the number of subscribers that received it.
    pub fn songs_changed(&self, user_id: &PrincipalId) -> usize {
        let event = LibraryEvent::SongsChanged {
            user_id: user_id.clone(),
        };
        match self.tx.send(event) {
            Ok(count) => {
                debug!(user_id = %user_id, subscribers = count, "Broadcast songs-changed");
                count
            }
            // No subscribers
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Events about `user_id`'s library from now on
    pub fn updates_for(&self, user_id: &PrincipalId) -> impl Stream<Item = LibraryEvent> {
        let user_id = user_id.clone();
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |result| {
            let keep = match result {
                Ok(event) => (event.user_id() == &user_id).then_some(event),
                Err(e) => {
                    // Lagged receivers skip what they missed
                    warn!("SSE client error: {:?}", e);
                    None
                }
            };
            async move { keep }
        })
    }

    /// SSE response streaming `user_id`'s events from now on
    pub fn sse(&self, user_id: &PrincipalId) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let stream = self.updates_for(user_id).filter_map(|event| async move {
            Event::default()
                .event(event.name())
                .json_data(&event)
                .ok()
                .map(Ok)
        });

        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }
}

impl Default for LibraryEvents {
    fn default() -> Self {
        Self::new(100)
    }
}
