//! Turns raw WebSocket frames into a stream of typed messages.
//!
//! Text frames are parsed with [`parse_stream_message`]; frames that fail
//! to parse (including unknown event types) are logged and skipped. The
//! stream ends when the socket closes or reports an error.

use futures::stream::{self, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::backend::EventFeed;
use crate::client::EventConnection;
use crate::messages::parse_stream_message;

pub fn into_event_feed(connection: EventConnection) -> EventFeed {
    let EventConnection {
        job_id, ws_stream, ..
    } = connection;

    stream::unfold(ws_stream, move |mut ws_stream| {
        let job_id = job_id.clone();
        async move {
            while let Some(msg_result) = ws_stream.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match parse_stream_message(&text) {
                        Ok(message) => return Some((message, ws_stream)),
                        Err(e) => {
                            tracing::warn!(
                                job_id = %job_id,
                                error = %e,
                                raw_message = %text,
                                "Failed to parse analysis event",
                            );
                        }
                    },
                    Ok(Message::Binary(_)) => {
                        tracing::trace!(job_id = %job_id, "Ignoring binary frame");
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {
                        // Handled automatically by tungstenite.
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!(job_id = %job_id, ?frame, "Analysis event feed closed");
                        return None;
                    }
                    Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Event feed receive error");
                        return None;
                    }
                }
            }
            None
        }
    })
    .boxed()
}
