//! Server-sent event plumbing shared by the HTTP transports.

use futures::StreamExt;
use reqwest::RequestBuilder;
use reqwest_eventsource::{Event, EventSource};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, trace};

use ask_core::{Error, EventStream};

/// Open an SSE request and decode each event's data as `T`.
///
/// The connection is read on a spawned task and forwarded through a bounded
/// channel. The stream ends at the server's end of stream, at a `[DONE]`
/// sentinel, or after the first error, which is yielded as the final item.
/// The event source never reconnects.
pub(crate) fn event_stream<T>(request: RequestBuilder, backend: &'static str) -> Result<EventStream<T>, Error>
where
    T: DeserializeOwned + Send + 'static,
{
    let mut es = EventSource::new(request).map_err(|e| Error::stream(e.to_string()))?;
    let (tx, rx) = mpsc::channel::<Result<T, Error>>(100);

    tokio::spawn(async move {
        while let Some(event) = es.next().await {
            let item = match event {
                Ok(Event::Open) => {
                    debug!(backend, "SSE connection opened");
                    continue;
                }
                Ok(Event::Message(msg)) => {
                    trace!(backend, event = %msg.event, data = %msg.data, "SSE event");
                    if msg.data == "[DONE]" {
                        break;
                    }
                    serde_json::from_str::<T>(&msg.data).map_err(|e| {
                        error!(backend, error = %e, data = %msg.data, "Failed to parse SSE event");
                        Error::stream(format!("Failed to parse {} event: {}", backend, e))
                    })
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!(backend, "SSE stream ended");
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    error!(backend, status = status.as_u16(), body = %body, "Request failed");
                    Err(parse_error(status.as_u16(), &body))
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    error!(backend, error = %e, "SSE transport error");
                    Err(Error::network(e.to_string()))
                }
                Err(e) => {
                    error!(backend, error = ?e, "SSE error");
                    Err(Error::stream(format!("{} SSE error: {}", backend, e)))
                }
            };

            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                debug!(backend, "Event consumer dropped");
                break;
            }
            if failed {
                break;
            }
        }
        es.close();
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

/// Map an HTTP error response onto [`Error`].
///
/// Both backends wrap failures as `{"error": {"message": ...}}`; anything
/// else is reported verbatim.
pub(crate) fn parse_error(status: u16, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => Error::from_status(status, err.error.message),
        Err(_) => Error::api(status, body.to_string()),
    }
}
