// bases/download_server/src/ws.rs
//! The request/delivery surface. Each socket accepts JSON requests and
//! answers with progress events as text frames, interleaved with binary
//! frames carrying the finished artifact. Requests on one socket are
//! served in order; concurrency comes from concurrent sockets.

use crate::server::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use delivery_stream::{DeliveryChannel, Frame};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use job_engine::{BatchCoordinator, BatchOverrides, CoverSource, JobRequest};
use media_probe::{classify, MetadataSource, UrlKind};
use progress_feed::{Phase, ProgressEvent};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientRequest {
    Download {
        url: String,
        title: Option<String>,
        artist: Option<String>,
        album: Option<String>,
        cover_url: Option<String>,
        /// A path previously returned by the cover upload endpoint.
        cover_path: Option<String>,
    },
    Playlist {
        url: String,
        artist: Option<String>,
        album: Option<String>,
        cover_url: Option<String>,
        cover_path: Option<String>,
    },
    Metadata {
        url: String,
    },
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let request: ClientRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let event = error_event(Uuid::new_v4(), format!("bad request: {e}"));
                if send_event(&mut sink, &event).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if dispatch(request, &mut sink, &state).await.is_err() {
            // Socket is gone; in-flight work notices on its next send and
            // cleans up after itself.
            break;
        }
    }
}

async fn dispatch(
    request: ClientRequest,
    sink: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
) -> Result<(), axum::Error> {
    match request {
        ClientRequest::Metadata { url } => {
            let reply = metadata_reply(&url, state).await;
            sink.send(Message::Text(reply.to_string())).await
        }

        ClientRequest::Download {
            url,
            title,
            artist,
            album,
            cover_url,
            cover_path,
        } => {
            let id = Uuid::new_v4();
            let parsed = match Url::parse(&url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return send_event(sink, &error_event(id, format!("invalid url: {e}"))).await
                }
            };
            let cover = match cover_source(&state.store, cover_url, cover_path) {
                Ok(cover) => cover,
                Err(reason) => return send_event(sink, &error_event(id, reason)).await,
            };
            info!(%id, url = %parsed, "download request");

            let request = JobRequest {
                url: parsed,
                title,
                artist,
                album,
                cover,
            };

            let (channel, rx) = DeliveryChannel::pair();
            let engine = state.engine.clone();
            let store = state.store.clone();
            let worker = tokio::spawn(async move {
                match engine.run_job(id, request, &channel).await {
                    Ok(finished) => {
                        if let Err(e) = channel
                            .stream_file(finished.id, &finished.path, &store)
                            .await
                        {
                            warn!(%id, error = %e, "delivery failed");
                        }
                    }
                    Err(e) => {
                        let _ = channel.emit(error_event(id, e.to_string())).await;
                    }
                }
            });

            let forwarded = forward_frames(rx, sink).await;
            let _ = worker.await;
            forwarded
        }

        ClientRequest::Playlist {
            url,
            artist,
            album,
            cover_url,
            cover_path,
        } => {
            let batch_id = Uuid::new_v4();
            let parsed = match Url::parse(&url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return send_event(sink, &error_event(batch_id, format!("invalid url: {e}")))
                        .await
                }
            };
            let cover = match cover_source(&state.store, cover_url, cover_path) {
                Ok(cover) => cover,
                Err(reason) => return send_event(sink, &error_event(batch_id, reason)).await,
            };
            info!(%batch_id, url = %parsed, "playlist request");

            let overrides = BatchOverrides {
                artist,
                album,
                cover,
            };

            let (channel, rx) = DeliveryChannel::pair();
            let coordinator = BatchCoordinator::from_engine(state.engine.clone());
            let worker = tokio::spawn(async move {
                if let Err(e) = coordinator
                    .run_batch(batch_id, &parsed, overrides, &channel)
                    .await
                {
                    let _ = channel.emit(error_event(batch_id, e.to_string())).await;
                }
            });

            let forwarded = forward_frames(rx, sink).await;
            let _ = worker.await;
            forwarded
        }
    }
}

/// Pump frames from a job onto the socket. Sends suspend until the socket
/// accepts the previous frame, which is what keeps the producer honest.
async fn forward_frames(
    mut rx: mpsc::Receiver<Frame>,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Result<(), axum::Error> {
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            Frame::Event(event) => match serde_json::to_string(&event) {
                Ok(text) => Message::Text(text),
                Err(e) => {
                    warn!(error = %e, "unserializable event dropped");
                    continue;
                }
            },
            Frame::Data(data) => Message::Binary(data.to_vec()),
        };
        sink.send(message).await?;
    }
    Ok(())
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ProgressEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => sink.send(Message::Text(text)).await,
        Err(_) => Ok(()),
    }
}

fn error_event(id: Uuid, message: String) -> ProgressEvent {
    ProgressEvent::new(id, Phase::Error, 0.0).with_message(message)
}

/// An uploaded cover wins over a remote URL. Only paths inside the scratch
/// store — i.e. ones the upload endpoint handed out — are accepted.
fn cover_source(
    store: &temp_store::TempStore,
    cover_url: Option<String>,
    cover_path: Option<String>,
) -> Result<CoverSource, String> {
    let Some(raw) = cover_path else {
        return Ok(cover_url.map(CoverSource::Remote).unwrap_or_default());
    };

    let path = std::path::PathBuf::from(raw);
    let escapes = path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes || !path.starts_with(store.root()) {
        return Err("cover_path is not a stored cover".to_string());
    }
    Ok(CoverSource::Upload(path))
}

async fn metadata_reply(url: &str, state: &AppState) -> serde_json::Value {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => return json!({ "type": "error", "message": format!("invalid url: {e}") }),
    };

    match classify(&parsed) {
        UrlKind::Playlist => match state.engine.source().probe_playlist(&parsed).await {
            Ok(items) => json!({ "type": "playlist", "items": items }),
            Err(e) => json!({ "type": "error", "message": e.to_string() }),
        },
        UrlKind::Single => {
            match state
                .engine
                .source()
                .probe_track(&parsed, state.store.root())
                .await
            {
                Ok(info) => json!({ "type": "track", "metadata": info }),
                Err(e) => json!({ "type": "error", "message": e.to_string() }),
            }
        }
    }
}
