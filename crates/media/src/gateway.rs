//! Agent gateway client
//!
//! One websocket per concern: a registration socket that receives room-join
//! jobs for this worker, and one socket per joined room carrying JSON
//! control messages plus binary audio frames.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tutor_agent_config::MediaPlaneConfig;
use tutor_agent_core::{
    AudioFrame, AudioStream, Error, JobRequest, Result, RoomHandle, WorkerRegistry,
};

/// Room audio is 48 kHz PCM on the gateway.
const ROOM_SAMPLE_RATE: u32 = 48_000;

/// Gateway control messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayMessage {
    /// Worker registration (sent once per registration socket).
    Register { worker: String },
    /// Room-join job for a registered worker.
    Job {
        room: String,
        identity: String,
        #[serde(default)]
        metadata: String,
    },
    /// Join a room as an agent participant.
    Join { room: String, identity: String },
    Joined { room: String },
    /// Data packet on a topic (payload base64).
    Data { topic: String, payload: String },
    /// Graceful end: the gateway finishes queued playback, then closes.
    EndSession,
    Ping,
    Pong,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

async fn connect(gateway_url: &str, api_key: &str) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(gateway_url)
        .header("authorization", format!("Bearer {api_key}"))
        .header("host", host_of(gateway_url))
        .header("upgrade", "websocket")
        .header("connection", "Upgrade")
        .header("sec-websocket-version", "13")
        .header(
            "sec-websocket-key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .map_err(|e| Error::MediaPlane(e.to_string()))?;
    let (socket, _) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::MediaPlane(e.to_string()))?;
    Ok(socket)
}

fn host_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

/// Gateway client: registration plus room joins.
pub struct GatewayClient {
    config: MediaPlaneConfig,
}

impl GatewayClient {
    pub fn new(config: MediaPlaneConfig) -> Self {
        Self { config }
    }

    /// Join a room as an agent participant.
    pub async fn join_room(
        &self,
        room_name: &str,
        identity: &str,
    ) -> Result<Arc<GatewayRoom>> {
        let socket = connect(&self.config.gateway_url, &self.config.api_key).await?;
        let (mut sink, mut source) = socket.split();

        let join = GatewayMessage::Join {
            room: room_name.to_string(),
            identity: identity.to_string(),
        };
        sink.send(WsMessage::Text(serde_json::to_string(&join).unwrap_or_default()))
            .await
            .map_err(|e| Error::MediaPlane(e.to_string()))?;

        let (audio_tx, audio_rx) = mpsc::channel::<AudioFrame>(64);
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(WsMessage::Binary(data)) => {
                        if audio_tx
                            .send(AudioFrame::new(data, ROOM_SAMPLE_RATE))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        tracing::info!(room = room_name, identity, "joined room via gateway");
        Ok(Arc::new(GatewayRoom {
            room_name: room_name.to_string(),
            sink: Mutex::new(sink),
            audio_rx: Mutex::new(Some(audio_rx)),
        }))
    }
}

#[async_trait]
impl WorkerRegistry for GatewayClient {
    async fn register(&self, worker_name: &str) -> Result<mpsc::Receiver<JobRequest>> {
        let socket = connect(&self.config.gateway_url, &self.config.api_key).await?;
        let (mut sink, mut source) = socket.split();

        let register = GatewayMessage::Register {
            worker: worker_name.to_string(),
        };
        sink.send(WsMessage::Text(
            serde_json::to_string(&register).unwrap_or_default(),
        ))
        .await
        .map_err(|e| Error::MediaPlane(e.to_string()))?;

        let (job_tx, job_rx) = mpsc::channel::<JobRequest>(16);
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(WsMessage::Text(raw)) => {
                        match serde_json::from_str::<GatewayMessage>(&raw) {
                            Ok(GatewayMessage::Job {
                                room,
                                identity,
                                metadata,
                            }) => {
                                let job = JobRequest {
                                    room_name: room,
                                    student_identity: identity,
                                    metadata,
                                };
                                if job_tx.send(job).await.is_err() {
                                    break;
                                }
                            }
                            Ok(GatewayMessage::Ping) => {
                                let pong = serde_json::to_string(&GatewayMessage::Pong)
                                    .unwrap_or_default();
                                if sink.send(WsMessage::Text(pong)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!(error = %e, "unparseable gateway message");
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            tracing::warn!("registration socket closed");
        });

        tracing::info!(worker = worker_name, "registered against media-plane gateway");
        Ok(job_rx)
    }
}

/// One joined room over the gateway.
pub struct GatewayRoom {
    room_name: String,
    sink: Mutex<WsSink>,
    audio_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

#[async_trait]
impl RoomHandle for GatewayRoom {
    fn room_name(&self) -> &str {
        &self.room_name
    }

    async fn publish_data(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let message = GatewayMessage::Data {
            topic: topic.to_string(),
            payload: BASE64.encode(payload),
        };
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(
                serde_json::to_string(&message).unwrap_or_default(),
            ))
            .await
            .map_err(|e| Error::MediaPlane(e.to_string()))
    }

    async fn play(&self, frames: Vec<AudioFrame>) -> Result<()> {
        let mut sink = self.sink.lock().await;
        for frame in frames {
            sink.send(WsMessage::Binary(frame.data.to_vec()))
                .await
                .map_err(|e| Error::MediaPlane(e.to_string()))?;
        }
        Ok(())
    }

    async fn subscribe_audio(&self) -> Result<AudioStream> {
        let receiver = self
            .audio_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::MediaPlane("room audio already subscribed".to_string()))?;
        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        // EndSession lets the gateway finish queued playback before the
        // socket drops; an abrupt close would cut audio mid-word.
        let end = serde_json::to_string(&GatewayMessage::EndSession).unwrap_or_default();
        let _ = sink.send(WsMessage::Text(end)).await;
        sink.send(WsMessage::Close(None))
            .await
            .map_err(|e| Error::MediaPlane(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_messages_round_trip() {
        let job = GatewayMessage::Job {
            room: "room-1".to_string(),
            identity: "student-1".to_string(),
            metadata: "session:abc".to_string(),
        };
        let raw = serde_json::to_string(&job).unwrap();
        assert!(raw.contains("\"type\":\"job\""));
        let parsed: GatewayMessage = serde_json::from_str(&raw).unwrap();
        match parsed {
            GatewayMessage::Job { room, metadata, .. } => {
                assert_eq!(room, "room-1");
                assert_eq!(metadata, "session:abc");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn job_metadata_defaults_to_empty() {
        let parsed: GatewayMessage =
            serde_json::from_str(r#"{"type":"job","room":"r","identity":"s"}"#).unwrap();
        match parsed {
            GatewayMessage::Job { metadata, .. } => assert!(metadata.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
