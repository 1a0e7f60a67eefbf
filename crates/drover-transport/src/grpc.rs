use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{Code, Request, Streaming};
use tracing::{error, info, warn};
use uuid::Uuid;

use drover_model::{ConnectionInfo, Envelope, MessageType, Payload};

use crate::config::user_agent;
use crate::proto::{controller_link_client::ControllerLinkClient, Frame};
use crate::state::LinkState;
use crate::{
    Transport, TransportConfig, TransportError, CHANNEL_DEPTH, PING_INTERVAL, SEND_ENQUEUE_WAIT,
    WRITE_DEADLINE,
};

/// RPC streaming binding: one bidirectional gRPC stream of frames.
pub struct GrpcTransport {
    inner: Arc<Inner>,
}

struct Conn {
    cancel: CancellationToken,
    pumps: Vec<JoinHandle<()>>,
}

struct Inner {
    config: TransportConfig,
    state: LinkState,
    send_tx: mpsc::Sender<Envelope>,
    send_rx: Mutex<mpsc::Receiver<Envelope>>,
    recv_tx: mpsc::Sender<Envelope>,
    recv_rx: Mutex<mpsc::Receiver<Envelope>>,
    err_tx: mpsc::Sender<TransportError>,
    err_rx: Mutex<mpsc::Receiver<TransportError>>,
    conn: std::sync::Mutex<Option<Conn>>,
    closed: AtomicBool,
    reconnecting: AtomicBool,
}

impl GrpcTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (send_tx, send_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (recv_tx, recv_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (err_tx, err_rx) = mpsc::channel(10);
        let state = LinkState::new(config.url.clone(), "grpc");
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                send_tx,
                send_rx: Mutex::new(send_rx),
                recv_tx,
                recv_rx: Mutex::new(recv_rx),
                err_tx,
                err_rx: Mutex::new(err_rx),
                conn: std::sync::Mutex::new(None),
                closed: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.closed.store(false, Ordering::SeqCst);
        connect_inner(&self.inner).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        disconnect_inner(&self.inner).await;
        Ok(())
    }

    async fn send(&self, mut message: Envelope) -> Result<(), TransportError> {
        if !self.inner.state.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if message.id.is_empty() {
            message.id = Uuid::new_v4().to_string();
        }
        message.timestamp = SystemTime::now();

        match self
            .inner
            .send_tx
            .send_timeout(message, SEND_ENQUEUE_WAIT)
            .await
        {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(TransportError::Timeout),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(TransportError::SendFailed("send channel closed".into()))
            }
        }
    }

    async fn recv(&self, ctx: &CancellationToken) -> Result<Envelope, TransportError> {
        if !self.inner.state.is_connected() {
            return Err(TransportError::Disconnected);
        }

        tokio::select! {
            message = async { self.inner.recv_rx.lock().await.recv().await } => {
                message.ok_or(TransportError::Disconnected)
            }
            err = async { self.inner.err_rx.lock().await.recv().await } => {
                Err(err.unwrap_or(TransportError::Disconnected))
            }
            _ = ctx.cancelled() => Err(TransportError::Cancelled),
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    fn info(&self) -> ConnectionInfo {
        self.inner.state.info()
    }
}

async fn connect_inner(inner: &Arc<Inner>) -> Result<(), TransportError> {
    if inner.state.is_connected() {
        return Ok(());
    }

    info!(url = %inner.config.url, "connecting to controller via grpc");

    let secure = inner.config.url.starts_with("grpcs://");
    let address = inner
        .config
        .url
        .replacen("grpcs://", "https://", 1)
        .replacen("grpc://", "http://", 1);

    let mut endpoint = Endpoint::from_shared(address)
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?
        .connect_timeout(inner.config.connect_timeout)
        .http2_keep_alive_interval(PING_INTERVAL)
        .keep_alive_timeout(Duration::from_secs(5))
        .keep_alive_while_idle(true)
        .user_agent(user_agent())
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    if secure {
        if inner.config.tls_skip_verify {
            warn!("tls_skip_verify is not supported by the grpc binding; using system roots");
        }
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    }

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    let (frame_tx, frame_rx) = mpsc::channel::<Frame>(CHANNEL_DEPTH);
    let mut request = Request::new(ReceiverStream::new(frame_rx));
    let auth: MetadataValue<_> = format!("Bearer {}", inner.config.token)
        .parse()
        .map_err(|_| TransportError::InvalidUrl("token is not metadata-safe".into()))?;
    request.metadata_mut().insert("authorization", auth);

    let mut client = ControllerLinkClient::new(channel);
    let inbound = match client.channel(request).await {
        Ok(response) => response.into_inner(),
        Err(status) if status.code() == Code::Unauthenticated => {
            return Err(TransportError::AuthenticationFailed);
        }
        Err(status) => {
            return Err(TransportError::ConnectionFailed(
                status.message().to_string(),
            ));
        }
    };

    let cancel = CancellationToken::new();
    let pumps = vec![
        tokio::spawn(send_pump(Arc::clone(inner), cancel.clone(), frame_tx)),
        tokio::spawn(recv_pump(Arc::clone(inner), cancel.clone(), inbound)),
    ];

    *inner.conn.lock().unwrap() = Some(Conn { cancel, pumps });
    inner.state.mark_connected();

    info!("connected to controller");
    Ok(())
}

async fn disconnect_inner(inner: &Arc<Inner>) {
    let Some(conn) = inner.conn.lock().unwrap().take() else {
        return;
    };

    info!("disconnecting from controller");
    conn.cancel.cancel();
    // Dropping the send pump's frame sender half-closes the stream.
    for pump in conn.pumps {
        let _ = pump.await;
    }

    inner.state.mark_disconnected();
    info!("disconnected from controller");
}

/// Convert queued envelopes into frames and feed the outbound stream.
async fn send_pump(inner: Arc<Inner>, cancel: CancellationToken, frame_tx: mpsc::Sender<Frame>) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = async { inner.send_rx.lock().await.recv().await } => message,
        };
        let Some(message) = message else { return };

        let frame = match to_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                inner.state.count_error();
                publish_error(&inner, e);
                continue;
            }
        };

        match timeout(WRITE_DEADLINE, frame_tx.send(frame)).await {
            Ok(Ok(())) => inner.state.count_sent(),
            Ok(Err(_)) => {
                warn!("grpc stream closed while sending");
                inner.state.count_error();
                publish_error(&inner, TransportError::SendFailed("stream closed".into()));
            }
            Err(_) => {
                warn!("write deadline exceeded");
                inner.state.count_error();
                publish_error(
                    &inner,
                    TransportError::SendFailed("write deadline exceeded".into()),
                );
            }
        }
    }
}

/// Read inbound frames and forward decoded envelopes; stream failures hand
/// control to the reconnect loop.
async fn recv_pump(inner: Arc<Inner>, cancel: CancellationToken, mut inbound: Streaming<Frame>) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = inbound.message() => next,
        };

        let failure = match next {
            Ok(Some(frame)) => match from_frame(frame) {
                Ok(message) => {
                    inner.state.count_received();
                    if inner.recv_tx.send(message).await.is_err() {
                        return;
                    }
                    None
                }
                Err(e) => Some(e),
            },
            Ok(None) => Some(TransportError::ReceiveFailed("stream closed".into())),
            Err(status) => Some(TransportError::ReceiveFailed(status.message().to_string())),
        };

        if let Some(err) = failure {
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            warn!(error = %err, "receive pump failed");
            inner.state.count_error();
            publish_error(&inner, err);
            tokio::spawn(reconnect(Arc::clone(&inner)));
            return;
        }
    }
}

/// Boxed (rather than a plain `async fn`) to break a rustc opaque-type cycle:
/// this function is spawned from `recv_pump`, which is itself spawned from
/// `connect_inner`, and the compiler cannot otherwise resolve the `Send`
/// auto-trait for the mutually-referencing opaque futures.
fn reconnect(inner: Arc<Inner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        if inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("attempting to reconnect to controller");
        let mut attempts = 0;
        while attempts < inner.config.max_reconnect_attempts {
            if inner.closed.load(Ordering::SeqCst) {
                break;
            }
            attempts += 1;
            info!(attempt = attempts, "reconnecting");

            disconnect_inner(&inner).await;
            tokio::time::sleep(inner.config.reconnect_interval).await;

            match connect_inner(&inner).await {
                Ok(()) => {
                    info!("reconnected successfully");
                    inner.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "reconnection failed");
                }
            }
        }

        if !inner.closed.load(Ordering::SeqCst) {
            error!("max reconnection attempts reached, giving up");
        }
        inner.reconnecting.store(false, Ordering::SeqCst);
    })
}

fn publish_error(inner: &Inner, err: TransportError) {
    let _ = inner.err_tx.try_send(err);
}

fn to_frame(message: &Envelope) -> Result<Frame, TransportError> {
    let data = serde_json::to_vec(&message.data)
        .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
    let timestamp = message
        .timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    Ok(Frame {
        id: message.id.clone(),
        r#type: message.message_type.as_str().to_string(),
        timestamp,
        agent_id: message.agent_id.clone(),
        reply_to: message.reply_to.clone().unwrap_or_default(),
        data,
        metadata: message.metadata.clone().into_iter().collect(),
    })
}

fn from_frame(frame: Frame) -> Result<Envelope, TransportError> {
    let message_type = MessageType::from_tag(&frame.r#type)
        .ok_or_else(|| TransportError::InvalidMessage(format!("unknown type: {}", frame.r#type)))?;

    let data: Payload = if frame.data.is_empty() {
        Payload::new()
    } else {
        serde_json::from_slice(&frame.data)
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?
    };

    Ok(Envelope {
        id: frame.id,
        message_type,
        timestamp: UNIX_EPOCH + Duration::from_secs(frame.timestamp.max(0) as u64),
        agent_id: frame.agent_id,
        reply_to: if frame.reply_to.is_empty() {
            None
        } else {
            Some(frame.reply_to)
        },
        data,
        metadata: frame.metadata.into_iter().collect(),
    })
}
