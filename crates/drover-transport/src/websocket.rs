use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, USER_AGENT};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use drover_model::{ConnectionInfo, Envelope};

use crate::config::user_agent;
use crate::state::LinkState;
use crate::{
    Transport, TransportConfig, TransportError, CHANNEL_DEPTH, PING_INTERVAL, READ_DEADLINE,
    SEND_ENQUEUE_WAIT, WRITE_DEADLINE,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Frame-based socket binding: one JSON envelope per text frame.
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

/// Per-connection handles; replaced on every (re)connect cycle.
struct Conn {
    cancel: CancellationToken,
    sink: Arc<Mutex<WsSink>>,
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
    /// Set by an explicit `disconnect`; stops the reconnect loop.
    closed: AtomicBool,
    /// At most one reconnect loop at a time.
    reconnecting: AtomicBool,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (send_tx, send_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (recv_tx, recv_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (err_tx, err_rx) = mpsc::channel(10);
        let state = LinkState::new(config.url.clone(), "websocket");
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
impl Transport for WebSocketTransport {
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

    info!(url = %inner.config.url, "connecting to controller via websocket");

    let mut request = inner
        .config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    let auth = format!("Bearer {}", inner.config.token);
    request.headers_mut().insert(
        AUTHORIZATION,
        auth.parse()
            .map_err(|_| TransportError::InvalidUrl("token is not header-safe".into()))?,
    );
    if let Ok(ua) = user_agent().parse() {
        request.headers_mut().insert(USER_AGENT, ua);
    }

    let connector = if inner.config.tls_skip_verify {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let handshake = connect_async_tls_with_config(request, None, false, connector);
    let (stream, _response) = match timeout(inner.config.connect_timeout, handshake).await {
        Ok(Ok(ok)) => ok,
        Ok(Err(WsError::Http(response)))
            if response.status() == http::StatusCode::UNAUTHORIZED =>
        {
            return Err(TransportError::AuthenticationFailed);
        }
        Ok(Err(e)) => return Err(TransportError::ConnectionFailed(e.to_string())),
        Err(_) => {
            return Err(TransportError::ConnectionFailed(
                "handshake timed out".into(),
            ));
        }
    };

    let (sink, source) = stream.split();
    let sink = Arc::new(Mutex::new(sink));
    let cancel = CancellationToken::new();

    let pumps = vec![
        tokio::spawn(send_pump(
            Arc::clone(inner),
            cancel.clone(),
            Arc::clone(&sink),
        )),
        tokio::spawn(recv_pump(Arc::clone(inner), cancel.clone(), source)),
        tokio::spawn(ping_pump(cancel.clone(), Arc::clone(&sink))),
    ];

    *inner.conn.lock().unwrap() = Some(Conn {
        cancel,
        sink,
        pumps,
    });
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

    {
        let mut sink = conn.sink.lock().await;
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    }

    for pump in conn.pumps {
        let _ = pump.await;
    }

    inner.state.mark_disconnected();
    info!("disconnected from controller");
}

/// Serialize queued outbound envelopes onto the socket, one frame each.
async fn send_pump(inner: Arc<Inner>, cancel: CancellationToken, sink: Arc<Mutex<WsSink>>) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = async { inner.send_rx.lock().await.recv().await } => message,
        };
        let Some(message) = message else { return };

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                inner.state.count_error();
                publish_error(&inner, TransportError::InvalidMessage(e.to_string()));
                continue;
            }
        };

        let write = async {
            let mut sink = sink.lock().await;
            sink.send(WsMessage::Text(text)).await
        };
        match timeout(WRITE_DEADLINE, write).await {
            Ok(Ok(())) => inner.state.count_sent(),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to write message");
                inner.state.count_error();
                publish_error(&inner, TransportError::SendFailed(e.to_string()));
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

/// Read frames, deserialize, and forward inbound envelopes. Any wire-level
/// failure publishes an error and hands control to the reconnect loop.
async fn recv_pump(inner: Arc<Inner>, cancel: CancellationToken, mut source: WsSource) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = timeout(READ_DEADLINE, source.next()) => frame,
        };

        let failure = match frame {
            Err(_) => Some(TransportError::ReceiveFailed("read deadline exceeded".into())),
            Ok(None) => Some(TransportError::ReceiveFailed("connection closed".into())),
            Ok(Some(Err(e))) => Some(TransportError::ReceiveFailed(e.to_string())),
            Ok(Some(Ok(WsMessage::Close(_)))) => {
                Some(TransportError::ReceiveFailed("close frame received".into()))
            }
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                match serde_json::from_str::<Envelope>(&text) {
                    Ok(message) => {
                        inner.state.count_received();
                        if inner.recv_tx.send(message).await.is_err() {
                            return;
                        }
                        None
                    }
                    Err(e) => Some(TransportError::InvalidMessage(e.to_string())),
                }
            }
            // Keepalive traffic; tungstenite answers pings internally.
            Ok(Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)))) => None,
            Ok(Some(Ok(WsMessage::Binary(_)))) => {
                Some(TransportError::InvalidMessage("unexpected binary frame".into()))
            }
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

/// Keep the connection alive with periodic pings.
async fn ping_pump(cancel: CancellationToken, sink: Arc<Mutex<WsSink>>) {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let ping = async {
                    let mut sink = sink.lock().await;
                    sink.send(WsMessage::Ping(Vec::new())).await
                };
                match timeout(std::time::Duration::from_secs(5), ping).await {
                    Ok(Ok(())) => debug!("ping sent"),
                    Ok(Err(e)) => warn!(error = %e, "failed to send ping"),
                    Err(_) => warn!("ping write deadline exceeded"),
                }
            }
        }
    }
}

/// Disconnect, wait, and retry connecting up to the configured attempt cap.
///
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
    // Best effort: the error channel is a small buffer and recv may lag.
    let _ = inner.err_tx.try_send(err);
}
