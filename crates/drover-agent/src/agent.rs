use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use drover_engine::Engine;
use drover_fileops::FileOpsManager;
use drover_model::{Envelope, MessageType, Payload};
use drover_transport::{create_transport, Transport};

use crate::config::Config;
use crate::dispatch::{receive_loop, Dispatcher};
use crate::error::AgentError;
use crate::service::{start_all, stop_all, EngineService, FileOpsService, Service};

/// Deadline for the whole stop sequence.
const STOP_DEADLINE: Duration = Duration::from_secs(30);

/// The agent supervisor.
///
/// Owns the sub-services in dependency order, the controller transport, the
/// heartbeat ticker, and the receive-and-dispatch loop. In standalone mode
/// (no master URL) the transport is absent and only the sub-services run.
pub struct Agent {
    config: Config,
    engine: Arc<Engine>,
    fileops: Arc<FileOpsManager>,
    transport: Option<Arc<dyn Transport>>,
    services: Vec<Arc<dyn Service>>,
    shutdown: CancellationToken,
    running: AtomicBool,
    loops: std::sync::Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
}

impl Agent {
    pub fn new(config: Config) -> Result<Self, AgentError> {
        let transport = if config.standalone() {
            None
        } else {
            Some(create_transport(config.transport_config())?)
        };
        Self::with_transport(config, transport)
    }

    /// Build the agent around an explicit transport (or none for
    /// standalone). Used by `new` and by tests that inject a fake link.
    pub fn with_transport(
        config: Config,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Self, AgentError> {
        let engine = Arc::new(Engine::new(config.engine_config()));
        let fileops = Arc::new(FileOpsManager::new(config.storage_config())?);

        let services: Vec<Arc<dyn Service>> = vec![
            Arc::new(EngineService(Arc::clone(&engine))),
            Arc::new(FileOpsService(Arc::clone(&fileops))),
        ];

        Ok(Self {
            config,
            engine,
            fileops,
            transport,
            services,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            loops: std::sync::Mutex::new(Vec::new()),
            started_at: Instant::now(),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn fileops(&self) -> &Arc<FileOpsManager> {
        &self.fileops
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start sub-services in order, connect to the controller, and spawn
    /// the heartbeat and dispatch loops. A sub-service start failure stops
    /// the already-started services in reverse order before surfacing.
    pub async fn start(&self) -> Result<(), AgentError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyRunning);
        }

        info!(agent_id = %self.config.agent.id, "starting drover agent");

        if let Err(e) = start_all(&self.services).await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        if let Some(transport) = &self.transport {
            if let Err(e) = transport.connect().await {
                error!(error = %e, "failed to connect to controller");
                stop_all(&self.services).await;
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        } else {
            info!("running in standalone mode (no controller)");
        }

        let mut loops = self.loops.lock().unwrap();
        loops.push(tokio::spawn(heartbeat_loop(
            self.config.agent.id.clone(),
            self.transport.clone(),
            self.config.heartbeat_interval(),
            self.shutdown.clone(),
        )));

        if let Some(transport) = &self.transport {
            let dispatcher = Dispatcher {
                agent_id: self.config.agent.id.clone(),
                engine: Arc::clone(&self.engine),
                fileops: Arc::clone(&self.fileops),
                transport: Arc::clone(transport),
                started_at: self.started_at,
            };
            loops.push(tokio::spawn(receive_loop(
                dispatcher,
                self.shutdown.clone(),
            )));
        }
        drop(loops);

        info!("drover agent started");
        Ok(())
    }

    /// Stop the loops, disconnect, and stop sub-services in reverse order.
    /// Idempotent; bounded by a 30 s deadline.
    pub async fn stop(&self) -> Result<(), AgentError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("stopping drover agent");

        let sequence = async {
            self.shutdown.cancel();

            if let Some(transport) = &self.transport {
                if let Err(e) = transport.disconnect().await {
                    error!(error = %e, "error disconnecting from controller");
                }
            }

            let loops: Vec<JoinHandle<()>> = std::mem::take(&mut *self.loops.lock().unwrap());
            for handle in loops {
                let _ = handle.await;
            }

            stop_all(&self.services).await;
        };

        if tokio::time::timeout(STOP_DEADLINE, sequence).await.is_err() {
            warn!("stop deadline exceeded; some services may not have stopped cleanly");
        }

        info!("drover agent stopped");
        Ok(())
    }
}

/// Best-effort heartbeat ticker: a failed send never blocks the next tick,
/// and a missing transport makes each tick a no-op.
async fn heartbeat_loop(
    agent_id: String,
    transport: Option<Arc<dyn Transport>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let Some(transport) = &transport else { continue };

                let mut data = Payload::new();
                data.insert("agent_id".into(), agent_id.clone().into());
                data.insert(
                    "timestamp".into(),
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs()
                        .into(),
                );
                data.insert("status".into(), "healthy".into());
                data.insert("version".into(), env!("CARGO_PKG_VERSION").into());

                let heartbeat =
                    Envelope::new(MessageType::Heartbeat, data).with_agent_id(agent_id.clone());
                if let Err(e) = transport.send(heartbeat).await {
                    error!(error = %e, "failed to send heartbeat");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn standalone_config(root: &std::path::Path) -> Config {
        let mut config = Config::parse("").unwrap();
        config.storage.data_dir = root.join("data");
        config.storage.temp_dir = root.join("tmp");
        config
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::new(standalone_config(dir.path())).unwrap();

        agent.start().await.unwrap();
        assert!(agent.is_running());
        assert!(matches!(
            agent.start().await,
            Err(AgentError::AlreadyRunning)
        ));

        agent.stop().await.unwrap();
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::new(standalone_config(dir.path())).unwrap();

        agent.stop().await.unwrap();

        agent.start().await.unwrap();
        agent.stop().await.unwrap();
        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn standalone_agent_executes_tasks() {
        use drover_model::{TaskKind, TaskSpec};
        use std::collections::HashMap;

        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::new(standalone_config(dir.path())).unwrap();
        agent.start().await.unwrap();

        let ctx = CancellationToken::new();
        let spec = TaskSpec::new(
            "probe",
            TaskKind::Command {
                command: "/bin/echo".into(),
                args: vec!["standalone".into()],
                env: HashMap::new(),
                working_dir: None,
            },
        )
        .with_timeout(Duration::from_secs(5));

        let result = agent.engine().execute(&ctx, spec).await.unwrap();
        assert_eq!(result.output, "standalone\n");

        agent.stop().await.unwrap();
    }
}
