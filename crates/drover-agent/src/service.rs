use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use drover_engine::Engine;
use drover_fileops::FileOpsManager;

use crate::error::AgentError;

/// A sub-service owned by the supervisor. Started in registration order,
/// stopped in reverse order.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self) -> Result<(), AgentError>;
    async fn stop(&self) -> Result<(), AgentError>;
}

pub(crate) struct EngineService(pub Arc<Engine>);

#[async_trait]
impl Service for EngineService {
    fn name(&self) -> &'static str {
        "engine"
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.0.start().map_err(AgentError::from)
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.0.stop().await;
        Ok(())
    }
}

pub(crate) struct FileOpsService(pub Arc<FileOpsManager>);

#[async_trait]
impl Service for FileOpsService {
    fn name(&self) -> &'static str {
        "fileops"
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.0.start().map_err(AgentError::from)
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.0.stop().await;
        Ok(())
    }
}

/// Start services in order. On failure, stop the already-started prefix in
/// reverse order before reporting the failure.
pub(crate) async fn start_all(services: &[Arc<dyn Service>]) -> Result<(), AgentError> {
    for (index, service) in services.iter().enumerate() {
        info!(service = service.name(), "starting service");
        if let Err(e) = service.start().await {
            error!(service = service.name(), error = %e, "failed to start service");
            stop_all(&services[..index]).await;
            return Err(AgentError::StartFailed {
                service: service.name().to_string(),
                reason: e.to_string(),
            });
        }
        info!(service = service.name(), "service started");
    }
    Ok(())
}

/// Stop services in reverse order, logging failures but never short-circuiting.
pub(crate) async fn stop_all(services: &[Arc<dyn Service>]) {
    for service in services.iter().rev() {
        info!(service = service.name(), "stopping service");
        if let Err(e) = service.stop().await {
            error!(service = service.name(), error = %e, "error stopping service");
        } else {
            info!(service = service.name(), "service stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records start/stop calls into a shared journal.
    struct Recording {
        name: &'static str,
        fail_start: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Service for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn start(&self) -> Result<(), AgentError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("start:{}", self.name));
            if self.fail_start {
                Err(AgentError::StartFailed {
                    service: self.name.to_string(),
                    reason: "boom".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn stop(&self) -> Result<(), AgentError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    fn recording(
        name: &'static str,
        fail_start: bool,
        journal: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Service> {
        Arc::new(Recording {
            name,
            fail_start,
            journal: Arc::clone(journal),
        })
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let services = vec![
            recording("a", false, &journal),
            recording("b", false, &journal),
            recording("c", false, &journal),
        ];

        start_all(&services).await.unwrap();
        stop_all(&services).await;

        let log = journal.lock().unwrap().clone();
        assert_eq!(
            log,
            vec!["start:a", "start:b", "start:c", "stop:c", "stop:b", "stop:a"]
        );
    }

    #[tokio::test]
    async fn start_failure_unwinds_started_prefix() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let services = vec![
            recording("a", false, &journal),
            recording("b", true, &journal),
            recording("c", false, &journal),
        ];

        let err = start_all(&services).await.unwrap_err();
        assert!(matches!(err, AgentError::StartFailed { service, .. } if service == "b"));

        // Only "a" was started, so only "a" is stopped, and "c" is never touched.
        let log = journal.lock().unwrap().clone();
        assert_eq!(log, vec!["start:a", "start:b", "stop:a"]);
    }
}
