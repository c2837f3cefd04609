//! Startup sequencing
//!
//! Deploys the database component, waits for it to report readiness, then
//! deploys each front instance. The first failure aborts the whole start;
//! nothing after it is deployed.

use async_trait::async_trait;
use uuid::Uuid;

use crate::bus::EventBus;

/// Error returned by a component that failed to start
pub type ComponentError = Box<dyn std::error::Error + Send + Sync>;

/// Something the bootstrap can deploy onto the bus
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve once the component is ready to serve.
    async fn start(&self, bus: &EventBus) -> Result<(), ComponentError>;
}

/// A successfully started component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub id: Uuid,
    pub component: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to deploy {component}: {source}")]
    Deploy {
        component: String,
        #[source]
        source: ComponentError,
    },
}

impl BootstrapError {
    /// Name of the component that failed
    pub fn component(&self) -> &str {
        match self {
            BootstrapError::Deploy { component, .. } => component,
        }
    }
}

pub struct Bootstrap {
    bus: EventBus,
}

impl Bootstrap {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start one component and wait for readiness.
    pub async fn deploy(&self, component: &dyn Component) -> Result<Deployment, BootstrapError> {
        let name = component.name().to_owned();
        tracing::debug!(component = %name, "Deploying");

        component.start(&self.bus).await.map_err(|source| {
            tracing::error!(component = %name, error = %source, "Deployment failed");
            BootstrapError::Deploy {
                component: name.clone(),
                source,
            }
        })?;

        let deployment = Deployment {
            id: Uuid::new_v4(),
            component: name,
        };
        tracing::info!(
            component = %deployment.component,
            deployment_id = %deployment.id,
            "Deployed"
        );
        Ok(deployment)
    }

    /// Deploy `database`, then every front instance in order.
    pub async fn run(
        &self,
        database: &dyn Component,
        fronts: &[&dyn Component],
    ) -> Result<Vec<Deployment>, BootstrapError> {
        let mut deployments = vec![self.deploy(database).await?];
        for front in fronts {
            deployments.push(self.deploy(*front).await?);
        }
        Ok(deployments)
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Probe {
        name: &'static str,
        fail: bool,
        starts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Component for Probe {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self, _bus: &EventBus) -> Result<(), ComponentError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    fn probe(name: &'static str, fail: bool) -> (Probe, Arc<AtomicUsize>) {
        let starts = Arc::new(AtomicUsize::new(0));
        (
            Probe {
                name,
                fail,
                starts: Arc::clone(&starts),
            },
            starts,
        )
    }

    #[tokio::test]
    async fn deploys_database_then_fronts() {
        let bootstrap = Bootstrap::new(EventBus::new());
        let (db, _) = probe("db", false);
        let (front_a, _) = probe("front", false);
        let (front_b, _) = probe("front", false);

        let deployments = bootstrap.run(&db, &[&front_a, &front_b]).await.unwrap();

        let names: Vec<&str> = deployments.iter().map(|d| d.component.as_str()).collect();
        assert_eq!(names, vec!["db", "front", "front"]);
        assert_ne!(deployments[1].id, deployments[2].id);
    }

    #[tokio::test]
    async fn database_failure_skips_front() {
        let bootstrap = Bootstrap::new(EventBus::new());
        let (db, _) = probe("db", true);
        let (front, front_starts) = probe("front", false);

        let err = bootstrap.run(&db, &[&front]).await.unwrap_err();

        assert_eq!(err.component(), "db");
        assert!(err.to_string().contains("boom"));
        assert_eq!(front_starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn front_failure_fails_startup() {
        let bootstrap = Bootstrap::new(EventBus::new());
        let (db, db_starts) = probe("db", false);
        let (front, _) = probe("front", true);

        let err = bootstrap.run(&db, &[&front]).await.unwrap_err();

        assert_eq!(err.component(), "front");
        assert_eq!(db_starts.load(Ordering::SeqCst), 1);
    }
}
