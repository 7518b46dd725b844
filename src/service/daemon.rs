use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::protocol::dispatcher::EngineCore;
use crate::protocol::registry::RegistryBuilder;
use crate::transport::aux::AuxLink;
use crate::transport::local;

/// A fully assembled engine: registry, access policy, optional aux link and
/// the listener settings to serve them with.
pub struct Daemon {
    config: EngineConfig,
    engine: Arc<EngineCore>,
    aux: Option<AuxLink>,
}

impl Daemon {
    /// Validate `config`, freeze the registry and connect the aux link.
    ///
    /// Any registry conflict is returned here, before the socket is bound.
    #[instrument(skip_all, fields(socket_path = %config.server.socket_path.display()))]
    pub async fn build(config: EngineConfig, registry: RegistryBuilder) -> Result<Self> {
        config.validate_strict()?;

        let frame_limit = config.transport.max_payload_size;
        let registry = registry.with_frame_limit(frame_limit).build()?;
        let forwarded = registry
            .command_ids()
            .into_iter()
            .filter(|id| registry.lookup(*id).is_ok_and(|entry| entry.is_forwarded()))
            .count();

        let mut engine =
            EngineCore::new(registry, config.access.policy()).with_frame_limit(frame_limit);

        let aux = match config.aux_link() {
            Some(link_config) => {
                let link = AuxLink::connect(link_config).await;
                engine = engine.with_aux(Arc::new(link.clone()), config.aux.request_timeout);
                Some(link)
            }
            None => {
                if forwarded > 0 {
                    warn!(
                        forwarded,
                        "Forwarded commands registered without an aux socket; they will answer AuxUnreachable"
                    );
                }
                None
            }
        };

        info!(
            commands = engine.registry().len(),
            forwarded,
            aux = aux.is_some(),
            "Engine assembled"
        );

        Ok(Self {
            config,
            engine: Arc::new(engine),
            aux,
        })
    }

    pub fn engine(&self) -> &Arc<EngineCore> {
        &self.engine
    }

    pub fn aux_link(&self) -> Option<&AuxLink> {
        self.aux.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });
        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until `shutdown_rx` fires, then close the aux link.
    pub async fn run_with_shutdown(self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let served =
            local::serve_with_shutdown(&self.config.server, self.engine.clone(), shutdown_rx).await;

        if let Some(aux) = &self.aux {
            aux.shutdown();
        }
        self.engine.metrics().log_metrics();
        served
    }
}
