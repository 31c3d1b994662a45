use crate::config::Config;
use crate::module::Registry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide application state shared between the server and the CLI.
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub registry: Arc<Registry>,
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<Registry>,
    ) -> (Arc<Self>, tokio::sync::broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(16);

        let state = Arc::new(Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            shutdown_tx,
        });

        (state, shutdown_rx)
    }
}
