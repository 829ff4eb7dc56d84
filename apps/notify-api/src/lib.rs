pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use config::Config;
use dispatch::NotificationDispatcher;
use gateway::{ConnectionRegistry, GatewaySettings, PushGateway};
use store::NotificationStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub gateway: PushGateway,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire a fresh registry, gateway and dispatcher around `store`.
    pub fn new(config: Config, store: Arc<dyn NotificationStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let gateway = PushGateway::new(registry, GatewaySettings::from(&config));
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), gateway.clone()));

        Self {
            store,
            gateway,
            dispatcher,
            config: Arc::new(config),
        }
    }
}
