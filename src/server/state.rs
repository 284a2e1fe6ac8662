//! Server application state shared across handlers

use crate::config::AppConfig;
use crate::pipeline::Driver;
use crate::shutdown::ShutdownState;
use std::sync::Arc;

/// Shared state for the server: the research driver plus the runtime
/// configuration it was built from.
#[derive(Clone)]
pub struct ServerAppState {
    /// Runtime configuration assembled at startup
    pub config: Arc<AppConfig>,

    /// Research pipeline driver
    pub driver: Arc<Driver>,

    /// Shutdown state
    pub shutdown_state: ShutdownState,
}

impl ServerAppState {
    /// Create server state from validated configuration
    pub fn new(config: AppConfig, shutdown_state: ShutdownState) -> Self {
        let driver = Arc::new(Driver::new(&config));
        Self {
            config: Arc::new(config),
            driver,
            shutdown_state,
        }
    }

    /// Create with a pre-built driver (tests substitute stub components)
    pub fn with_driver(
        config: AppConfig,
        driver: Arc<Driver>,
        shutdown_state: ShutdownState,
    ) -> Self {
        Self {
            config: Arc::new(config),
            driver,
            shutdown_state,
        }
    }
}
