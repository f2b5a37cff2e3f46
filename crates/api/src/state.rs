use std::sync::Arc;

use vigil_cdc::CdcListener;

use crate::config::ServerConfig;

/// State shared by every handler, cloned per request. All fields are cheap
/// handles over the actual resources.
#[derive(Clone)]
pub struct AppState {
    pub pool: vigil_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Handle to the CDC dispatch loop, read by the health endpoint.
    pub cdc: Arc<CdcListener>,
}
