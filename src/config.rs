use std::time::Duration;

use crate::orchestrator::RetryPolicy;
use crate::util::db::DbSettings;
use crate::util::env::log_config_snapshot;

/// Registered deployment name for the inventory collection flow.
pub const DEPLOYMENT_NAME: &str = "petstore-collection-deployment";

pub const DEFAULT_BASE_URL: &str = "petstore.swagger.io";
pub const DEFAULT_PATH: &str = "/v2/store/inventory";

/// Parameters injected into every run of the collection flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowParams {
    /// Host (optionally `host:port`) of the store API; no scheme.
    pub base_url: String,
    pub path: String,
    pub secure: bool,
    pub db: DbSettings,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            secure: true,
            db: DbSettings::default(),
            retry: RetryPolicy::NONE,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl FlowParams {
    /// Log the effective parameters with credentials masked.
    pub fn log_snapshot(&self) {
        log_config_snapshot(
            DEPLOYMENT_NAME,
            &[
                ("base_url", self.base_url.clone()),
                ("path", self.path.clone()),
                ("secure", self.secure.to_string()),
                ("db_host", self.db.host.clone()),
                ("db_port", self.db.port.to_string()),
                ("db_user", self.db.user.clone()),
                ("db_pass", self.db.password.clone()),
                ("db_name", self.db.dbname.clone()),
                ("task_retries", self.retry.retries.to_string()),
            ],
        );
    }
}
