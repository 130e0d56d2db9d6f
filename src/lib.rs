pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod pipeline;

pub mod database_ops {
    pub mod inventory_history;
    pub mod petstore {
        pub mod provider;
    }
}

pub mod normalization {
    pub mod inventory;
}

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::{FlowParams, DEPLOYMENT_NAME};
pub use error::{PipelineError, Result};
pub use models::{InventoryCounts, RawInventory};
pub use normalization::inventory::normalize;
