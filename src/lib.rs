pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod report;
pub mod routes;
pub mod telemetry;

pub use config::Config;

use std::sync::Arc;

use events::RangeFetchOrchestrator;
use llm::FallbackClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<RangeFetchOrchestrator>,
    pub llm_client: Arc<FallbackClient>,
}
