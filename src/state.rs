use std::sync::Arc;

use crate::services::batch_coordinator::BatchCoordinator;
use crate::services::filing_pipeline::FilingPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FilingPipeline>,
    pub coordinator: Arc<BatchCoordinator>,
}
