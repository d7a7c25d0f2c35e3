// src/server/state.rs

use crate::supervisor::DetectorSupervisor;
use crate::types::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<DetectorSupervisor>,
    pub config: Arc<Config>,
}
