use crate::shell::context::ApplicationContext;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ApplicationContext>,
}

impl AppState {
    pub fn new(context: Arc<ApplicationContext>) -> Self {
        Self { context }
    }
}
