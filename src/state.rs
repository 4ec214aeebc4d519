use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::Catalog;
use crate::engine::session::Session;
use crate::llm::service::PhotoService;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub service: Arc<dyn PhotoService>,
}

impl AppState {
    pub fn new(catalog: Catalog, service: Arc<dyn PhotoService>) -> Self {
        AppState {
            session: Arc::new(Mutex::new(Session::new(catalog))),
            service,
        }
    }
}
