use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, auth: AuthConfig) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
        }
    }
}
