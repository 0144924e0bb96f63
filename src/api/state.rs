use crate::registry::Registry;
use crate::storage::Store;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: Registry,
    pub supervisor: Supervisor,
}
