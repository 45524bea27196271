// Oxidized Travel - multi-agent conversation router for travel planning

pub mod agents;
pub mod config;
pub mod context;
pub mod db;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod places;
pub mod router;
pub mod routes;
pub mod streaming;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

use std::sync::Arc;

use context::{ContextAssembler, ConversationStore};
use llm::{LlmGateway, TextGenerator};
use models::ServiceInfo;
use places::PlacesGateway;
use router::IntentRouter;

/// Wire the shared state from already-built gateways and store
pub fn build_state(
    config: Config,
    llm: LlmGateway,
    places: PlacesGateway,
    store: Arc<dyn ConversationStore>,
) -> AppState {
    let info = ServiceInfo {
        llm_providers: llm.providers(),
        places_providers: places.providers().into_iter().map(String::from).collect(),
        store: store.kind().to_string(),
    };

    let generator: Arc<dyn TextGenerator> = Arc::new(llm);
    let router = IntentRouter::new(&config.router, generator, Arc::new(places));
    let assembler = ContextAssembler::new(store.clone(), config.router.history_window);

    AppState {
        config: Arc::new(config),
        router: Arc::new(router),
        assembler: Arc::new(assembler),
        store,
        info: Arc::new(info),
    }
}

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
