// Common test utilities

use std::sync::Arc;
use std::time::Duration;

use engine_core::domains::reconciliation::{EngineSettings, ReconciliationEngine};
use engine_core::kernel::InMemoryEntityStore;

/// Settings tuned for tests: small fan-out, no location caching so stores
/// can be mutated between calls.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        max_concurrent_checks: 4,
        store_timeout: Duration::from_secs(2),
        location_cache_ttl: Duration::ZERO,
    }
}

pub fn engine(store: Arc<InMemoryEntityStore>) -> ReconciliationEngine {
    ReconciliationEngine::new(store, test_settings())
}
