use dotenvy::dotenv;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Loads `.env` and routes tracing output through the test harness.
pub fn setup_test_env() {
    INIT.call_once(|| {
        dotenv().ok();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // another harness may already have installed a subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
