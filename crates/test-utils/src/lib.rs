pub mod journal;
pub mod probe;

pub use journal::Journal;
pub use probe::Probe;

// Re-exported for the rule-declaring macros.
pub use anyhow;
pub use async_trait;
pub use rulekit;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Upper bound for a single async engine run in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured by the harness and shown for failing tests only
/// (or with `-- --nocapture`). The filter comes from `RUST_LOG`, e.g.
/// `RUST_LOG=rulekit=debug cargo test`; engine logs at `info` otherwise.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,rulekit=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`]. Catches
/// engine runs that never join their parallel tasks.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("engine run did not finish within {TEST_TIMEOUT:?}"))
}
