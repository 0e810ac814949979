//! Tracing for tests.

use std::sync::Once;

use jig_telemetry::LogConfig;

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness's captured writer.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        // Another subscriber may already be installed by the test binary.
        let _ = LogConfig::for_tests("warn").init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_test_logging();
        init_test_logging();
        tracing::warn!(target: "jig_test", "captured by the harness");
        assert!(LogConfig::for_tests("warn").init().is_err());
    }
}
