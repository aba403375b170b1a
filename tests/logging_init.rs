//! Global subscriber installation. Kept in its own test binary because the subscriber
//! is process-wide.

use miniscope::config::ScopeConfig;
use miniscope::logging::{self, OutputFormat, TracingConfig};

#[test]
fn test_init_is_idempotent() {
    let config = TracingConfig::default().with_format(OutputFormat::Json);
    assert!(logging::init(config.clone()).is_ok());
    assert!(logging::init(config).is_ok());
    assert!(logging::init_from_config(&ScopeConfig::default()).is_ok());
    assert!(tracing::dispatcher::has_been_set());
}
