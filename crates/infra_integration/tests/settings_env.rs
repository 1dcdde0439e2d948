//! Environment loading lives in its own binary because env vars are
//! process-global and the other suites run multi-threaded.

use std::io::Cursor;
use std::time::Duration;

use core_kernel::AuthConfig;
use infra_integration::{IntegrationSettings, IntegrationType};

const ENV_FILE: &str = "\
CAREFLOW_INTEGRATION_NAME=clearinghouse
CAREFLOW_INTEGRATION_INTEGRATION_TYPE=x12
CAREFLOW_INTEGRATION_ENDPOINT=https://edi.example.com/gateway
CAREFLOW_INTEGRATION_TIMEOUT_SECS=20
CAREFLOW_INTEGRATION_AUTH_TYPE=basic
CAREFLOW_INTEGRATION_USERNAME=submitter
CAREFLOW_INTEGRATION_PASSWORD=hunter2
CAREFLOW_INTEGRATION_RETRY_MAX_ATTEMPTS=4
";

#[test]
fn test_settings_load_from_dotenv_style_environment() {
    dotenvy::from_read(Cursor::new(ENV_FILE)).unwrap();

    let settings = IntegrationSettings::from_env().unwrap();
    assert_eq!(settings.name, "clearinghouse");
    assert_eq!(settings.auth_type, "basic");

    let config = settings.into_config().unwrap();
    assert_eq!(config.integration_type, IntegrationType::X12);
    assert_eq!(config.endpoint, "https://edi.example.com/gateway");
    assert_eq!(config.timeout, Duration::from_secs(20));
    assert_eq!(config.retry.max_attempts, 4);
    assert!(matches!(config.auth, AuthConfig::Basic { ref username, .. }
        if username == "submitter"));
}
