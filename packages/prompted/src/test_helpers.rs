use std::time::Duration;

use crate::AppState;
use crate::config::PromptedConfig;

pub const TEST_SECRET: &str = "8181";

/// Config with a fixed secret and the default debounce window.
pub fn test_config() -> PromptedConfig {
    PromptedConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        static_dir: None,
        secret: TEST_SECRET.to_string(),
        secret_generated: false,
        debounce: Duration::from_secs(3),
        event_capacity: 16,
    }
}

/// Build a fully-wired `AppState` with no observers attached.
pub fn test_app_state() -> AppState {
    AppState::new(test_config())
}
