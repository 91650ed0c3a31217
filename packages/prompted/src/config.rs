use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// File config (figment-deserialized from defaults / prompted.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   prompted.toml:   [tracker]
//                    secret = "8181"
//
//   env var:         PROMPTED_TRACKER__SECRET=8181   (double underscore = nesting)
//
//   (single underscore stays within field names: PROMPTED_TRACKER__DEBOUNCE_MS)

/// Upper bound (exclusive) for generated secrets
const SECRET_RANGE: u32 = 81818181;

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub tracker: TrackerFileConfig,
    #[serde(default)]
    pub hub: HubFileConfig,
}

/// Listener settings (lives under `[server]` in prompted.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serve this directory at `/` instead of the built-in page
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

/// Tracker settings (lives under `[tracker]` in prompted.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerFileConfig {
    /// Shared secret the responder must present. Generated when unset.
    #[serde(default, deserialize_with = "secret_from_string_or_number")]
    pub secret: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for TrackerFileConfig {
    fn default() -> Self {
        Self {
            secret: None,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Hub settings (lives under `[hub]` in prompted.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubFileConfig {
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for HubFileConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8182
}
fn default_debounce_ms() -> u64 {
    prompt_hub::tracker::DEFAULT_DEBOUNCE.as_millis() as u64
}
fn default_event_capacity() -> usize {
    prompt_hub::hub::DEFAULT_EVENT_CAPACITY
}

// Numeric-looking env values (PROMPTED_TRACKER__SECRET=8181) arrive as
// integers, so accept either form.
fn secret_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Secret {
        Text(String),
        Number(u64),
    }

    Ok(
        Option::<Secret>::deserialize(deserializer)?.map(|secret| match secret {
            Secret::Text(text) => text,
            Secret::Number(n) => n.to_string(),
        }),
    )
}

/// Build a figment that layers: defaults → prompted.toml → PROMPTED_* env vars.
///
/// A missing config file is not an error; its layer is simply empty.
///
/// Env vars use double-underscore for nesting into sections:
///   `PROMPTED_SERVER__PORT=9000`  →  `server.port = 9000`
///   `PROMPTED_HUB__EVENT_CAPACITY=64`  →  `hub.event_capacity = 64`
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("PROMPTED_").split("__"))
}

/// Values given on the command line; each one wins over every other layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secret: Option<String>,
    pub static_dir: Option<PathBuf>,
}

// =============================================================================
// Runtime config (resolved once at startup, shared read-only)
// =============================================================================

#[derive(Clone, Debug)]
pub struct PromptedConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub secret: String,
    /// True when no secret was configured and one was made up at startup
    pub secret_generated: bool,
    pub debounce: Duration,
    pub event_capacity: usize,
}

impl PromptedConfig {
    pub fn resolve(file: FileConfig, cli: CliOverrides) -> Self {
        let configured = cli.secret.or(file.tracker.secret).filter(|s| !s.is_empty());
        let secret_generated = configured.is_none();

        Self {
            host: cli.host.unwrap_or(file.server.host),
            port: cli.port.unwrap_or(file.server.port),
            static_dir: cli.static_dir.or(file.server.static_dir),
            secret: configured.unwrap_or_else(generate_secret),
            secret_generated,
            debounce: Duration::from_millis(file.tracker.debounce_ms),
            event_capacity: file.hub.event_capacity,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Random numeric secret for runs without a configured one
pub fn generate_secret() -> String {
    rand::rng().random_range(0..SECRET_RANGE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 8182);
        assert!(fc.server.static_dir.is_none());
        assert!(fc.tracker.secret.is_none());
        assert_eq!(fc.tracker.debounce_ms, 3000);
        assert_eq!(fc.hub.event_capacity, 256);
    }

    #[test]
    fn test_load_config_without_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("prompted.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.server.port, 8182);
        assert_eq!(fc.tracker.debounce_ms, 3000);
    }

    #[test]
    fn test_load_config_from_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prompted.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9001\nstatic_dir = \"public\"\n\n[tracker]\nsecret = \"hunter2\"\ndebounce_ms = 500\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.port, 9001);
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.static_dir, Some(PathBuf::from("public")));
        assert_eq!(fc.tracker.secret.as_deref(), Some("hunter2"));
        assert_eq!(fc.tracker.debounce_ms, 500);
        assert_eq!(fc.hub.event_capacity, 256);
    }

    #[test]
    fn test_numeric_secret_in_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prompted.toml");
        std::fs::write(&path, "[tracker]\nsecret = 8181\n").unwrap();

        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.tracker.secret.as_deref(), Some("8181"));
    }

    #[test]
    fn test_resolve_cli_wins() {
        let mut fc = FileConfig::default();
        fc.tracker.secret = Some("from-file".to_string());
        fc.server.port = 9001;

        let config = PromptedConfig::resolve(
            fc,
            CliOverrides {
                host: Some("127.0.0.1".to_string()),
                secret: Some("from-cli".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9001);
        assert_eq!(config.secret, "from-cli");
        assert!(!config.secret_generated);
        assert_eq!(config.bind_addr(), "127.0.0.1:9001");
    }

    #[test]
    fn test_resolve_generates_missing_secret() {
        let config = PromptedConfig::resolve(FileConfig::default(), CliOverrides::default());
        assert!(config.secret_generated);
        let n: u32 = config.secret.parse().unwrap();
        assert!(n < SECRET_RANGE);
        assert_eq!(config.debounce, Duration::from_secs(3));
    }

    #[test]
    fn test_empty_secret_counts_as_unset() {
        let config = PromptedConfig::resolve(
            FileConfig::default(),
            CliOverrides {
                secret: Some(String::new()),
                ..Default::default()
            },
        );
        assert!(config.secret_generated);
        assert!(!config.secret.is_empty());
    }
}
