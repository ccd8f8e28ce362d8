use std::path::PathBuf;
use std::time::Duration;

use rocket::figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Settings read from the `portal` table of the Rocket figment
/// (`Rocket.toml` or `ROCKET_PORTAL`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalConfig {
    pub public_base_url: String,
    pub storage_root: PathBuf,
    pub python: String,
    pub python_packages: Vec<String>,
    pub execution_timeout_secs: u64,
    pub session_hours: i64,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub redirect_base_url: String,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:8000".to_string(),
            storage_root: PathBuf::from("storage"),
            python: "python3".to_string(),
            python_packages: [
                "pandas",
                "numpy",
                "scipy",
                "sklearn",
                "matplotlib",
                "statsmodels",
                "seaborn",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            execution_timeout_secs: 10,
            session_hours: 1,
            oauth: OAuthConfig {
                redirect_base_url: "http://127.0.0.1:8000".to_string(),
                google: None,
                github: None,
            },
        }
    }
}

impl PortalConfig {
    pub fn from_figment(figment: &Figment) -> Self {
        match figment.extract_inner::<PortalConfig>("portal") {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "No usable [portal] configuration, using defaults");
                PortalConfig::default()
            }
        }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs.max(1))
    }

    pub fn session_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_hours.max(1))
    }
}
