use std::path::Path;

use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://portal.db?mode=rwc";

/// Loads the layered env files for the active profile. Later files override
/// earlier ones; missing files are skipped.
pub fn load_environment() -> Result<(), dotenvy::Error> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string())
            == "production";

    let profile_file = if is_production {
        "config/prod.env"
    } else {
        "config/dev.env"
    };

    for env_file in ["config/common.env", profile_file, ".secrets.env"] {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), dotenvy::Error> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

pub fn database_url() -> String {
    match dotenvy::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            warn!("DATABASE_URL not set, falling back to {}", DEFAULT_DATABASE_URL);
            DEFAULT_DATABASE_URL.to_string()
        }
    }
}
