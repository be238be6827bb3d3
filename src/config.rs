use std::{env, path::PathBuf};

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub scan_url: String,
    pub scan_interval_minutes: u64,
    pub user_agent: String,
    pub data_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", 3000),
            scan_url: env_or("SCAN_URL", "https://ipscmatch.de"),
            scan_interval_minutes: env_parsed("SCAN_INTERVAL_MINUTES", 60),
            user_agent: env_or("USER_AGENT", "ipscmatch-scanner/1.0 (+local app)"),
            data_file: PathBuf::from(env_or("DATA_FILE", "data/matches.json")),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
