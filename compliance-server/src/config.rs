use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

pub const DEFAULT_API_KEY: &str = "dev_local";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Secret partagé attendu dans `X-API-Key` (vide = tout refuser)
    pub api_key: String,
    pub db_path: String,
    /// false = rapports gardés en mémoire seulement
    pub persist: bool,
    pub body_limit_bytes: usize,
    pub history: HistoryLimits,
}

/// Nombre max d'entrées d'historique par surface
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryLimits {
    pub api: usize,
    pub admin: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self { api: 500, admin: 200 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            api_key: DEFAULT_API_KEY.into(),
            db_path: "./data/db.json".into(),
            persist: true,
            body_limit_bytes: 256 * 1024,
            history: HistoryLimits::default(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Surcharges d'environnement (PORT, HOST, API_KEY, DB_PATH).
    /// `lookup` abstrait `std::env::var` pour les tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.port = p,
                Err(_) => warn!("[config] ignoring invalid PORT={port}"),
            }
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(key) = lookup("API_KEY") {
            self.api_key = key;
        }
        if let Some(path) = lookup("DB_PATH") {
            self.db_path = path;
        }
    }
}

/// YAML -> config, texte vide = défauts
pub fn parse_config(txt: &str) -> Result<ServerConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(ServerConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> ServerConfig {
    let path = std::env::var("COMPLIANCE_CONFIG").unwrap_or_else(|_| "compliance.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!("[config] invalid {path}: {e}, using defaults");
            ServerConfig::default()
        })
    } else {
        tracing::info!("[config] no {path}, using defaults");
        ServerConfig::default()
    };
    cfg.apply_env(|k| std::env::var(k).ok());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let cfg = parse_config("  \n").unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.history, HistoryLimits { api: 500, admin: 200 });
        assert_eq!(cfg.listen_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let cfg = parse_config("port: 8080\nhistory:\n  admin: 50\n").unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.history, HistoryLimits { api: 500, admin: 50 });
        assert_eq!(cfg.api_key, DEFAULT_API_KEY);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(parse_config("port: [not a number").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [("PORT", "4000"), ("API_KEY", "s3cret"), ("DB_PATH", "/tmp/x.json")].into();
        let mut cfg = ServerConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.api_key, "s3cret");
        assert_eq!(cfg.db_path, "/tmp/x.json");
        assert_eq!(cfg.host, "0.0.0.0");
    }

    #[test]
    fn test_bad_port_is_ignored() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env(|k| (k == "PORT").then(|| "http".to_string()));
        assert_eq!(cfg.port, 3000);
    }
}
