use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeyholdConfig {
    pub node: NodeConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub db_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the remote login service.
    pub base_url: String,
    /// Base URL of the identity provider (anonymous sessions, token issue,
    /// custom-token exchange).
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
}

fn default_identity_url() -> String {
    "http://localhost:9110".to_string()
}

impl Default for KeyholdConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                db_path: "./data/keyhold".to_string(),
                log_level: "info".to_string(),
            },
            api: ApiConfig {
                base_url: "http://localhost:9100".to_string(),
                identity_url: default_identity_url(),
            },
        }
    }
}

impl KeyholdConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => c,
                    Err(e) => {
                        eprintln!("Error parsing config: {}. Using Defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    eprintln!("Error reading config: {}. Using Defaults.", e);
                    Self::default()
                }
            }
        } else {
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }
}
