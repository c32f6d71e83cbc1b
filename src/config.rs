use std::{fs::File, io::Read};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub logging: Logging,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Server {
    #[serde(default = "Server::default_address")]
    pub address: String,
}

impl Server {
    fn default_address() -> String {
        "127.0.0.1:8000".into()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
        }
    }
}

/// Response logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Logging {
    /// Maximum number of response body bytes to log. Bodies are not logged
    /// when this is 0
    #[serde(default)]
    pub body_limit: usize,
}

impl Config {
    pub fn parse(path: &str) -> Result<Self, anyhow::Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config = serde_yaml::from_str::<'_, Config>(&contents)?;

        Ok(config)
    }
}
