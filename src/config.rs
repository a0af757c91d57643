//! Node configuration: network identity, storage, networking, mining/
//! retarget parameters, and logging. Loaded from / saved to TOML, the way
//! the teacher's config layer does it.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::consensus::{MAX_TARGET_COMPACT, MIN_TARGET_COMPACT};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NetworkType {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl NetworkType {
    pub fn default_port(&self) -> u16 {
        match self {
            NetworkType::Mainnet => 8333,
            NetworkType::Testnet => 18333,
            NetworkType::Regtest => 18444,
        }
    }

    pub fn network_id(&self) -> u32 {
        match self {
            NetworkType::Mainnet => 1,
            NetworkType::Testnet => 2,
            NetworkType::Regtest => 3,
        }
    }

    pub fn genesis_timestamp(&self) -> u32 {
        match self {
            NetworkType::Mainnet => 1_700_000_000,
            NetworkType::Testnet | NetworkType::Regtest => 1_700_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    pub max_cache_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_cache_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    pub connection_timeout: Duration,
    pub peer_discovery_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8333".parse().unwrap(),
            max_connections: 125,
            connection_timeout: Duration::from_secs(30),
            peer_discovery_interval: Duration::from_secs(300),
        }
    }
}

/// Mining + the per-block difficulty retarget schedule (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    pub enabled: bool,
    pub target_spacing_secs: u64,
    pub min_target_compact: u32,
    pub max_target_compact: u32,
    pub genesis_difficulty_compact: u32,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_spacing_secs: 10,
            min_target_compact: MIN_TARGET_COMPACT,
            max_target_compact: MAX_TARGET_COMPACT,
            genesis_difficulty_compact: 0x1f00_ffff,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<PathBuf>,
    pub enable_console: bool,
    pub enable_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: Some(PathBuf::from("logs/node.log")),
            enable_console: true,
            enable_file: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkType,
    pub data_dir: PathBuf,
    pub user_agent: String,
    pub database: DatabaseConfig,
    pub network_config: NetworkConfig,
    pub mining: MiningConfig,
    pub logging: LoggingConfig,
    pub max_pending_pool_size: usize,
    pub sync_no_progress_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("./data"))
            .join("chaind");

        Self {
            network: NetworkType::Mainnet,
            data_dir,
            user_agent: "chaind/0.1.0".to_string(),
            database: DatabaseConfig::default(),
            network_config: NetworkConfig::default(),
            mining: MiningConfig::default(),
            logging: LoggingConfig::default(),
            max_pending_pool_size: 10_000,
            sync_no_progress_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn new(network: NetworkType, data_dir: Option<PathBuf>) -> Self {
        let mut config = Self {
            network,
            ..Self::default()
        };

        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }

        match config.network {
            NetworkType::Testnet | NetworkType::Regtest => {
                config.network_config.listen_addr =
                    format!("0.0.0.0:{}", config.network.default_port())
                        .parse()
                        .unwrap();
                if config.network == NetworkType::Regtest {
                    config.mining.genesis_difficulty_compact = 0x207f_ffff;
                    config.mining.enabled = true;
                }
            }
            NetworkType::Mainnet => {}
        }

        config
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn get_data_subdir(&self, subdir: &str) -> PathBuf {
        self.data_dir.join(subdir)
    }

    pub fn get_chainstate_dir(&self) -> PathBuf {
        self.get_data_subdir("chainstate")
    }

    pub fn get_logs_dir(&self) -> PathBuf {
        self.get_data_subdir("logs")
    }

    pub fn get_config_file(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("serialize error: {0}")]
    Serialize(String),
}

pub fn create_default_config(network: NetworkType) -> Result<Config, ConfigError> {
    let config = Config::new(network, None);

    std::fs::create_dir_all(&config.data_dir).map_err(|e| ConfigError::Io(e.to_string()))?;
    for dir in ["chainstate", "logs"] {
        std::fs::create_dir_all(config.get_data_subdir(dir))
            .map_err(|e| ConfigError::Io(e.to_string()))?;
    }

    let config_path = config.get_config_file();
    config.to_file(&config_path)?;

    Ok(config)
}
