use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::num::ParseIntError;

use flagfall_core::{MatchConfig, MatchError};

pub const DEFAULT_ADDR: &str = "0.0.0.0:25917";

/// 服务器配置，从环境变量读取
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub match_config: MatchConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FLAGFALL_ADDR 不是合法的监听地址: {0}")]
    Addr(#[from] AddrParseError),

    #[error("FLAGFALL_HAND_SIZE 不是合法的数字: {0}")]
    HandSizeFormat(#[from] ParseIntError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env::var("FLAGFALL_ADDR").ok(), env::var("FLAGFALL_HAND_SIZE").ok())
    }

    fn from_vars(addr: Option<String>, hand_size: Option<String>) -> Result<Self, ConfigError> {
        let addr = addr.as_deref().unwrap_or(DEFAULT_ADDR).trim().parse()?;
        let match_config = match hand_size {
            Some(raw) => MatchConfig { initial_hand_size: raw.trim().parse()? },
            None => MatchConfig::default(),
        };
        match_config.validate()?;
        Ok(ServerConfig { addr, match_config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_vars(None, None).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR.parse().unwrap());
        assert_eq!(config.match_config, MatchConfig::default());
    }

    #[test]
    fn test_custom_values() {
        let config = ServerConfig::from_vars(Some("127.0.0.1:9000".into()), Some(" 3 ".into())).unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.match_config.initial_hand_size, 3);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(matches!(ServerConfig::from_vars(Some("not-an-addr".into()), None), Err(ConfigError::Addr(_))));
        assert!(matches!(ServerConfig::from_vars(None, Some("five".into())), Err(ConfigError::HandSizeFormat(_))));
        assert!(matches!(
            ServerConfig::from_vars(None, Some("7".into())),
            Err(ConfigError::Match(MatchError::HandSize(7)))
        ));
    }
}
