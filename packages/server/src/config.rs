//! Server configuration.
//!
//! Command-line flags with `HIROBA_*` environment fallbacks, validated into a
//! [`ServerConfig`].

use std::{fmt, path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};
use redis::IntoConnectionInfo;
use thiserror::Error;

use crate::domain::{BrokerError, MessageBroker};
use crate::infrastructure::{
    broker::{InMemoryBroker, RedisBroker, inmemory::DEFAULT_TOPIC_CAPACITY},
    dto::http::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT},
    identity::JwtIdentityVerifier,
};

/// Whether a message is relayed back to the connection that sent it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SenderEcho {
    /// Every member receives the message, the sender included.
    #[default]
    Include,
    /// The originating connection is skipped.
    Exclude,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hiroba-server")]
#[command(about = "Multi-instance WebSocket chat relay server", long_about = None)]
pub struct ServerArgs {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HIROBA_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "HIROBA_PORT", default_value = "8080")]
    pub port: u16,

    /// Shared secret for HS256 identity tokens
    #[arg(long, env = "HIROBA_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// PEM file with the RS256 public key for identity tokens
    #[arg(long, env = "HIROBA_JWT_PUBLIC_KEY")]
    pub jwt_public_key: Option<PathBuf>,

    /// Relay messages back to the sending connection or not
    #[arg(long, env = "HIROBA_SENDER_ECHO", value_enum, default_value_t = SenderEcho::Include)]
    pub sender_echo: SenderEcho,

    /// Number of messages returned by the history API when no limit is given
    #[arg(long, env = "HIROBA_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Redis URL of the shared broker (in-process broker when omitted)
    #[arg(long, env = "HIROBA_BROKER_URL", hide_env_values = true)]
    pub broker_url: Option<String>,

    /// Buffer size of each in-process broker topic
    #[arg(long, env = "HIROBA_BROKER_CAPACITY", default_value_t = DEFAULT_TOPIC_CAPACITY)]
    pub broker_capacity: usize,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, env = "HIROBA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("either --jwt-secret or --jwt-public-key is required")]
    MissingJwtKey,

    #[error("--jwt-secret and --jwt-public-key are mutually exclusive")]
    ConflictingJwtKeys,

    #[error("JWT secret must not be empty")]
    EmptyJwtSecret,

    #[error("failed to read {path}: {reason}")]
    UnreadableKey { path: PathBuf, reason: String },

    #[error("invalid JWT key: {0}")]
    InvalidKey(String),

    #[error("history limit must be between 1 and {max} (got {actual})")]
    InvalidHistoryLimit { max: usize, actual: usize },

    #[error("broker capacity must be greater than 0")]
    InvalidBrokerCapacity,

    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

/// Key material for identity tokens.
#[derive(Clone, PartialEq, Eq)]
pub enum JwtKey {
    Hs256Secret(String),
    Rs256PublicKeyPem(Vec<u8>),
}

impl fmt::Debug for JwtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hs256Secret(_) => f.write_str("Hs256Secret(<redacted>)"),
            Self::Rs256PublicKeyPem(pem) => write!(f, "Rs256PublicKeyPem({} bytes)", pem.len()),
        }
    }
}

impl JwtKey {
    pub fn verifier(&self) -> Result<JwtIdentityVerifier, ConfigError> {
        match self {
            Self::Hs256Secret(secret) => Ok(JwtIdentityVerifier::hs256(secret.as_bytes())),
            Self::Rs256PublicKeyPem(pem) => JwtIdentityVerifier::rs256_pem(pem)
                .map_err(|e| ConfigError::InvalidKey(e.to_string())),
        }
    }
}

/// Where room traffic is published.
#[derive(Clone, PartialEq, Eq)]
pub enum BrokerSettings {
    /// Broker local to this process. Only instances in the same process share rooms.
    InMemory { capacity: usize },
    /// Redis pub/sub shared by every process pointed at the same server.
    Redis { url: String },
}

impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory { capacity } => write!(f, "InMemory {{ capacity: {} }}", capacity),
            // URL はパスワードを含みうるので接続先だけ出す
            Self::Redis { url } => match url.as_str().into_connection_info() {
                Ok(info) => write!(f, "Redis {{ addr: {} }}", info.addr),
                Err(_) => f.write_str("Redis { addr: <invalid> }"),
            },
        }
    }
}

impl BrokerSettings {
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Redis { .. })
    }

    /// Open the configured broker.
    pub async fn connect(&self) -> Result<Arc<dyn MessageBroker>, BrokerError> {
        match self {
            Self::InMemory { capacity } => Ok(Arc::new(InMemoryBroker::new(*capacity))),
            Self::Redis { url } => Ok(Arc::new(RedisBroker::connect(url).await?)),
        }
    }
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_key: JwtKey,
    pub sender_echo: SenderEcho,
    pub history_limit: usize,
    pub broker: BrokerSettings,
    pub log_level: String,
}

impl TryFrom<ServerArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: ServerArgs) -> Result<Self, Self::Error> {
        let jwt_key = match (args.jwt_secret, args.jwt_public_key) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingJwtKeys),
            (None, None) => return Err(ConfigError::MissingJwtKey),
            (Some(secret), None) => {
                if secret.is_empty() {
                    return Err(ConfigError::EmptyJwtSecret);
                }
                JwtKey::Hs256Secret(secret)
            }
            (None, Some(path)) => {
                let pem = std::fs::read(&path).map_err(|e| ConfigError::UnreadableKey {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                JwtKey::Rs256PublicKeyPem(pem)
            }
        };

        if !(1..=MAX_HISTORY_LIMIT).contains(&args.history_limit) {
            return Err(ConfigError::InvalidHistoryLimit {
                max: MAX_HISTORY_LIMIT,
                actual: args.history_limit,
            });
        }
        let broker = match args.broker_url {
            Some(url) => {
                url.as_str()
                    .into_connection_info()
                    .map_err(|e| ConfigError::InvalidBrokerUrl(e.to_string()))?;
                BrokerSettings::Redis { url }
            }
            None => {
                if args.broker_capacity == 0 {
                    return Err(ConfigError::InvalidBrokerCapacity);
                }
                BrokerSettings::InMemory {
                    capacity: args.broker_capacity,
                }
            }
        };

        Ok(Self {
            host: args.host,
            port: args.port,
            jwt_key,
            sender_echo: args.sender_echo,
            history_limit: args.history_limit,
            broker,
            log_level: args.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerArgs {
        ServerArgs::try_parse_from(std::iter::once("hiroba-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults_with_secret() {
        // テスト項目: シークレットだけを指定した場合はデフォルト値で設定が作られる
        // given (前提条件):
        let args = parse(&["--jwt-secret", "s3cret"]);

        // when (操作):
        let config = ServerConfig::try_from(args).unwrap();

        // then (期待する結果):
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_key, JwtKey::Hs256Secret("s3cret".to_string()));
        assert_eq!(config.sender_echo, SenderEcho::Include);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(
            config.broker,
            BrokerSettings::InMemory {
                capacity: DEFAULT_TOPIC_CAPACITY
            }
        );
    }

    #[test]
    fn test_broker_url_selects_redis() {
        // テスト項目: --broker-url を指定すると Redis ブローカーが選ばれる
        // given (前提条件):
        let args = parse(&[
            "--jwt-secret",
            "s",
            "--broker-url",
            "redis://:hunter2@cache.internal:6380/0",
        ]);

        // when (操作):
        let config = ServerConfig::try_from(args).unwrap();
        let printed = format!("{:?}", config.broker);

        // then (期待する結果):
        assert_eq!(
            config.broker,
            BrokerSettings::Redis {
                url: "redis://:hunter2@cache.internal:6380/0".to_string()
            }
        );
        assert!(config.broker.is_shared());
        assert!(printed.contains("cache.internal:6380"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_invalid_broker_url() {
        // テスト項目: Redis として解釈できない URL はエラーになる
        // given (前提条件):
        let args = parse(&["--jwt-secret", "s", "--broker-url", "http://cache.internal"]);

        // when (操作):
        let result = ServerConfig::try_from(args);

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_zero_capacity_is_rejected_only_for_in_memory_broker() {
        // テスト項目: バッファ 0 はプロセス内ブローカーの場合だけエラーになる
        // given (前提条件):
        let in_memory = parse(&["--jwt-secret", "s", "--broker-capacity", "0"]);
        let redis = parse(&[
            "--jwt-secret",
            "s",
            "--broker-capacity",
            "0",
            "--broker-url",
            "redis://127.0.0.1:6379",
        ]);

        // when (操作):
        let in_memory = ServerConfig::try_from(in_memory);
        let redis = ServerConfig::try_from(redis);

        // then (期待する結果):
        assert_eq!(in_memory.err(), Some(ConfigError::InvalidBrokerCapacity));
        assert!(redis.is_ok());
    }

    #[tokio::test]
    async fn test_in_memory_broker_connects_without_server() {
        // テスト項目: プロセス内ブローカーは外部サーバーなしで開ける
        // given (前提条件):
        let settings = BrokerSettings::InMemory { capacity: 8 };

        // when (操作):
        let broker = settings.connect().await.unwrap();
        let receivers = broker.publish("chat_channel:1", "x".to_string()).await.unwrap();

        // then (期待する結果):
        assert!(!settings.is_shared());
        assert_eq!(receivers, 0);
    }

    #[tokio::test]
    async fn test_unreachable_redis_broker_fails_to_connect() {
        // テスト項目: 到達できない Redis を指定すると接続時にエラーになる
        // given (前提条件):
        let settings = BrokerSettings::Redis {
            url: "redis://127.0.0.1:1/".to_string(),
        };

        // when (操作):
        let result = settings.connect().await;

        // then (期待する結果):
        assert!(matches!(result, Err(BrokerError::Unavailable(_))));
    }

    #[test]
    fn test_sender_echo_exclude() {
        // テスト項目: --sender-echo exclude が読み取られる
        // given (前提条件):
        let args = parse(&["--jwt-secret", "s", "--sender-echo", "exclude", "-p", "0"]);

        // when (操作):
        let config = ServerConfig::try_from(args).unwrap();

        // then (期待する結果):
        assert_eq!(config.sender_echo, SenderEcho::Exclude);
        assert_eq!(config.port, 0);
    }

    #[test]
    fn test_missing_jwt_key() {
        // テスト項目: JWT の鍵が指定されていない場合はエラーになる
        // given (前提条件):
        let mut args = parse(&[]);
        args.jwt_secret = None;
        args.jwt_public_key = None;

        // when (操作):
        let result = ServerConfig::try_from(args);

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::MissingJwtKey)));
    }

    #[test]
    fn test_conflicting_jwt_keys() {
        // テスト項目: シークレットと公開鍵の両方を指定するとエラーになる
        // given (前提条件):
        let args = parse(&["--jwt-secret", "s", "--jwt-public-key", "/tmp/key.pem"]);

        // when (操作):
        let result = ServerConfig::try_from(args);

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::ConflictingJwtKeys)));
    }

    #[test]
    fn test_unreadable_public_key() {
        // テスト項目: 読み込めない公開鍵ファイルはエラーになる
        // given (前提条件):
        let mut args = parse(&[]);
        args.jwt_secret = None;
        args.jwt_public_key = Some(PathBuf::from("/nonexistent/hiroba/key.pem"));

        // when (操作):
        let result = ServerConfig::try_from(args);

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::UnreadableKey { .. })));
    }

    #[test]
    fn test_history_limit_out_of_range() {
        // テスト項目: 上限を超える履歴件数はエラーになる
        // given (前提条件):
        let args = parse(&["--jwt-secret", "s", "--history-limit", "501"]);

        // when (操作):
        let result = ServerConfig::try_from(args);

        // then (期待する結果):
        assert_eq!(
            result.err(),
            Some(ConfigError::InvalidHistoryLimit {
                max: MAX_HISTORY_LIMIT,
                actual: 501,
            })
        );
    }

    #[test]
    fn test_invalid_sender_echo_value() {
        // テスト項目: 未知の sender-echo 値はパースエラーになる
        // given (前提条件):
        let argv = ["hiroba-server", "--jwt-secret", "s", "--sender-echo", "maybe"];

        // when (操作):
        let result = ServerArgs::try_parse_from(argv);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_jwt_key_debug_hides_secret() {
        // テスト項目: Debug 出力にシークレットが含まれない
        // given (前提条件):
        let key = JwtKey::Hs256Secret("top-secret".to_string());

        // when (操作):
        let printed = format!("{:?}", key);

        // then (期待する結果):
        assert!(!printed.contains("top-secret"));
    }
}
