use serde::Deserialize;
use std::env;

/// How a CBT attempt score lands in the exam component of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CbtScoreMapping {
    /// exam_score = attempt score as graded
    #[default]
    Raw,
    /// exam_score = attempt percentage scaled onto the exam component maximum
    Scaled,
}

impl CbtScoreMapping {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => Some(CbtScoreMapping::Raw),
            "scaled" => Some(CbtScoreMapping::Scaled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub cbt_score_mapping: CbtScoreMapping,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "school_results".to_string(),
            jwt_secret: "dev-secret-only-for-local-testing".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            store_backend: StoreBackend::Mongo,
            cbt_score_mapping: CbtScoreMapping::Raw,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP_)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let store_backend = match settings
            .get_string("database.backend")
            .or_else(|_| env::var("STORE_BACKEND"))
        {
            Ok(value) if value.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Ok(value) if value.eq_ignore_ascii_case("mongo") => StoreBackend::Mongo,
            Ok(value) => {
                return Err(config::ConfigError::Message(format!(
                    "unknown store backend: {}",
                    value
                )))
            }
            Err(_) => defaults.store_backend,
        };

        let cbt_score_mapping = match settings
            .get_string("cbt.score_mapping")
            .or_else(|_| env::var("CBT_SCORE_MAPPING"))
        {
            Ok(value) => CbtScoreMapping::parse(&value).ok_or_else(|| {
                config::ConfigError::Message(format!("unknown cbt score mapping: {}", value))
            })?,
            Err(_) => defaults.cbt_score_mapping,
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            jwt_secret,
            bind_addr,
            store_backend,
            cbt_score_mapping,
        })
    }
}
