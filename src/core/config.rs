//! Environment-driven configuration for both subcommands.
//!
//! Both tools are periodic jobs wired up by schedulers and CI, so all
//! connection info and thresholds come from the environment, never from
//! positional arguments. Missing required variables fail fast with exit
//! code 2 before any I/O happens.

use std::env;

use crate::core::error::DriftgateError;

/// Default Qdrant collection holding decision points.
pub const DEFAULT_COLLECTION: &str = "akashi_decisions";
/// Qdrant REST port. Scroll goes over REST even when the configured
/// endpoint names the gRPC port.
const QDRANT_REST_PORT: u16 = 6333;
/// Conventional Qdrant gRPC port, auto-mapped to the REST port.
const QDRANT_GRPC_PORT: u16 = 6334;

/// Connection settings for the standalone reconciler.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub database_url: String,
    pub qdrant: QdrantConfig,
}

/// Connection settings for one Qdrant endpoint.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Normalized REST base, e.g. `http://localhost:6333`.
    pub base_url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

/// Connection settings plus thresholds for the durability gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub database_url: String,
    /// Present iff QDRANT_URL is set; absence skips the drift check.
    pub qdrant: Option<QdrantConfig>,
    pub thresholds: GateThresholds,
}

#[derive(Debug, Clone)]
pub struct GateThresholds {
    pub max_dead_letters: i64,
    pub max_outbox_oldest_seconds: i64,
    pub retain_days: i32,
    pub strict_retention: bool,
}

impl Default for GateThresholds {
    fn default() -> Self {
        GateThresholds {
            max_dead_letters: 0,
            max_outbox_oldest_seconds: 1800,
            retain_days: 90,
            strict_retention: false,
        }
    }
}

impl ReconcileConfig {
    pub fn from_env() -> Result<Self, DriftgateError> {
        let database_url = require_env("DATABASE_URL")?;
        let qdrant_url = require_env("QDRANT_URL")?;
        Ok(ReconcileConfig {
            database_url,
            qdrant: QdrantConfig {
                base_url: qdrant_rest_base(&qdrant_url)?,
                collection: env_or("QDRANT_COLLECTION", DEFAULT_COLLECTION),
                api_key: env::var("QDRANT_API_KEY").ok().filter(|v| !v.is_empty()),
            },
        })
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self, DriftgateError> {
        let database_url = require_env("DATABASE_URL")?;
        let qdrant = match env::var("QDRANT_URL").ok().filter(|v| !v.is_empty()) {
            Some(raw) => Some(QdrantConfig {
                base_url: qdrant_rest_base(&raw)?,
                collection: env_or("QDRANT_COLLECTION", DEFAULT_COLLECTION),
                api_key: env::var("QDRANT_API_KEY").ok().filter(|v| !v.is_empty()),
            }),
            None => None,
        };
        Ok(GateConfig {
            database_url,
            qdrant,
            thresholds: GateThresholds {
                max_dead_letters: env_int("MAX_DEAD_LETTERS", 0),
                max_outbox_oldest_seconds: env_int("MAX_OUTBOX_OLDEST_SECONDS", 1800),
                retain_days: env_i32("RETAIN_DAYS", 90),
                strict_retention: env_bool("STRICT_RETENTION_CHECK", false),
            },
        })
    }
}

/// Normalize a configured Qdrant endpoint to its REST base URL.
///
/// Accepts `https://host:6333`, `http://host:6334`, or a URL with no port.
/// The gRPC port 6334 is mapped to the REST port 6333; a missing port
/// defaults to 6333.
pub fn qdrant_rest_base(raw: &str) -> Result<String, DriftgateError> {
    let parsed = reqwest::Url::parse(raw)
        .map_err(|e| DriftgateError::Config(format!("invalid QDRANT_URL {raw:?}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| DriftgateError::Config(format!("invalid QDRANT_URL {raw:?}: no host")))?;
    let port = match parsed.port() {
        None => QDRANT_REST_PORT,
        Some(QDRANT_GRPC_PORT) => QDRANT_REST_PORT,
        Some(p) => p,
    };
    Ok(format!("{}://{}:{}", parsed.scheme(), host, port))
}

fn require_env(name: &str) -> Result<String, DriftgateError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DriftgateError::Config(format!("{name} is required")))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Operator-supplied thresholds fall back to the default when unparsable,
/// matching the lenient behavior the schedulers already depend on.
fn env_int(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

/// Like [`env_int`], but a value outside i32 range falls back too instead
/// of truncating.
fn env_i32(name: &str, default: i32) -> i32 {
    i32::try_from(env_int(name, i64::from(default))).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => true,
            "0" | "false" | "no" | "n" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
