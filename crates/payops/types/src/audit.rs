use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Severity of an audit entry. Assigned at emission time and never
/// reinterpreted downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditLevel::Info => "info",
            AuditLevel::Warn => "warn",
            AuditLevel::Error => "error",
            AuditLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Immutable audit event. `module` names the originating component;
/// `metadata` carries schema-less key/value context.
///
/// The metadata map is key-ordered so that a rendered audit trail is
/// byte-stable, which compliance reports rely on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub module: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AuditEntry {
    pub fn new(level: AuditLevel, module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            module: module.into(),
            message: message.into(),
            metadata: Map::new(),
        }
    }

    pub fn info(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Info, module, message)
    }

    pub fn warn(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Warn, module, message)
    }

    pub fn error(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Error, module, message)
    }

    pub fn critical(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Critical, module, message)
    }

    /// Attaches a metadata value. Values that fail to serialize are
    /// dropped rather than failing the emission path.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
