//! Auxiliary API payloads: health probe and activity log.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

impl HealthStatus {
    /// A missing status field counts as healthy: the server answered.
    pub fn is_ok(&self) -> bool {
        matches!(self.status.to_ascii_lowercase().as_str(), "" | "ok" | "healthy" | "up")
    }
}

/// One row of the activity log viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ActivityLog {
    pub id: i64,
    pub accion: String,
    #[serde(default)]
    pub entidad: Option<String>,
    #[serde(default)]
    pub entidad_id: Option<i64>,
    #[serde(default)]
    pub usuario: Option<String>,
    #[serde(default)]
    pub detalle: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
}

impl ActivityLog {
    /// "CREATE pacientes #12" style summary
    pub fn summary(&self) -> String {
        match (&self.entidad, self.entidad_id) {
            (Some(entidad), Some(id)) => format!("{} {} #{}", self.accion, entidad, id),
            (Some(entidad), None) => format!("{} {}", self.accion, entidad),
            _ => self.accion.clone(),
        }
    }
}
