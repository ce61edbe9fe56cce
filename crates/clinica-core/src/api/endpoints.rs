//! Endpoint groups of the clinic API.
//!
//! Every group answers with a `{ success, data, error }` envelope; the
//! helpers here unwrap it so callers only see the payload.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::transport::Upload;
use super::{ApiClient, ApiError};
use crate::models::{ActivityLog, Collection, HealthStatus};

/// Path prefix of every endpoint group the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Pacientes,
    Ventas,
    Pagos,
    Sesiones,
    Ofertas,
    Boxes,
    Sucursales,
    Tratamientos,
    Packs,
    Profesionales,
    Zonas,
    Fichas,
    FichasEspecificas,
    LogsActividad,
    Config,
    Health,
    Backup,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Pacientes => "pacientes",
            Resource::Ventas => "ventas",
            Resource::Pagos => "pagos",
            Resource::Sesiones => "sesiones",
            Resource::Ofertas => "ofertas",
            Resource::Boxes => "boxes",
            Resource::Sucursales => "sucursales",
            Resource::Tratamientos => "tratamientos",
            Resource::Packs => "packs",
            Resource::Profesionales => "profesionales",
            Resource::Zonas => "zonas",
            Resource::Fichas => "fichas",
            Resource::FichasEspecificas => "fichas-especificas",
            Resource::LogsActividad => "logs-actividad",
            Resource::Config => "config",
            Resource::Health => "health",
            Resource::Backup => "backup",
        }
    }
}

impl From<Collection> for Resource {
    fn from(collection: Collection) -> Self {
        match collection {
            Collection::Pacientes => Resource::Pacientes,
            Collection::Ventas => Resource::Ventas,
            Collection::Pagos => Resource::Pagos,
            Collection::Sesiones => Resource::Sesiones,
            Collection::Ofertas => Resource::Ofertas,
            Collection::Boxes => Resource::Boxes,
        }
    }
}

/// Strip the `{ success, data, error }` envelope.
///
/// `success: false` becomes `ApiError::Rejected`. Bodies without a
/// `success` key pass through untouched.
pub fn unwrap_envelope(value: &Value) -> Result<Value, ApiError> {
    match value.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(value.get("data").cloned().unwrap_or(Value::Null)),
        Some(false) => {
            let message = value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Request failed");
            Err(ApiError::Rejected(message.to_string()))
        }
        None => Ok(value.clone()),
    }
}

/// Filters for the activity log viewer.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub entidad: Option<String>,
    pub desde: Option<String>,
    pub hasta: Option<String>,
    pub limit: Option<u32>,
}

impl LogQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref entidad) = self.entidad {
            params.push(("entidad", entidad.clone()));
        }
        if let Some(ref desde) = self.desde {
            params.push(("desde", desde.clone()));
        }
        if let Some(ref hasta) = self.hasta {
            params.push(("hasta", hasta.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// CRUD calls of one endpoint group.
pub struct EntityApi<'a> {
    client: &'a ApiClient,
    resource: Resource,
}

impl<'a> EntityApi<'a> {
    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// List records. A non-array payload is an invalid response.
    pub async fn get_all(&self, params: &[(&str, &str)]) -> Result<Vec<Value>, ApiError> {
        let body = self.client.get_json(self.resource.path(), params).await?;
        match unwrap_envelope(&body)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ApiError::InvalidResponse(format!(
                "{}: expected a list, got {}",
                self.resource.path(),
                type_name(&other)
            ))),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Value, ApiError> {
        let body = self.client.get_json(&self.record_path(id), &[]).await?;
        unwrap_envelope(&body)
    }

    pub async fn create<B: Serialize + ?Sized>(&self, data: &B) -> Result<Value, ApiError> {
        let body = self.client.post(self.resource.path(), data).await?;
        unwrap_envelope(&body)
    }

    pub async fn update<B: Serialize + ?Sized>(&self, id: i64, data: &B) -> Result<Value, ApiError> {
        let body = self.client.put(&self.record_path(id), data).await?;
        unwrap_envelope(&body)
    }

    pub async fn delete(&self, id: i64) -> Result<Value, ApiError> {
        let body = self.client.delete(&self.record_path(id)).await?;
        unwrap_envelope(&body)
    }

    fn record_path(&self, id: i64) -> String {
        format!("{}/{}", self.resource.path(), id)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl ApiClient {
    pub fn entity(&self, resource: impl Into<Resource>) -> EntityApi<'_> {
        EntityApi {
            client: self,
            resource: resource.into(),
        }
    }

    /// Lightweight connectivity probe. Never served from the read cache.
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.invalidate(Resource::Health.path());
        let body = self.get_json(Resource::Health.path(), &[]).await?;
        let payload = unwrap_envelope(&body)?;
        if payload.is_null() {
            return Ok(HealthStatus::default());
        }
        serde_json::from_value(payload)
            .map_err(|e| ApiError::InvalidResponse(format!("health: {}", e)))
    }

    /// Raw `/config` payload, for `AppConfig::merge_remote`.
    pub async fn remote_config(&self) -> Result<Value, ApiError> {
        let body = self.get_json(Resource::Config.path(), &[]).await?;
        unwrap_envelope(&body)
    }

    /// Ask the server to produce a backup; returns whatever it reports.
    pub async fn create_backup(&self) -> Result<Value, ApiError> {
        let body = self.post(Resource::Backup.path(), &serde_json::json!({})).await?;
        unwrap_envelope(&body)
    }

    pub async fn activity_logs(&self, query: &LogQuery) -> Result<Vec<ActivityLog>, ApiError> {
        let owned = query.params();
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let body = self.get_json(Resource::LogsActividad.path(), &params).await?;
        let payload = unwrap_envelope(&body)?;
        let logs: Vec<ActivityLog> = serde_json::from_value(payload)
            .map_err(|e| ApiError::InvalidResponse(format!("logs-actividad: {}", e)))?;
        debug!(count = logs.len(), "Activity logs fetched");
        Ok(logs)
    }

    /// Upload a signature image captured for a specific treatment record.
    pub async fn upload_signature(&self, ficha_id: i64, png: Vec<u8>) -> Result<Value, ApiError> {
        let endpoint = format!("{}/{}/firma", Resource::FichasEspecificas.path(), ficha_id);
        let upload = Upload {
            field: "firma".to_string(),
            file_name: format!("firma_{}.png", ficha_id),
            mime: "image/png".to_string(),
            bytes: png,
        };
        let body = self.upload(&endpoint, upload).await?;
        unwrap_envelope(&body)
    }
}
