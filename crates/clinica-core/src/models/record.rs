//! Store-level record types.
//!
//! Records are kept as the JSON the server sent, keyed by a tagged id that
//! says whether the server has ever seen them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The six collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Pacientes,
    Ventas,
    Pagos,
    Sesiones,
    Ofertas,
    Boxes,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Pacientes,
        Collection::Ventas,
        Collection::Pagos,
        Collection::Sesiones,
        Collection::Ofertas,
        Collection::Boxes,
    ];

    /// REST endpoint of the collection, also used as snapshot file name.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Collection::Pacientes => "pacientes",
            Collection::Ventas => "ventas",
            Collection::Pagos => "pagos",
            Collection::Sesiones => "sesiones",
            Collection::Ofertas => "ofertas",
            Collection::Boxes => "boxes",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Collection::Pacientes => "Patient",
            Collection::Ventas => "Sale",
            Collection::Pagos => "Payment",
            Collection::Sesiones => "Session",
            Collection::Ofertas => "Offer",
            Collection::Boxes => "Box",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.endpoint().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown collection: {}", s))
    }
}

/// Record identity: assigned by the server, or a local placeholder for a
/// record created offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordId {
    Confirmed(i64),
    Pending(u64),
}

impl RecordId {
    pub fn confirmed(&self) -> Option<i64> {
        match self {
            RecordId::Confirmed(id) => Some(*id),
            RecordId::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RecordId::Pending(_))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Confirmed(id) => write!(f, "{}", id),
            RecordId::Pending(local) => write!(f, "local-{}", local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Synced,
    /// Changed locally, not yet confirmed by the server
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub id: RecordId,
    pub status: RecordStatus,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

impl CachedRecord {
    /// Wrap a record as returned by the server. Records without a numeric
    /// `id` are rejected.
    pub fn from_server(data: Value) -> Option<Self> {
        let id = data.get("id").and_then(Value::as_i64)?;
        Some(Self {
            id: RecordId::Confirmed(id),
            status: RecordStatus::Synced,
            data,
            updated_at: Utc::now(),
        })
    }

    pub fn pending(id: RecordId, data: Value) -> Self {
        Self {
            id,
            status: RecordStatus::Pending,
            data,
            updated_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    /// Read a string field from the record payload.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_from_str() {
        assert_eq!("pacientes".parse::<Collection>().unwrap(), Collection::Pacientes);
        assert_eq!("BOXES".parse::<Collection>().unwrap(), Collection::Boxes);
        assert!("zonas".parse::<Collection>().is_err());
    }

    #[test]
    fn test_record_id_ordering_and_display() {
        let mut ids = vec![RecordId::Pending(1), RecordId::Confirmed(9), RecordId::Confirmed(2)];
        ids.sort();
        assert_eq!(ids, vec![RecordId::Confirmed(2), RecordId::Confirmed(9), RecordId::Pending(1)]);
        assert_eq!(RecordId::Pending(3).to_string(), "local-3");
        assert_eq!(RecordId::Confirmed(3).to_string(), "3");
    }

    #[test]
    fn test_from_server_requires_numeric_id() {
        let record = CachedRecord::from_server(json!({ "id": 7, "nombre": "Ana" })).unwrap();
        assert_eq!(record.id, RecordId::Confirmed(7));
        assert!(!record.is_pending());
        assert_eq!(record.field("nombre"), Some("Ana"));

        assert!(CachedRecord::from_server(json!({ "nombre": "sin id" })).is_none());
        assert!(CachedRecord::from_server(json!({ "id": "7" })).is_none());
    }

    #[test]
    fn test_record_id_serde_shape() {
        let json = serde_json::to_value(RecordId::Pending(4)).unwrap();
        assert_eq!(json, json!({ "pending": 4 }));
        let back: RecordId = serde_json::from_value(json!({ "confirmed": 12 })).unwrap();
        assert_eq!(back, RecordId::Confirmed(12));
    }
}
