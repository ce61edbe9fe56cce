//! Feature services: typed save/remove/list handlers per entity.
//!
//! A service maps form input to its entity, validates it before any
//! request, writes through the store and turns the outcome into a
//! [`Notification`] for the user. Failures never propagate past here.

use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::models::{
    BoxRoom, CachedRecord, ClinicEntity, Oferta, Paciente, Pago, RecordId, RecordStatus, Sesion, Venta,
};
use crate::store::{ClinicStore, DeleteOutcome, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    /// Accepted locally, waiting for sync
    Info,
    Error,
}

/// User-facing outcome of a save or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.level {
            NotificationLevel::Error => write!(f, "Error: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// One list row: the typed entity plus its cache identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<E> {
    pub id: RecordId,
    pub pending: bool,
    pub entity: E,
}

pub struct EntityService<E: ClinicEntity> {
    store: ClinicStore,
    _entity: PhantomData<E>,
}

// Manual impl: a derive would require `E: Clone` on the marker.
impl<E: ClinicEntity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

pub type PacienteService = EntityService<Paciente>;
pub type VentaService = EntityService<Venta>;
pub type PagoService = EntityService<Pago>;
pub type SesionService = EntityService<Sesion>;
pub type OfertaService = EntityService<Oferta>;
pub type BoxService = EntityService<BoxRoom>;

impl<E: ClinicEntity> EntityService<E> {
    pub fn new(store: ClinicStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Validate and save a form. The id inside the form (if any) selects
    /// update over create.
    pub async fn save(&self, form: E::Form) -> Notification {
        self.notify_save(None, form).await
    }

    /// Save a form over a specific record, including one not yet synced.
    pub async fn update(&self, id: RecordId, form: E::Form) -> Notification {
        self.notify_save(Some(id), form).await
    }

    async fn notify_save(&self, id: Option<RecordId>, form: E::Form) -> Notification {
        let label = E::COLLECTION.label();
        match self.try_save(id, form).await {
            Ok((entity, record)) if record.is_pending() => {
                Notification::info(format!("{} '{}' saved offline, it will sync when the connection returns", label, entity.label()))
            }
            Ok((entity, _)) => Notification::success(format!("{} '{}' saved", label, entity.label())),
            Err(StoreError::Validation(e)) => {
                debug!(collection = %E::COLLECTION, error = %e, "Form rejected");
                Notification::error(e.to_string())
            }
            Err(e) => {
                warn!(collection = %E::COLLECTION, error = %e, "Save failed");
                Notification::error(format!("Could not save {}: {}", label.to_lowercase(), e))
            }
        }
    }

    /// Validate, then write through the store.
    pub async fn try_save(&self, id: Option<RecordId>, form: E::Form) -> Result<(E, CachedRecord), StoreError> {
        let entity = E::from_form(form)?;
        let id = id.or_else(|| entity.id().map(RecordId::Confirmed));
        let data = serde_json::to_value(&entity)?;
        let record = self.store.save(E::COLLECTION, id, data).await?;
        Ok((entity, record))
    }

    pub async fn remove(&self, id: RecordId) -> Notification {
        let label = E::COLLECTION.label();
        match self.store.delete(E::COLLECTION, id).await {
            Ok(DeleteOutcome::Queued) => {
                Notification::info(format!("{} deleted locally, it will sync when the connection returns", label))
            }
            Ok(_) => Notification::success(format!("{} deleted", label)),
            Err(e) => {
                warn!(collection = %E::COLLECTION, id = %id, error = %e, "Delete failed");
                Notification::error(format!("Could not delete {}: {}", label.to_lowercase(), e))
            }
        }
    }

    /// Typed rows from the store's current snapshot, without a request.
    /// Records that no longer match the entity shape are skipped.
    pub fn rows(&self) -> Vec<Row<E>> {
        to_rows(self.store.cached(E::COLLECTION))
    }

    /// Refresh from the API when online, then return the rows.
    pub async fn refresh(&self) -> Vec<Row<E>> {
        to_rows(self.store.list(E::COLLECTION).await)
    }
}

fn to_rows<E: ClinicEntity>(records: Vec<CachedRecord>) -> Vec<Row<E>> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<E>(record.data) {
            Ok(entity) => Some(Row {
                id: record.id,
                pending: record.status == RecordStatus::Pending,
                entity,
            }),
            Err(e) => {
                debug!(collection = %E::COLLECTION, id = %record.id, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}
