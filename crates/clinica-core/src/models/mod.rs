//! Data models for clinic entities.
//!
//! This module contains:
//!
//! - `Collection`, `RecordId`, `CachedRecord`: the store's view of records
//!   (opaque JSON tagged as confirmed or pending)
//! - Typed entities with their form mappings: `Paciente`, `Venta`, `Pago`,
//!   `Sesion`, `Oferta`, `BoxRoom`
//! - Auxiliary API types: `HealthStatus`, `ActivityLog`

pub mod box_room;
pub mod oferta;
pub mod paciente;
pub mod record;
pub mod sesion;
pub mod system;
pub mod validation;
pub mod venta;

pub use box_room::{BoxForm, BoxRoom};
pub use oferta::{Oferta, OfertaForm};
pub use paciente::{Paciente, PacienteForm};
pub use record::{CachedRecord, Collection, RecordId, RecordStatus};
pub use sesion::{EstadoSesion, Sesion, SesionForm};
pub use system::{ActivityLog, HealthStatus};
pub use validation::{ClinicEntity, ValidationError};
pub use venta::{MetodoPago, Pago, PagoForm, Venta, VentaForm};
