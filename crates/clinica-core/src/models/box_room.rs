use serde::{Deserialize, Serialize};

use super::validation::{optional_parse, optional_text, FieldCheck};
use super::{ClinicEntity, Collection, ValidationError};

fn default_true() -> bool {
    true
}

/// A treatment box (room) at a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct BoxRoom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub nombre: String,
    #[serde(default)]
    pub sucursal_id: Option<i64>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default = "default_true")]
    pub activo: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BoxForm {
    pub id: String,
    pub nombre: String,
    pub sucursal_id: String,
    pub descripcion: String,
    pub activo: bool,
}

impl ClinicEntity for BoxRoom {
    const COLLECTION: Collection = Collection::Boxes;
    type Form = BoxForm;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.nombre.trim().is_empty() {
            return Err(ValidationError::MissingFields(vec!["nombre"]));
        }
        Ok(())
    }

    fn from_form(form: BoxForm) -> Result<Self, ValidationError> {
        let mut check = FieldCheck::default();
        let nombre = check.text("nombre", &form.nombre);
        check.finish()?;

        Ok(BoxRoom {
            id: optional_parse("id", &form.id)?,
            nombre,
            sucursal_id: optional_parse("sucursal_id", &form.sucursal_id)?,
            descripcion: optional_text(&form.descripcion),
            activo: form.activo,
        })
    }

    fn label(&self) -> String {
        self.nombre.clone()
    }
}
