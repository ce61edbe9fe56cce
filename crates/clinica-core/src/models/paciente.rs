use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::validation::{optional_parse, optional_text, require_all, FieldCheck};
use super::{ClinicEntity, Collection, ValidationError};
use crate::utils::normalize_rut;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Paciente {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub nombre: String,
    pub rut: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub fecha_nacimiento: Option<NaiveDate>,
    #[serde(default)]
    pub direccion: Option<String>,
    #[serde(default)]
    pub observaciones: Option<String>,
}

/// Patient form as entered in the UI.
#[derive(Debug, Clone, Default)]
pub struct PacienteForm {
    pub id: String,
    pub nombre: String,
    pub rut: String,
    pub email: String,
    pub telefono: String,
    pub fecha_nacimiento: String,
    pub direccion: String,
    pub observaciones: String,
}

impl Paciente {
    /// Age in whole years on `today`, if the birth date is known.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birth = self.fecha_nacimiento?;
        today.years_since(birth)
    }
}

impl ClinicEntity for Paciente {
    const COLLECTION: Collection = Collection::Pacientes;
    type Form = PacienteForm;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_all(&[
            ("nombre", !self.nombre.trim().is_empty()),
            ("rut", !self.rut.trim().is_empty()),
        ])?;
        if let Some(ref email) = self.email {
            if !email.contains('@') {
                return Err(ValidationError::InvalidField {
                    field: "email",
                    reason: format!("'{}' is not an email address", email),
                });
            }
        }
        Ok(())
    }

    fn from_form(form: PacienteForm) -> Result<Self, ValidationError> {
        let mut check = FieldCheck::default();
        let nombre = check.text("nombre", &form.nombre);
        let rut = check.text("rut", &form.rut);
        check.finish()?;

        let paciente = Paciente {
            id: optional_parse("id", &form.id)?,
            nombre,
            rut: normalize_rut(&rut),
            email: optional_text(&form.email),
            telefono: optional_text(&form.telefono),
            fecha_nacimiento: optional_parse("fecha_nacimiento", &form.fecha_nacimiento)?,
            direccion: optional_text(&form.direccion),
            observaciones: optional_text(&form.observaciones),
        };
        paciente.validate()?;
        Ok(paciente)
    }

    fn label(&self) -> String {
        self.nombre.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_form_normalizes_rut() {
        let paciente = Paciente::from_form(PacienteForm {
            nombre: " Ana Pérez ".into(),
            rut: "12.345.678-5".into(),
            fecha_nacimiento: "1990-04-12".into(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(paciente.id, None);
        assert_eq!(paciente.nombre, "Ana Pérez");
        assert_eq!(paciente.rut, "12345678-5");
        assert_eq!(paciente.email, None);
        assert_eq!(paciente.fecha_nacimiento, NaiveDate::from_ymd_opt(1990, 4, 12));
    }

    #[test]
    fn test_from_form_requires_nombre_and_rut() {
        let err = Paciente::from_form(PacienteForm::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingFields(vec!["nombre", "rut"]));
    }

    #[test]
    fn test_invalid_email_rejected() {
        let err = Paciente::from_form(PacienteForm {
            nombre: "Ana".into(),
            rut: "1-9".into(),
            email: "ana.example.cl".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "email", .. }));
    }

    #[test]
    fn test_deserialize_ignores_unknown_fields() {
        let paciente: Paciente = serde_json::from_value(json!({
            "id": 3,
            "nombre": "Luz",
            "rut": "9876543-2",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(paciente.id, Some(3));
        assert_eq!(paciente.telefono, None);
    }

    #[test]
    fn test_age_on() {
        let paciente = Paciente {
            id: None,
            nombre: "Ana".into(),
            rut: "1-9".into(),
            email: None,
            telefono: None,
            fecha_nacimiento: NaiveDate::from_ymd_opt(1990, 6, 15),
            direccion: None,
            observaciones: None,
        };
        assert_eq!(paciente.age_on(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()), Some(33));
        assert_eq!(paciente.age_on(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), Some(34));
    }
}
