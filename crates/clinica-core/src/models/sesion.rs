//! Scheduled treatment sessions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::validation::{optional_parse, optional_text, FieldCheck, ValidationError};
use super::{ClinicEntity, Collection};

/// Accepted datetime formats, `datetime-local` input first
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum EstadoSesion {
    #[default]
    Planificada,
    Confirmada,
    Realizada,
    Cancelada,
    NoAsistio,
    #[serde(other)]
    Desconocido,
}

impl EstadoSesion {
    /// Sessions in these states use up one of the sale's sessions
    pub fn consumes_session(&self) -> bool {
        matches!(self, EstadoSesion::Realizada | EstadoSesion::NoAsistio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Sesion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub venta_id: i64,
    pub box_id: i64,
    #[serde(default)]
    pub profesional_id: Option<i64>,
    pub fecha_planificada: NaiveDateTime,
    #[serde(default)]
    pub duracion_minutos: Option<u32>,
    #[serde(default)]
    pub estado: EstadoSesion,
    #[serde(default)]
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SesionForm {
    pub id: String,
    pub venta_id: String,
    pub box_id: String,
    pub profesional_id: String,
    pub fecha_planificada: String,
    pub duracion_minutos: String,
    pub observaciones: String,
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, ValidationError> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value.trim(), fmt).ok())
        .ok_or_else(|| ValidationError::InvalidField {
            field: "fecha_planificada",
            reason: format!("'{}' is not a date and time", value),
        })
}

impl Sesion {
    /// Whether two sessions in the same box overlap in time.
    /// Sessions without a duration occupy one hour.
    pub fn overlaps(&self, other: &Sesion) -> bool {
        if self.box_id != other.box_id {
            return false;
        }
        let span = |s: &Sesion| {
            let minutes = i64::from(s.duracion_minutos.unwrap_or(60));
            (s.fecha_planificada, s.fecha_planificada + chrono::Duration::minutes(minutes))
        };
        let (a_start, a_end) = span(self);
        let (b_start, b_end) = span(other);
        a_start < b_end && b_start < a_end
    }
}

impl ClinicEntity for Sesion {
    const COLLECTION: Collection = Collection::Sesiones;
    type Form = SesionForm;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.venta_id <= 0 {
            missing.push("venta_id");
        }
        if self.box_id <= 0 {
            missing.push("box_id");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }

    fn from_form(form: SesionForm) -> Result<Self, ValidationError> {
        let mut check = FieldCheck::default();
        let venta_id: i64 = check.parse("venta_id", &form.venta_id)?;
        let box_id: i64 = check.parse("box_id", &form.box_id)?;
        let fecha = check.text("fecha_planificada", &form.fecha_planificada);
        check.finish()?;

        let sesion = Sesion {
            id: optional_parse("id", &form.id)?,
            venta_id,
            box_id,
            profesional_id: optional_parse("profesional_id", &form.profesional_id)?,
            fecha_planificada: parse_datetime(&fecha)?,
            duracion_minutos: optional_parse("duracion_minutos", &form.duracion_minutos)?,
            estado: EstadoSesion::Planificada,
            observaciones: optional_text(&form.observaciones),
        };
        sesion.validate()?;
        Ok(sesion)
    }

    fn label(&self) -> String {
        format!("session on {}", self.fecha_planificada.format("%d-%m-%Y %H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(box_id: &str, fecha: &str) -> SesionForm {
        SesionForm {
            venta_id: "8".into(),
            box_id: box_id.into(),
            fecha_planificada: fecha.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_form_parses_datetime_local() {
        let sesion = Sesion::from_form(form("2", "2024-07-01T15:30")).unwrap();
        assert_eq!(sesion.fecha_planificada.to_string(), "2024-07-01 15:30:00");
        assert_eq!(sesion.estado, EstadoSesion::Planificada);
        assert_eq!(sesion.label(), "session on 01-07-2024 15:30");
    }

    #[test]
    fn test_from_form_rejects_bad_datetime() {
        let err = Sesion::from_form(form("2", "mañana")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "fecha_planificada", .. }));

        let err = Sesion::from_form(form("", "")).unwrap_err();
        assert_eq!(err, ValidationError::MissingFields(vec!["box_id", "fecha_planificada"]));
    }

    #[test]
    fn test_overlaps_same_box_only() {
        let a = Sesion::from_form(form("1", "2024-07-01T10:00")).unwrap();
        let b = Sesion::from_form(form("1", "2024-07-01T10:30")).unwrap();
        let c = Sesion::from_form(form("2", "2024-07-01T10:30")).unwrap();
        let d = Sesion::from_form(form("1", "2024-07-01T11:00")).unwrap();

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn test_unknown_estado_deserializes() {
        let sesion: Sesion = serde_json::from_value(json!({
            "id": 1,
            "venta_id": 2,
            "box_id": 3,
            "fecha_planificada": "2024-07-01T10:00:00",
            "estado": "reagendada"
        }))
        .unwrap();
        assert_eq!(sesion.estado, EstadoSesion::Desconocido);
        assert!(EstadoSesion::NoAsistio.consumes_session());
    }
}
