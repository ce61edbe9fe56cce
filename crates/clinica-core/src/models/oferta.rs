use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::validation::{optional_parse, optional_text, FieldCheck};
use super::{ClinicEntity, Collection, ValidationError};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Oferta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub nombre: String,
    #[serde(default)]
    pub descripcion: Option<String>,
    pub porc_descuento: f64,
    #[serde(default)]
    pub fecha_inicio: Option<NaiveDate>,
    #[serde(default)]
    pub fecha_fin: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub activo: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OfertaForm {
    pub id: String,
    pub nombre: String,
    pub descripcion: String,
    pub porc_descuento: String,
    pub fecha_inicio: String,
    pub fecha_fin: String,
    pub activo: bool,
}

impl Oferta {
    /// Active flag set and `date` inside the validity window (open ends allowed).
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.activo
            && self.fecha_inicio.map_or(true, |start| date >= start)
            && self.fecha_fin.map_or(true, |end| date <= end)
    }
}

impl ClinicEntity for Oferta {
    const COLLECTION: Collection = Collection::Ofertas;
    type Form = OfertaForm;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.nombre.trim().is_empty() {
            return Err(ValidationError::MissingFields(vec!["nombre"]));
        }
        if !(0.0..=100.0).contains(&self.porc_descuento) {
            return Err(ValidationError::InvalidField {
                field: "porc_descuento",
                reason: format!("{} is outside 0-100", self.porc_descuento),
            });
        }
        if let (Some(start), Some(end)) = (self.fecha_inicio, self.fecha_fin) {
            if end < start {
                return Err(ValidationError::InvalidField {
                    field: "fecha_fin",
                    reason: "ends before it starts".into(),
                });
            }
        }
        Ok(())
    }

    fn from_form(form: OfertaForm) -> Result<Self, ValidationError> {
        let mut check = FieldCheck::default();
        let nombre = check.text("nombre", &form.nombre);
        let porc_descuento: f64 = check.parse("porc_descuento", &form.porc_descuento)?;
        check.finish()?;

        let oferta = Oferta {
            id: optional_parse("id", &form.id)?,
            nombre,
            descripcion: optional_text(&form.descripcion),
            porc_descuento,
            fecha_inicio: optional_parse("fecha_inicio", &form.fecha_inicio)?,
            fecha_fin: optional_parse("fecha_fin", &form.fecha_fin)?,
            activo: form.activo,
        };
        oferta.validate()?;
        Ok(oferta)
    }

    fn label(&self) -> String {
        self.nombre.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_is_active_on_window() {
        let oferta = Oferta::from_form(OfertaForm {
            nombre: "Invierno".into(),
            porc_descuento: "20".into(),
            fecha_inicio: "2024-06-01".into(),
            fecha_fin: "2024-08-31".into(),
            activo: true,
            ..Default::default()
        })
        .unwrap();

        assert!(oferta.is_active_on(date(2024, 6, 1)));
        assert!(oferta.is_active_on(date(2024, 8, 31)));
        assert!(!oferta.is_active_on(date(2024, 9, 1)));

        let inactive = Oferta { activo: false, ..oferta };
        assert!(!inactive.is_active_on(date(2024, 7, 1)));
    }

    #[test]
    fn test_rejects_inverted_window_and_bad_percent() {
        let err = Oferta::from_form(OfertaForm {
            nombre: "X".into(),
            porc_descuento: "10".into(),
            fecha_inicio: "2024-08-01".into(),
            fecha_fin: "2024-07-01".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "fecha_fin", .. }));

        let err = Oferta::from_form(OfertaForm {
            nombre: "X".into(),
            porc_descuento: "101".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "porc_descuento", .. }));
    }

    #[test]
    fn test_activo_defaults_true_when_absent() {
        let oferta: Oferta =
            serde_json::from_str(r#"{"nombre":"Verano","porc_descuento":15}"#).unwrap();
        assert!(oferta.activo);
    }
}
