//! Sales (treatment packages) and their payments.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::validation::{optional_parse, optional_text, FieldCheck};
use super::{ClinicEntity, Collection, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Venta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub paciente_id: i64,
    #[serde(default)]
    pub tratamiento_id: Option<i64>,
    #[serde(default)]
    pub pack_id: Option<i64>,
    #[serde(default)]
    pub oferta_id: Option<i64>,
    pub cantidad_sesiones: u32,
    pub precio_lista: i64,
    /// Percentage, 0 to 100
    #[serde(default)]
    pub descuento_pct: f64,
    pub precio_total: i64,
    #[serde(default)]
    pub fecha_venta: Option<NaiveDate>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VentaForm {
    pub id: String,
    pub paciente_id: String,
    pub tratamiento_id: String,
    pub pack_id: String,
    pub oferta_id: String,
    pub cantidad_sesiones: String,
    pub precio_lista: String,
    pub descuento_pct: String,
    pub fecha_venta: String,
    pub observaciones: String,
}

impl Venta {
    /// List price minus the percentage discount, rounded to whole pesos.
    pub fn compute_total(precio_lista: i64, descuento_pct: f64) -> i64 {
        let factor = (100.0 - descuento_pct.clamp(0.0, 100.0)) / 100.0;
        (precio_lista as f64 * factor).round() as i64
    }

    pub fn precio_por_sesion(&self) -> i64 {
        if self.cantidad_sesiones == 0 {
            return self.precio_total;
        }
        self.precio_total / i64::from(self.cantidad_sesiones)
    }

    /// Amount still owed after `pagos` (only payments of this sale count).
    pub fn saldo_pendiente(&self, pagos: &[Pago]) -> i64 {
        let pagado: i64 = pagos
            .iter()
            .filter(|p| self.id.is_some() && Some(p.venta_id) == self.id)
            .map(|p| p.monto)
            .sum();
        self.precio_total - pagado
    }
}

impl ClinicEntity for Venta {
    const COLLECTION: Collection = Collection::Ventas;
    type Form = VentaForm;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.paciente_id <= 0 {
            return Err(ValidationError::MissingFields(vec!["paciente_id"]));
        }
        if self.cantidad_sesiones == 0 {
            return Err(ValidationError::InvalidField {
                field: "cantidad_sesiones",
                reason: "must be at least 1".into(),
            });
        }
        if self.precio_lista < 0 {
            return Err(ValidationError::InvalidField {
                field: "precio_lista",
                reason: "cannot be negative".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.descuento_pct) {
            return Err(ValidationError::InvalidField {
                field: "descuento_pct",
                reason: format!("{} is outside 0-100", self.descuento_pct),
            });
        }
        Ok(())
    }

    fn from_form(form: VentaForm) -> Result<Self, ValidationError> {
        let mut check = FieldCheck::default();
        let paciente_id: i64 = check.parse("paciente_id", &form.paciente_id)?;
        let cantidad_sesiones: u32 = check.parse("cantidad_sesiones", &form.cantidad_sesiones)?;
        let precio_lista: i64 = check.parse("precio_lista", &form.precio_lista)?;
        check.finish()?;

        let descuento_pct = optional_parse("descuento_pct", &form.descuento_pct)?.unwrap_or(0.0);
        let venta = Venta {
            id: optional_parse("id", &form.id)?,
            paciente_id,
            tratamiento_id: optional_parse("tratamiento_id", &form.tratamiento_id)?,
            pack_id: optional_parse("pack_id", &form.pack_id)?,
            oferta_id: optional_parse("oferta_id", &form.oferta_id)?,
            cantidad_sesiones,
            precio_lista,
            descuento_pct,
            precio_total: Self::compute_total(precio_lista, descuento_pct),
            fecha_venta: optional_parse("fecha_venta", &form.fecha_venta)?,
            estado: None,
            observaciones: optional_text(&form.observaciones),
        };
        venta.validate()?;
        Ok(venta)
    }

    fn label(&self) -> String {
        format!("sale for patient {}", self.paciente_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum MetodoPago {
    #[default]
    Efectivo,
    Debito,
    Credito,
    Transferencia,
}

impl std::str::FromStr for MetodoPago {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "efectivo" => Ok(MetodoPago::Efectivo),
            "debito" | "débito" => Ok(MetodoPago::Debito),
            "credito" | "crédito" => Ok(MetodoPago::Credito),
            "transferencia" => Ok(MetodoPago::Transferencia),
            other => Err(format!("Unknown payment method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Pago {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub venta_id: i64,
    pub monto: i64,
    pub metodo_pago: MetodoPago,
    #[serde(default)]
    pub fecha_pago: Option<NaiveDate>,
    #[serde(default)]
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PagoForm {
    pub id: String,
    pub venta_id: String,
    pub monto: String,
    pub metodo_pago: String,
    pub fecha_pago: String,
    pub observaciones: String,
}

impl ClinicEntity for Pago {
    const COLLECTION: Collection = Collection::Pagos;
    type Form = PagoForm;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.venta_id <= 0 {
            return Err(ValidationError::MissingFields(vec!["venta_id"]));
        }
        if self.monto <= 0 {
            return Err(ValidationError::InvalidField {
                field: "monto",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    fn from_form(form: PagoForm) -> Result<Self, ValidationError> {
        let mut check = FieldCheck::default();
        let venta_id: i64 = check.parse("venta_id", &form.venta_id)?;
        let monto: i64 = check.parse("monto", &form.monto)?;
        let metodo_pago: MetodoPago = check.parse("metodo_pago", &form.metodo_pago)?;
        check.finish()?;

        let pago = Pago {
            id: optional_parse("id", &form.id)?,
            venta_id,
            monto,
            metodo_pago,
            fecha_pago: optional_parse("fecha_pago", &form.fecha_pago)?,
            observaciones: optional_text(&form.observaciones),
        };
        pago.validate()?;
        Ok(pago)
    }

    fn label(&self) -> String {
        format!("payment of {}", crate::utils::format_clp(self.monto))
    }
}
