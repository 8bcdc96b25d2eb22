use crate::types::{GridError, GridResult, GriddedField};

/// Fixed scalar unit conversion. The field's declared unit must equal `from`;
/// after `apply` it declares `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    pub name: &'static str,
    pub from: &'static str,
    pub to: &'static str,
    pub factor: f64,
}

/// SMAP soil organic carbon, g C m-2 to tonnes C m-2
pub const GRAMS_TO_TONNES_PER_M2: UnitConversion = UnitConversion {
    name: "g m-2 to t m-2",
    from: "g C m-2",
    to: "tons C m-2",
    factor: 1e-6,
};

/// Above-ground biomass to carbon stock, 50% carbon fraction
pub const BIOMASS_TO_CARBON: UnitConversion = UnitConversion {
    name: "biomass to carbon",
    from: "Mg/ha",
    to: "tons_per_ha",
    factor: 0.5,
};

impl UnitConversion {
    pub fn convert(&self, value: f32) -> f32 {
        (value as f64 * self.factor) as f32
    }

    /// Scale the primary variable and declare the new unit. Missing values stay missing.
    pub fn apply(&self, field: &mut GriddedField) -> GridResult<()> {
        self.check(&field.units)?;
        field.data.mapv_inplace(|v| self.convert(v));
        field.units = self.to.to_string();
        log::info!("Converted '{}' with {} (x{})", field.name, self.name, self.factor);
        Ok(())
    }

    fn check(&self, current: &str) -> GridResult<()> {
        if current != self.from {
            return Err(GridError::UnitMismatch {
                expected: self.from.to_string(),
                found: current.to_string(),
            });
        }
        Ok(())
    }
}
