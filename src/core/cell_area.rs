use crate::types::{
    CompanionVariable, GridError, GridResult, GriddedField, Raster, SpatialGrid, EARTH_RADIUS_M,
};
use ndarray::{Array2, Array3, Axis};

/// Unit of computed cell areas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaUnit {
    SquareMetres,
    SquareKilometres,
    Hectares,
}

impl AreaUnit {
    pub fn label(&self) -> &'static str {
        match self {
            AreaUnit::SquareMetres => "m2",
            AreaUnit::SquareKilometres => "km2",
            AreaUnit::Hectares => "ha",
        }
    }

    /// Multiplier from square metres
    fn from_square_metres(&self) -> f64 {
        match self {
            AreaUnit::SquareMetres => 1.0,
            AreaUnit::SquareKilometres => 1e-6,
            AreaUnit::Hectares => 1e-4,
        }
    }
}

/// Area of a cell on the sphere: R² · Δlat · Δlon · cos(lat), angles in degrees,
/// result in the square of the radius unit
pub fn spherical_cell_area(lat_deg: f64, dlat_deg: f64, dlon_deg: f64, radius: f64) -> f64 {
    radius.powi(2) * dlat_deg.abs().to_radians() * dlon_deg.abs().to_radians() * lat_deg.to_radians().cos()
}

/// Per-cell surface area of a grid from its angular resolution.
///
/// The spacing between the first two points along each axis is assumed to hold
/// across the whole grid.
pub struct CellAreaCalculator {
    unit: AreaUnit,
    radius_m: f64,
}

impl CellAreaCalculator {
    pub fn new(unit: AreaUnit) -> Self {
        Self { unit, radius_m: EARTH_RADIUS_M }
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn unit(&self) -> AreaUnit {
        self.unit
    }

    /// (Δlat, Δlon) in degrees
    pub fn grid_spacing(grid: &SpatialGrid) -> GridResult<(f64, f64)> {
        let too_small = || GridError::Processing("Cell area needs at least two points along each axis".to_string());
        match grid {
            SpatialGrid::Regular { lat, lon } => {
                if lat.len() < 2 || lon.len() < 2 {
                    return Err(too_small());
                }
                Ok(((lat[1] - lat[0]).abs(), (lon[1] - lon[0]).abs()))
            }
            SpatialGrid::Curvilinear { lat, lon } => {
                let (rows, cols) = lat.dim();
                if rows < 2 || cols < 2 {
                    return Err(too_small());
                }
                Ok(((lat[[1, 0]] - lat[[0, 0]]).abs(), (lon[[0, 1]] - lon[[0, 0]]).abs()))
            }
        }
    }

    /// Area of every cell, shaped like the grid
    pub fn compute(&self, grid: &SpatialGrid) -> GridResult<Raster> {
        let (dlat, dlon) = Self::grid_spacing(grid)?;
        let scale = self.unit.from_square_metres();
        log::debug!(
            "Cell area: dlat={:.6} deg, dlon={:.6} deg, R={} m, unit {}",
            dlat,
            dlon,
            self.radius_m,
            self.unit.label()
        );

        let (rows, cols) = grid.shape();
        Ok(Array2::from_shape_fn((rows, cols), |(r, c)| {
            (spherical_cell_area(grid.lat_at(r, c), dlat, dlon, self.radius_m) * scale) as f32
        }))
    }

    /// Attach the cell area as a companion variable.
    /// `per_time_step` repeats it along the time axis.
    pub fn attach(&self, field: &mut GriddedField, name: &str, per_time_step: bool) -> GridResult<()> {
        let area = self.compute(&field.grid)?;
        let companion = if per_time_step {
            let nt = field.time_len();
            let stacked: Array3<f32> = area
                .insert_axis(Axis(0))
                .broadcast((nt, field.shape().1, field.shape().2))
                .ok_or_else(|| GridError::Processing("Failed to broadcast cell area over time".to_string()))?
                .to_owned();
            CompanionVariable::spatio_temporal(name, self.unit.label(), stacked)
        } else {
            CompanionVariable::spatial(name, self.unit.label(), area)
        };
        log::info!("Attached '{}' [{}] to '{}'", name, self.unit.label(), field.name);
        field.add_companion(companion)
    }
}
