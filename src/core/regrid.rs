use crate::types::{
    CompanionData, CompanionVariable, CoordinateSystem, GeoTransform, GridError, GridResult, GriddedField, Raster,
    SpatialGrid,
};
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Semantics of the quantity being resampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityKind {
    /// Physically continuous values (temperature, precipitation, biomass)
    Continuous,
    /// Values bounded to a range, e.g. 0-100 % cover
    BoundedPercentage,
    /// Class codes or flags
    Categorical,
}

impl QuantityKind {
    /// Interpolation that never invents values outside the quantity's domain
    pub fn default_interpolation(&self) -> Interpolation {
        match self {
            QuantityKind::Continuous => Interpolation::Bilinear,
            QuantityKind::BoundedPercentage | QuantityKind::Categorical => Interpolation::Nearest,
        }
    }

    pub fn permits(&self, method: Interpolation) -> bool {
        match self {
            QuantityKind::Continuous => true,
            QuantityKind::BoundedPercentage | QuantityKind::Categorical => method == Interpolation::Nearest,
        }
    }
}

/// Available interpolation methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Bilinear,
    Nearest,
}

/// Regular lat/lon grid to interpolate onto
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
}

impl TargetGrid {
    pub fn new(lat: Vec<f64>, lon: Vec<f64>) -> GridResult<Self> {
        if lat.is_empty() || lon.is_empty() {
            return Err(GridError::Config("Target grid needs at least one latitude and longitude".to_string()));
        }
        Ok(Self { lat, lon })
    }
}

/// North pole of a rotated latitude/longitude grid (CF `rotated_latitude_longitude`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedPole {
    pub pole_lat: f64,
    pub pole_lon: f64,
}

impl RotatedPole {
    /// EUR-11 / EUR-44 pole
    pub const EURO_CORDEX: RotatedPole = RotatedPole { pole_lat: 39.25, pole_lon: -162.0 };

    /// Rotated (latitude, longitude) of a geographic point, degrees
    pub fn to_rotated(&self, lat: f64, lon: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let lam = (lon - self.pole_lon - 180.0).to_radians();
        let (sin_p, cos_p) = self.pole_lat.to_radians().sin_cos();

        let x = phi.cos() * lam.cos();
        let y = phi.cos() * lam.sin();
        let z = phi.sin();

        let xr = x * sin_p + z * cos_p;
        let zr = -x * cos_p + z * sin_p;
        (zr.clamp(-1.0, 1.0).asin().to_degrees(), y.atan2(xr).to_degrees())
    }
}

/// Interpolating resampler between grids
pub struct Regridder {
    kind: QuantityKind,
    method: Interpolation,
}

impl Regridder {
    /// Create a regridder, rejecting interpolation that would invent intermediate
    /// values for percentages or class codes
    pub fn new(kind: QuantityKind, method: Interpolation) -> GridResult<Self> {
        if !kind.permits(method) {
            return Err(GridError::UnsupportedInterpolation(format!(
                "{:?} interpolation is not allowed for {:?} quantities; use nearest neighbour",
                method, kind
            )));
        }
        Ok(Self { kind, method })
    }

    pub fn for_quantity(kind: QuantityKind) -> Self {
        Self { kind, method: kind.default_interpolation() }
    }

    pub fn method(&self) -> Interpolation {
        self.method
    }

    pub fn kind(&self) -> QuantityKind {
        self.kind
    }

    /// Interpolate a raster on regular axes onto other regular axes.
    /// Target cells outside the source extent are missing.
    pub fn regrid_raster(
        &self,
        data: &ArrayView2<f32>,
        src_lat: &[f64],
        src_lon: &[f64],
        dst_lat: &[f64],
        dst_lon: &[f64],
    ) -> GridResult<Raster> {
        if data.dim() != (src_lat.len(), src_lon.len()) {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?}", (src_lat.len(), src_lon.len())),
                found: format!("{:?}", data.dim()),
            });
        }

        let rows: Vec<Option<f64>> = dst_lat.iter().map(|v| axis_position(src_lat, *v)).collect();
        let cols: Vec<Option<f64>> = dst_lon.iter().map(|v| axis_position(src_lon, *v)).collect();

        Ok(Array2::from_shape_fn((dst_lat.len(), dst_lon.len()), |(i, j)| {
            match (rows[i], cols[j]) {
                (Some(r), Some(c)) => self.sample(data, r, c),
                _ => f32::NAN,
            }
        }))
    }

    /// Regrid a field with a regular source grid onto `target`
    pub fn regrid_field(&self, field: &GriddedField, target: &TargetGrid) -> GridResult<GriddedField> {
        let (src_lat, src_lon) = match &field.grid {
            SpatialGrid::Regular { lat, lon } => (lat, lon),
            SpatialGrid::Curvilinear { .. } => {
                return Err(GridError::UnsupportedInterpolation(
                    "interpolation from a curvilinear source grid".to_string(),
                ))
            }
        };
        let rows: Vec<Option<f64>> = target.lat.iter().map(|v| axis_position(src_lat, *v)).collect();
        let cols: Vec<Option<f64>> = target.lon.iter().map(|v| axis_position(src_lon, *v)).collect();
        let positions = Array2::from_shape_fn((target.lat.len(), target.lon.len()), |(i, j)| rows[i].zip(cols[j]));
        self.regrid_positions(field, target, &positions)
    }

    /// Regrid a field stored on rotated-pole axes (`grid` holds rotated latitude
    /// and longitude) onto a geographic `target`
    pub fn regrid_from_rotated(
        &self,
        field: &GriddedField,
        pole: &RotatedPole,
        target: &TargetGrid,
    ) -> GridResult<GriddedField> {
        let (rlat, rlon) = match &field.grid {
            SpatialGrid::Regular { lat, lon } => (lat, lon),
            SpatialGrid::Curvilinear { .. } => {
                return Err(GridError::UnsupportedInterpolation(
                    "rotated-pole source must be given on its 1-D rotated axes".to_string(),
                ))
            }
        };
        let positions = Array2::from_shape_fn((target.lat.len(), target.lon.len()), |(i, j)| {
            let (r_lat, r_lon) = pole.to_rotated(target.lat[i], target.lon[j]);
            axis_position(rlat, r_lat).zip(axis_position(rlon, r_lon))
        });
        self.regrid_positions(field, target, &positions)
    }

    /// Sample every time step and companion at precomputed fractional source positions
    fn regrid_positions(
        &self,
        field: &GriddedField,
        target: &TargetGrid,
        positions: &Array2<Option<(f64, f64)>>,
    ) -> GridResult<GriddedField> {
        let (nt, rows, cols) = field.shape();
        log::info!(
            "Regridding '{}' ({:?}) from {}x{} to {}x{} over {} time steps",
            field.name,
            self.method,
            rows,
            cols,
            target.lat.len(),
            target.lon.len(),
            nt
        );

        let sample_raster = |data: &ArrayView2<f32>| -> Raster {
            positions.map(|p| match p {
                Some((r, c)) => self.sample(data, *r, *c),
                None => f32::NAN,
            })
        };
        let regrid_stack = |stack: &Array3<f32>| -> Array3<f32> {
            let mut out = Array3::<f32>::zeros((stack.dim().0, target.lat.len(), target.lon.len()));
            for (t, slice) in stack.axis_iter(Axis(0)).enumerate() {
                out.index_axis_mut(Axis(0), t).assign(&sample_raster(&slice));
            }
            out
        };

        let mut out = field.clone();
        out.data = regrid_stack(&field.data);
        out.companions = field
            .companions
            .iter()
            .map(|c| {
                let data = match &c.data {
                    CompanionData::Spatial(a) => CompanionData::Spatial(sample_raster(&a.view())),
                    CompanionData::SpatioTemporal(a) => CompanionData::SpatioTemporal(regrid_stack(a)),
                };
                CompanionVariable { name: c.name.clone(), units: c.units.clone(), data }
            })
            .collect();
        out.grid = SpatialGrid::Regular { lat: target.lat.clone(), lon: target.lon.clone() };
        out.crs = CoordinateSystem::Geographic;

        out.validate()?;
        Ok(out)
    }

    /// Resample a raster between two geotransform grids in the same CRS
    pub fn resample_transform(
        &self,
        data: &ArrayView2<f32>,
        source_transform: &GeoTransform,
        target_transform: &GeoTransform,
        target_shape: (usize, usize),
    ) -> Raster {
        log::debug!("Resampling raster ({:?}) to target grid {:?}", self.method, target_shape);
        let (source_height, source_width) = data.dim();

        Array2::from_shape_fn(target_shape, |(i, j)| {
            let (x, y) = target_transform.pixel_center(i, j);
            let (row, col) = source_transform.to_pixel(x, y);

            if row < 0.0 || col < 0.0 || row >= source_height as f64 || col >= source_width as f64 {
                return f32::NAN; // Outside source bounds
            }

            match self.method {
                Interpolation::Nearest => data[[row.floor() as usize, col.floor() as usize]],
                Interpolation::Bilinear => {
                    // Pixel values sit at pixel centres
                    let r = (row - 0.5).clamp(0.0, (source_height - 1) as f64);
                    let c = (col - 0.5).clamp(0.0, (source_width - 1) as f64);
                    bilinear_sample(data, r, c)
                }
            }
        })
    }

    fn sample(&self, data: &ArrayView2<f32>, row: f64, col: f64) -> f32 {
        match self.method {
            Interpolation::Nearest => data[[row.round() as usize, col.round() as usize]],
            Interpolation::Bilinear => bilinear_sample(data, row, col),
        }
    }
}

/// Fractional index of `value` along a monotonic axis, `None` outside its extent
pub fn axis_position(axis: &[f64], value: f64) -> Option<f64> {
    let n = axis.len();
    match n {
        0 => return None,
        1 => return if axis[0] == value { Some(0.0) } else { None },
        _ => {}
    }

    let ascending = axis[n - 1] > axis[0];
    let (lo, hi) = if ascending { (axis[0], axis[n - 1]) } else { (axis[n - 1], axis[0]) };
    if value < lo || value > hi {
        return None;
    }

    let upper = if ascending {
        axis.partition_point(|&a| a <= value)
    } else {
        axis.partition_point(|&a| a >= value)
    };
    let i = upper.saturating_sub(1).min(n - 2);
    let frac = (value - axis[i]) / (axis[i + 1] - axis[i]);
    Some(i as f64 + frac)
}

/// Bilinear interpolation at a fractional (row, col); missing if any neighbour is missing
fn bilinear_sample(image: &ArrayView2<f32>, row: f64, col: f64) -> f32 {
    let (height, width) = image.dim();
    let x1 = col.floor() as usize;
    let y1 = row.floor() as usize;
    if x1 >= width || y1 >= height {
        return f32::NAN;
    }
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);

    let dx = (col - x1 as f64) as f32;
    let dy = (row - y1 as f64) as f32;

    let v11 = image[[y1, x1]];
    let v12 = image[[y2, x1]];
    let v21 = image[[y1, x2]];
    let v22 = image[[y2, x2]];

    if v11.is_nan() || v12.is_nan() || v21.is_nan() || v22.is_nan() {
        return f32::NAN;
    }

    let v1 = v11 * (1.0 - dx) + v21 * dx;
    let v2 = v12 * (1.0 - dx) + v22 * dx;
    v1 * (1.0 - dy) + v2 * dy
}
