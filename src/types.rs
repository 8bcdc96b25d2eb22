use chrono::NaiveDate;
use ndarray::{concatenate, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Single 2D raster slice (y x x)
pub type Raster = Array2<f32>;

/// Time stack of rasters (time x y x x)
pub type RasterStack = Array3<f32>;

/// Earth's mean radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Earth's mean radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic bounding box, inclusive on every edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// EURO-CORDEX domain shared by every EFMI product
    pub const EURO_CORDEX: BoundingBox = BoundingBox {
        min_lon: -44.75,
        max_lon: 65.25,
        min_lat: 21.75,
        max_lat: 72.75,
    };

    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> GridResult<Self> {
        if !(min_lon <= max_lon && min_lat <= max_lat) {
            return Err(GridError::Config(format!(
                "Invalid bounding box: lon [{}, {}], lat [{}, {}]",
                min_lon, max_lon, min_lat, max_lat
            )));
        }
        Ok(Self { min_lon, max_lon, min_lat, max_lat })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// (west, south, east, north)
    pub fn as_bounds(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EURO_CORDEX
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of a pixel centre
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.top_left_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.top_left_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional (row, col) position of a map coordinate, measured from the top-left edge
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (row, col)
    }

    /// Same origin, pixels `factor` times larger
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            pixel_width: self.pixel_width * factor,
            pixel_height: self.pixel_height * factor,
            ..*self
        }
    }
}

/// Coordinate reference system of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic WGS84 (EPSG:4326)
    Geographic,
    /// Projected or otherwise EPSG-coded system
    Projected { epsg: u32 },
}

impl CoordinateSystem {
    pub fn from_epsg(epsg: u32) -> Self {
        if epsg == 4326 {
            CoordinateSystem::Geographic
        } else {
            CoordinateSystem::Projected { epsg }
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            CoordinateSystem::Geographic => 4326,
            CoordinateSystem::Projected { epsg } => *epsg,
        }
    }
}

impl std::fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Temporal resolution of a field's time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeResolution {
    Daily,
    TenDaily,
    Monthly,
    Annual,
    Event,
}

impl TimeResolution {
    /// Token used in output file names
    pub fn file_token(&self) -> &'static str {
        match self {
            TimeResolution::Daily => "day",
            TimeResolution::TenDaily => "10day",
            TimeResolution::Monthly => "mon",
            TimeResolution::Annual => "ann",
            TimeResolution::Event => "event",
        }
    }

    /// Value of the `Time_averaging` metadata entry
    pub fn averaging_label(&self) -> &'static str {
        match self {
            TimeResolution::Daily => "Daily",
            TimeResolution::TenDaily => "10-Daily",
            TimeResolution::Monthly => "Monthly",
            TimeResolution::Annual => "Annual",
            TimeResolution::Event => "Event",
        }
    }
}

impl std::fmt::Display for TimeResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.averaging_label())
    }
}

fn span<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Horizontal coordinates of a gridded field
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialGrid {
    /// 1-D latitude and longitude axes, data indexed (lat, lon)
    Regular { lat: Vec<f64>, lon: Vec<f64> },
    /// 2-D latitude and longitude per cell, data indexed (y, x)
    Curvilinear { lat: Array2<f64>, lon: Array2<f64> },
}

impl SpatialGrid {
    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            SpatialGrid::Regular { lat, lon } => (lat.len(), lon.len()),
            SpatialGrid::Curvilinear { lat, .. } => lat.dim(),
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, SpatialGrid::Regular { .. })
    }

    /// Latitude of a cell
    pub fn lat_at(&self, row: usize, col: usize) -> f64 {
        match self {
            SpatialGrid::Regular { lat, .. } => lat[row],
            SpatialGrid::Curvilinear { lat, .. } => lat[[row, col]],
        }
    }

    /// Longitude of a cell
    pub fn lon_at(&self, row: usize, col: usize) -> f64 {
        match self {
            SpatialGrid::Regular { lon, .. } => lon[col],
            SpatialGrid::Curvilinear { lon, .. } => lon[[row, col]],
        }
    }

    /// Smallest box holding every finite cell centre, `None` for an empty grid
    pub fn extent(&self) -> Option<BoundingBox> {
        let (lat, lon) = match self {
            SpatialGrid::Regular { lat, lon } => (span(lat.iter()), span(lon.iter())),
            SpatialGrid::Curvilinear { lat, lon } => (span(lat.iter()), span(lon.iter())),
        };
        let ((min_lat, max_lat), (min_lon, max_lon)) = (lat?, lon?);
        Some(BoundingBox { min_lon, max_lon, min_lat, max_lat })
    }

    fn validate(&self) -> GridResult<()> {
        if let SpatialGrid::Curvilinear { lat, lon } = self {
            if lat.dim() != lon.dim() {
                return Err(GridError::ShapeMismatch {
                    expected: format!("{:?}", lat.dim()),
                    found: format!("{:?}", lon.dim()),
                });
            }
        }
        Ok(())
    }
}

/// Data of an additional named array sharing the field's spatial dimensions
#[derive(Debug, Clone, PartialEq)]
pub enum CompanionData {
    /// (y, x), constant over time
    Spatial(Raster),
    /// (time, y, x)
    SpatioTemporal(RasterStack),
}

/// Additional named array attached to a gridded field (cell area, derived masks, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionVariable {
    pub name: String,
    pub units: String,
    pub data: CompanionData,
}

impl CompanionVariable {
    pub fn spatial(name: impl Into<String>, units: impl Into<String>, data: Raster) -> Self {
        Self { name: name.into(), units: units.into(), data: CompanionData::Spatial(data) }
    }

    pub fn spatio_temporal(name: impl Into<String>, units: impl Into<String>, data: RasterStack) -> Self {
        Self { name: name.into(), units: units.into(), data: CompanionData::SpatioTemporal(data) }
    }

    /// Spatial (rows, cols) of the companion
    pub fn spatial_shape(&self) -> (usize, usize) {
        match &self.data {
            CompanionData::Spatial(a) => a.dim(),
            CompanionData::SpatioTemporal(a) => (a.dim().1, a.dim().2),
        }
    }
}

/// Gridded field of physical measurements with coordinates, unit and provenance
#[derive(Debug, Clone)]
pub struct GriddedField {
    pub name: String,
    pub units: String,
    /// (time, y, x); missing values are NaN
    pub data: RasterStack,
    pub grid: SpatialGrid,
    /// One date per time step, the start of the period it represents
    pub times: Vec<NaiveDate>,
    pub resolution: TimeResolution,
    /// Sentinel declared as `_FillValue` on output
    pub fill_value: f32,
    pub crs: CoordinateSystem,
    pub companions: Vec<CompanionVariable>,
    pub attributes: BTreeMap<String, String>,
}

impl GriddedField {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        data: RasterStack,
        grid: SpatialGrid,
        times: Vec<NaiveDate>,
        resolution: TimeResolution,
    ) -> GridResult<Self> {
        let field = Self {
            name: name.into(),
            units: units.into(),
            data,
            grid,
            times,
            resolution,
            fill_value: f32::NAN,
            crs: CoordinateSystem::Geographic,
            companions: Vec::new(),
            attributes: BTreeMap::new(),
        };
        field.validate()?;
        Ok(field)
    }

    /// Check that data, coordinates, times and companions agree in shape
    pub fn validate(&self) -> GridResult<()> {
        self.grid.validate()?;
        let (nt, ny, nx) = self.data.dim();
        if (ny, nx) != self.grid.shape() {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?}", self.grid.shape()),
                found: format!("{:?}", (ny, nx)),
            });
        }
        if nt != self.times.len() {
            return Err(GridError::ShapeMismatch {
                expected: format!("{} time steps", self.times.len()),
                found: format!("{} time steps", nt),
            });
        }
        for companion in &self.companions {
            self.check_companion(companion)?;
        }
        Ok(())
    }

    fn check_companion(&self, companion: &CompanionVariable) -> GridResult<()> {
        let (nt, ny, nx) = self.data.dim();
        let matches = match &companion.data {
            CompanionData::Spatial(a) => a.dim() == (ny, nx),
            CompanionData::SpatioTemporal(a) => a.dim() == (nt, ny, nx),
        };
        if !matches {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?}", (nt, ny, nx)),
                found: format!("{} with spatial shape {:?}", companion.name, companion.spatial_shape()),
            });
        }
        Ok(())
    }

    /// (time, rows, cols)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn time_len(&self) -> usize {
        self.times.len()
    }

    pub fn slice(&self, t: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), t)
    }

    pub fn add_companion(&mut self, companion: CompanionVariable) -> GridResult<()> {
        self.check_companion(&companion)?;
        self.companions.retain(|c| c.name != companion.name);
        self.companions.push(companion);
        Ok(())
    }

    pub fn companion(&self, name: &str) -> Option<&CompanionVariable> {
        self.companions.iter().find(|c| c.name == name)
    }

    /// Names of the primary variable followed by every companion
    pub fn variable_names(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.companions.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// Number of valid (non-missing) values in the primary variable
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Concatenate fields along time. All parts must share grid, variable and unit;
    /// values are passed through unchanged.
    pub fn concat_time(parts: Vec<GriddedField>) -> GridResult<GriddedField> {
        let mut iter = parts.into_iter();
        let mut merged = iter
            .next()
            .ok_or_else(|| GridError::Processing("No fields to concatenate".to_string()))?;

        for part in iter {
            if part.grid != merged.grid {
                return Err(GridError::ShapeMismatch {
                    expected: format!("grid {:?}", merged.grid.shape()),
                    found: format!("grid {:?} with different coordinates", part.grid.shape()),
                });
            }
            if part.name != merged.name || part.units != merged.units {
                return Err(GridError::UnitMismatch {
                    expected: format!("{} [{}]", merged.name, merged.units),
                    found: format!("{} [{}]", part.name, part.units),
                });
            }

            merged.data = concatenate(Axis(0), &[merged.data.view(), part.data.view()])
                .map_err(|e| GridError::Processing(format!("Failed to concatenate time axis: {}", e)))?;
            merged.times.extend(part.times);

            for companion in part.companions {
                let existing = merged.companions.iter_mut().find(|c| c.name == companion.name);
                match (existing, companion.data) {
                    (Some(target), CompanionData::SpatioTemporal(extra)) => match &target.data {
                        CompanionData::SpatioTemporal(current) => {
                            let joined = concatenate(Axis(0), &[current.view(), extra.view()]).map_err(|e| {
                                GridError::Processing(format!("Failed to concatenate {}: {}", companion.name, e))
                            })?;
                            target.data = CompanionData::SpatioTemporal(joined);
                        }
                        CompanionData::Spatial(_) => {
                            return Err(GridError::InvalidFormat(format!(
                                "Companion variable {} is static in the first field but time-varying later",
                                companion.name
                            )))
                        }
                    },
                    (Some(target), CompanionData::Spatial(_)) => {
                        // static companions are shared, the first copy is kept
                        if matches!(target.data, CompanionData::SpatioTemporal(_)) {
                            return Err(GridError::InvalidFormat(format!(
                                "Companion variable {} is time-varying in the first field but static later",
                                companion.name
                            )));
                        }
                    }
                    (None, _) => {
                        return Err(GridError::Processing(format!(
                            "Companion variable {} missing from first field",
                            companion.name
                        )))
                    }
                }
            }
        }

        merged.validate()?;
        Ok(merged)
    }
}

/// Error types for regridding and subsetting
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No grid cells inside domain: {0}")]
    EmptyDomain(String),

    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Unit mismatch: expected {expected}, found {found}")]
    UnitMismatch { expected: String, found: String },

    #[error("Unsupported interpolation: {0}")]
    UnsupportedInterpolation(String),

    #[error("Variable {name} not found in {}", .path.display())]
    MissingVariable { name: String, path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GridError {
    /// Errors raised while opening or decoding an input file, as left behind by a
    /// truncated or corrupt download
    pub fn is_read_failure(&self) -> bool {
        matches!(
            self,
            GridError::Io(_) | GridError::NetCdf(_) | GridError::Gdal(_) | GridError::InvalidFormat(_) | GridError::MissingVariable { .. }
        )
    }
}

/// Result type for regridding operations
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn field(values: f32, months: &[u32]) -> GriddedField {
        let grid = SpatialGrid::Regular { lat: vec![50.0, 51.0], lon: vec![0.0, 1.0, 2.0] };
        let times = months.iter().map(|m| date(2015, *m)).collect::<Vec<_>>();
        let data = Array3::from_elem((times.len(), 2, 3), values);
        GriddedField::new("lai", "none", data, grid, times, TimeResolution::Monthly).unwrap()
    }

    #[test]
    fn test_bbox_inclusive() {
        let bbox = BoundingBox::EURO_CORDEX;
        assert!(bbox.contains(-44.75, 21.75));
        assert!(bbox.contains(65.25, 72.75));
        assert!(!bbox.contains(65.26, 50.0));
        assert!(BoundingBox::new(1.0, 0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_shape_validation() {
        let grid = SpatialGrid::Regular { lat: vec![50.0, 51.0], lon: vec![0.0] };
        let data = Array3::<f32>::zeros((1, 2, 2));
        let result = GriddedField::new("x", "none", data, grid, vec![date(2015, 1)], TimeResolution::Monthly);
        assert!(matches!(result, Err(GridError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_concat_time_passes_values_through() {
        let merged = GriddedField::concat_time(vec![field(1.0, &[1, 2]), field(2.0, &[3])]).unwrap();
        assert_eq!(merged.shape(), (3, 2, 3));
        assert_eq!(merged.data[[1, 0, 0]], 1.0);
        assert_eq!(merged.data[[2, 1, 2]], 2.0);
        assert_eq!(merged.times[2], date(2015, 3));
    }

    #[test]
    fn test_concat_rejects_different_domain() {
        let mut other = field(2.0, &[3]);
        other.grid = SpatialGrid::Regular { lat: vec![50.0, 51.5], lon: vec![0.0, 1.0, 2.0] };
        assert!(GriddedField::concat_time(vec![field(1.0, &[1]), other]).is_err());
    }

    #[test]
    fn test_concat_joins_time_varying_companions() {
        let mut first = field(1.0, &[1]);
        first
            .add_companion(CompanionVariable::spatio_temporal("lai_err", "none", Array3::from_elem((1, 2, 3), 0.1)))
            .unwrap();
        let mut second = field(2.0, &[2, 3]);
        second
            .add_companion(CompanionVariable::spatio_temporal("lai_err", "none", Array3::from_elem((2, 2, 3), 0.2)))
            .unwrap();

        let merged = GriddedField::concat_time(vec![first, second]).unwrap();
        match &merged.companion("lai_err").unwrap().data {
            CompanionData::SpatioTemporal(stack) => {
                assert_eq!(stack.dim(), (3, 2, 3));
                assert_eq!(stack[[2, 0, 0]], 0.2);
            }
            CompanionData::Spatial(_) => panic!("companion lost its time axis"),
        }
    }

    #[test]
    fn test_concat_rejects_static_and_time_varying_companion() {
        let mut first = field(1.0, &[1]);
        first.add_companion(CompanionVariable::spatial("area", "km2", Array2::from_elem((2, 3), 4.0))).unwrap();
        let mut second = field(2.0, &[2]);
        second
            .add_companion(CompanionVariable::spatio_temporal("area", "km2", Array3::from_elem((1, 2, 3), 4.0)))
            .unwrap();
        let result = GriddedField::concat_time(vec![first, second]);
        assert!(matches!(result, Err(GridError::InvalidFormat(_))));

        let mut first = field(1.0, &[1]);
        first
            .add_companion(CompanionVariable::spatio_temporal("area", "km2", Array3::from_elem((1, 2, 3), 4.0)))
            .unwrap();
        let mut second = field(2.0, &[2]);
        second.add_companion(CompanionVariable::spatial("area", "km2", Array2::from_elem((2, 3), 4.0))).unwrap();
        let result = GriddedField::concat_time(vec![first, second]);
        assert!(matches!(result, Err(GridError::InvalidFormat(_))));
    }

    #[test]
    fn test_grid_extent() {
        let grid = SpatialGrid::Regular { lat: vec![51.0, 50.0], lon: vec![-1.5, 0.0, 2.25] };
        assert_eq!(grid.extent(), Some(BoundingBox { min_lon: -1.5, max_lon: 2.25, min_lat: 50.0, max_lat: 51.0 }));

        let lat = Array2::from_shape_vec((1, 2), vec![60.0, f64::NAN]).unwrap();
        let lon = Array2::from_shape_vec((1, 2), vec![10.0, 11.0]).unwrap();
        let curvilinear = SpatialGrid::Curvilinear { lat, lon };
        assert_eq!(curvilinear.extent().unwrap().max_lat, 60.0);

        assert_eq!(SpatialGrid::Regular { lat: vec![], lon: vec![0.0] }.extent(), None);
    }

    #[test]
    fn test_crs_display() {
        assert_eq!(CoordinateSystem::from_epsg(4326).to_string(), "EPSG:4326");
        assert_eq!(CoordinateSystem::from_epsg(3035), CoordinateSystem::Projected { epsg: 3035 });
    }
}
