//! NetCDF / HDF5 reading and writing of gridded fields.
//!
//! Reads only the hyperslab covering the domain when a bounding box is set, so
//! continental subsets of global 300 m products fit in memory.

use crate::core::regrid::{RotatedPole, TargetGrid};
use crate::core::subset::DomainSubsetter;
use crate::types::{
    BoundingBox, CompanionData, CompanionVariable, GridError, GridResult, GriddedField, RasterStack, SpatialGrid,
    TimeResolution,
};
use crate::io::sources::month_end;
use chrono::{Datelike, Duration, NaiveDate};
use ndarray::{s, Array2, Array3, Axis};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

const TIME_UNITS: &str = "days since 1970-01-01 00:00:00";

/// Names and masking rules of the variable to load from a source file
#[derive(Debug, Clone)]
pub struct VariableSpec {
    /// Variable name, `GROUP/name` for variables inside an HDF5 group
    pub name: String,
    pub lat: String,
    pub lon: String,
    pub time: Option<String>,
    /// Raw values treated as missing in addition to `_FillValue` / `missing_value`
    pub sentinels: Vec<f32>,
    /// Unit to declare when the source carries none or a non-standard one
    pub units: Option<String>,
    /// Extra variables on the same grid to load as companions
    pub companions: Vec<String>,
}

impl VariableSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lat: "lat".to_string(),
            lon: "lon".to_string(),
            time: Some("time".to_string()),
            sentinels: Vec::new(),
            units: None,
            companions: Vec::new(),
        }
    }

    pub fn with_coords(mut self, lat: &str, lon: &str) -> Self {
        self.lat = lat.to_string();
        self.lon = lon.to_string();
        self
    }

    pub fn without_time(mut self) -> Self {
        self.time = None;
        self
    }

    pub fn with_sentinels(mut self, sentinels: &[f32]) -> Self {
        self.sentinels = sentinels.to_vec();
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn with_companion(mut self, name: &str) -> Self {
        self.companions.push(name.to_string());
        self
    }
}

/// Reader for NetCDF-4 / HDF5 gridded products
#[derive(Debug, Clone, Default)]
pub struct NetCdfReader {
    bbox: Option<BoundingBox>,
    resolution: Option<TimeResolution>,
}

impl NetCdfReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict reads to the hyperslab covering `bbox`
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Time resolution declared on loaded fields (daily when unset)
    pub fn with_resolution(mut self, resolution: TimeResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Open the file and drop it; fails for truncated or corrupt downloads
    pub fn verify_readable(path: &Path) -> GridResult<()> {
        let _file = netcdf::open(path)?;
        Ok(())
    }

    /// Load one variable with its coordinates.
    ///
    /// `date_hint` dates the single time step of files without a time variable.
    pub fn read_field(&self, path: &Path, spec: &VariableSpec, date_hint: Option<NaiveDate>) -> GridResult<GriddedField> {
        log::debug!("Reading '{}' from {}", spec.name, path.display());
        let file = netcdf::open(path)?;

        let lat_values = with_variable(&file, path, &spec.lat, |v| read_coordinate(v))?;
        let lon_values = with_variable(&file, path, &spec.lon, |v| read_coordinate(v))?;
        let (window, grid) = self.window(&lat_values, &lon_values)?;

        let (data, units) = with_variable(&file, path, &spec.name, |var| {
            let data = read_masked(var, &window, &spec.sentinels)?;
            let units = spec.units.clone().or_else(|| string_attribute(var, "units")).unwrap_or_else(|| "none".to_string());
            Ok((data, units))
        })?;

        let nt = data.dim().0;
        let times = match &spec.time {
            Some(time_name) if variable_exists(&file, time_name) => {
                with_variable(&file, path, time_name, |v| decode_times(v, path))?
            }
            _ => match date_hint {
                Some(date) if nt == 1 => vec![date],
                _ => {
                    return Err(GridError::InvalidFormat(format!(
                        "{} has {} time steps but no decodable time variable",
                        path.display(),
                        nt
                    )))
                }
            },
        };

        let display_name = spec.name.rsplit('/').next().unwrap_or(&spec.name).to_string();
        let resolution = self.resolution.unwrap_or(TimeResolution::Daily);
        let mut field = GriddedField::new(display_name, units, data, grid, times, resolution)?;

        for name in &spec.companions {
            let companion = with_variable(&file, path, name, |var| {
                let units = string_attribute(var, "units").unwrap_or_else(|| "none".to_string());
                let stack = read_masked(var, &window, &[])?;
                let data = if var.dimensions().len() == 2 {
                    CompanionData::Spatial(stack.index_axis(Axis(0), 0).to_owned())
                } else {
                    CompanionData::SpatioTemporal(stack)
                };
                Ok(CompanionVariable { name: name.rsplit('/').next().unwrap_or(name).to_string(), units, data })
            })?;
            field.add_companion(companion)?;
        }

        field.attributes = global_attributes(&file);
        log::debug!("Loaded '{}' {:?} from {}", field.name, field.shape(), path.display());
        Ok(field)
    }

    /// Regular target grid from the coordinate axes of a reference file
    pub fn read_target_grid(path: &Path, lat: &str, lon: &str) -> GridResult<TargetGrid> {
        let file = netcdf::open(path)?;
        let lat = with_variable(&file, path, lat, |v| Ok(v.get_values::<f64, _>(..)?))?;
        let lon = with_variable(&file, path, lon, |v| Ok(v.get_values::<f64, _>(..)?))?;
        TargetGrid::new(lat, lon)
    }

    /// Pole of a rotated-pole grid mapping variable (`rotated_pole` in CORDEX files)
    pub fn read_rotated_pole(path: &Path, mapping: &str) -> GridResult<RotatedPole> {
        let file = netcdf::open(path)?;
        with_variable(&file, path, mapping, |v| {
            match (
                numeric_attribute(v, "grid_north_pole_latitude"),
                numeric_attribute(v, "grid_north_pole_longitude"),
            ) {
                (Some(pole_lat), Some(pole_lon)) => Ok(RotatedPole { pole_lat, pole_lon }),
                _ => Err(GridError::Metadata(format!(
                    "{} in {} has no grid_north_pole attributes",
                    mapping,
                    path.display()
                ))),
            }
        })
    }

    /// Hyperslab to read and the grid it covers
    fn window(&self, lat: &Coordinate, lon: &Coordinate) -> GridResult<(Window, SpatialGrid)> {
        match (lat, lon) {
            (Coordinate::Axis(lat), Coordinate::Axis(lon)) => {
                let (rows, cols) = match &self.bbox {
                    Some(bbox) => DomainSubsetter::new(*bbox).regular_window(lat, lon)?,
                    None => (0..lat.len(), 0..lon.len()),
                };
                let grid = SpatialGrid::Regular { lat: lat[rows.clone()].to_vec(), lon: lon[cols.clone()].to_vec() };
                Ok((Window { rows, cols }, grid))
            }
            (Coordinate::Grid(lat), Coordinate::Grid(lon)) => {
                if lat.dim() != lon.dim() {
                    return Err(GridError::ShapeMismatch {
                        expected: format!("{:?}", lat.dim()),
                        found: format!("{:?}", lon.dim()),
                    });
                }
                let (nrows, ncols) = lat.dim();
                let window = match &self.bbox {
                    None => Window { rows: 0..nrows, cols: 0..ncols },
                    Some(bbox) => {
                        let mask = DomainSubsetter::new(*bbox).cell_mask(lat, lon);
                        let rows: Vec<usize> = (0..nrows).filter(|r| mask.row(*r).iter().any(|m| *m)).collect();
                        let cols: Vec<usize> = (0..ncols).filter(|c| mask.column(*c).iter().any(|m| *m)).collect();
                        match (rows.first(), rows.last(), cols.first(), cols.last()) {
                            (Some(r0), Some(r1), Some(c0), Some(c1)) => Window { rows: *r0..r1 + 1, cols: *c0..c1 + 1 },
                            _ => return Err(GridError::EmptyDomain(format!("no 2-D grid cell inside {:?}", bbox))),
                        }
                    }
                };
                let grid = SpatialGrid::Curvilinear {
                    lat: lat.slice(s![window.rows.clone(), window.cols.clone()]).to_owned(),
                    lon: lon.slice(s![window.rows.clone(), window.cols.clone()]).to_owned(),
                };
                Ok((window, grid))
            }
            _ => Err(GridError::InvalidFormat(
                "Latitude and longitude must both be 1-D or both be 2-D".to_string(),
            )),
        }
    }
}

/// Writer for gridded fields
pub struct NetCdfWriter;

impl NetCdfWriter {
    /// Write the field, its companions and its attributes as one NetCDF-4 file.
    ///
    /// The file is assembled under a temporary name and renamed on success, so a
    /// failed write never leaves a partial product behind.
    pub fn write(field: &GriddedField, path: &Path) -> GridResult<()> {
        field.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let partial = partial_path(path);
        match Self::write_file(field, &partial) {
            Ok(()) => {
                std::fs::rename(&partial, path)?;
                let (nt, ny, nx) = field.shape();
                log::info!("Saved '{}' ({}x{}x{}) to: {}", field.name, nt, ny, nx, path.display());
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                log::error!("Failed to write {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    fn write_file(field: &GriddedField, path: &Path) -> GridResult<()> {
        let (nt, ny, nx) = field.shape();
        let mut file = netcdf::create(path)?;

        let (ydim, xdim) = if field.grid.is_regular() { ("lat", "lon") } else { ("y", "x") };
        file.add_dimension("time", nt)?;
        file.add_dimension(ydim, ny)?;
        file.add_dimension(xdim, nx)?;

        {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                .ok_or_else(|| GridError::Processing("Invalid epoch".to_string()))?;
            let days: Vec<f64> = field.times.iter().map(|t| (*t - epoch).num_days() as f64).collect();
            let mut time_var = file.add_variable::<f64>("time", &["time"])?;
            time_var.put_attribute("units", TIME_UNITS)?;
            time_var.put_attribute("calendar", "standard")?;
            time_var.put_attribute("standard_name", "time")?;
            time_var.put_values(&days, ..)?;
        }

        match &field.grid {
            SpatialGrid::Regular { lat, lon } => {
                let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
                lat_var.put_attribute("units", "degrees_north")?;
                lat_var.put_attribute("standard_name", "latitude")?;
                lat_var.put_values(lat, ..)?;

                let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
                lon_var.put_attribute("units", "degrees_east")?;
                lon_var.put_attribute("standard_name", "longitude")?;
                lon_var.put_values(lon, ..)?;
            }
            SpatialGrid::Curvilinear { lat, lon } => {
                let mut lat_var = file.add_variable::<f64>("lat", &["y", "x"])?;
                lat_var.put_attribute("units", "degrees_north")?;
                lat_var.put_attribute("standard_name", "latitude")?;
                lat_var.put_values(&lat.iter().copied().collect::<Vec<_>>(), ..)?;

                let mut lon_var = file.add_variable::<f64>("lon", &["y", "x"])?;
                lon_var.put_attribute("units", "degrees_east")?;
                lon_var.put_attribute("standard_name", "longitude")?;
                lon_var.put_values(&lon.iter().copied().collect::<Vec<_>>(), ..)?;
            }
        }

        let fill = field.fill_value;

        {
            let mut var = file.add_variable::<f32>(&field.name, &["time", ydim, xdim])?;
            var.put_attribute("_FillValue", fill)?;
            var.put_attribute("units", field.units.as_str())?;
            if !field.grid.is_regular() {
                var.put_attribute("coordinates", "lat lon")?;
            }
            var.put_values(&with_fill(field.data.iter(), fill), ..)?;
        }

        for companion in &field.companions {
            let (dims, values): (Vec<&str>, Vec<f32>) = match &companion.data {
                CompanionData::Spatial(a) => (vec![ydim, xdim], with_fill(a.iter(), fill)),
                CompanionData::SpatioTemporal(a) => (vec!["time", ydim, xdim], with_fill(a.iter(), fill)),
            };
            let mut var = file.add_variable::<f32>(&companion.name, &dims)?;
            var.put_attribute("_FillValue", fill)?;
            var.put_attribute("units", companion.units.as_str())?;
            var.put_values(&values, ..)?;
        }

        for (key, value) in &field.attributes {
            file.add_attribute(key, value.as_str())?;
        }
        Ok(())
    }
}

/// Values in memory order with NaN replaced by the declared fill value
fn with_fill<'a>(values: impl Iterator<Item = &'a f32>, fill: f32) -> Vec<f32> {
    values.map(|v| if v.is_nan() { fill } else { *v }).collect()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// 1-D axis or 2-D per-cell coordinate
enum Coordinate {
    Axis(Vec<f64>),
    Grid(Array2<f64>),
}

/// Row and column ranges of the hyperslab to read
struct Window {
    rows: Range<usize>,
    cols: Range<usize>,
}

/// Run `f` on a variable addressed by name or `GROUP/name`
fn with_variable<T>(
    file: &netcdf::File,
    path: &Path,
    name: &str,
    f: impl FnOnce(&netcdf::Variable) -> GridResult<T>,
) -> GridResult<T> {
    let missing = || GridError::MissingVariable { name: name.to_string(), path: path.to_path_buf() };
    match name.split_once('/') {
        Some((group_name, var_name)) => {
            let group = file.group(group_name)?.ok_or_else(missing)?;
            let var = group.variable(var_name).ok_or_else(missing)?;
            f(&var)
        }
        None => {
            let var = file.variable(name).ok_or_else(missing)?;
            f(&var)
        }
    }
}

fn variable_exists(file: &netcdf::File, name: &str) -> bool {
    match name.split_once('/') {
        Some((group_name, var_name)) => matches!(
            file.group(group_name),
            Ok(Some(group)) if group.variable(var_name).is_some()
        ),
        None => file.variable(name).is_some(),
    }
}

fn read_coordinate(var: &netcdf::Variable) -> GridResult<Coordinate> {
    let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let values = var.get_values::<f64, _>(..)?;
    match dims.as_slice() {
        [_] => Ok(Coordinate::Axis(values)),
        [rows, cols] => Array2::from_shape_vec((*rows, *cols), values)
            .map(Coordinate::Grid)
            .map_err(|e| GridError::InvalidFormat(format!("Bad 2-D coordinate: {}", e))),
        other => Err(GridError::InvalidFormat(format!("Coordinate with {} dimensions", other.len()))),
    }
}

/// Read the window of a (y, x) or (time, y, x) variable as a stack with every
/// fill, missing and sentinel value set to NaN and packing undone
fn read_masked(var: &netcdf::Variable, window: &Window, sentinels: &[f32]) -> GridResult<RasterStack> {
    let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let (rows, cols) = (window.rows.clone(), window.cols.clone());
    let (ny, nx) = (rows.len(), cols.len());

    let (nt, raw) = match dims.as_slice() {
        [y, x] if rows.end <= *y && cols.end <= *x => (1, var.get_values::<f32, _>((rows, cols))?),
        [t, y, x] if rows.end <= *y && cols.end <= *x => (*t, var.get_values::<f32, _>((0..*t, rows, cols))?),
        other => {
            return Err(GridError::InvalidFormat(format!(
                "Variable has dimensions {:?}, expected (y, x) or (time, y, x) covering rows {:?} and columns {:?}",
                other, window.rows, window.cols
            )))
        }
    };

    let mut missing: Vec<f32> = sentinels.to_vec();
    missing.extend(numeric_attribute(var, "_FillValue").map(|v| v as f32));
    missing.extend(numeric_attribute(var, "missing_value").map(|v| v as f32));
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);
    let packed = scale != 1.0 || offset != 0.0;

    let values: Vec<f32> = raw
        .into_iter()
        .map(|v| {
            if v.is_nan() || missing.contains(&v) {
                f32::NAN
            } else if packed {
                (v as f64 * scale + offset) as f32
            } else {
                v
            }
        })
        .collect();

    Array3::from_shape_vec((nt, ny, nx), values)
        .map_err(|e| GridError::Processing(format!("Failed to reshape variable data: {}", e)))
}

fn has_attribute(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attribute(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attribute(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    String::try_from(value).ok()
}

fn global_attributes(file: &netcdf::File) -> BTreeMap<String, String> {
    file.attributes()
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            String::try_from(value).ok().map(|v| (attr.name().to_string(), v))
        })
        .collect()
}

/// Decode a CF time variable (`<unit> since <date>[ <time>]`) to dates, honouring
/// its `calendar` attribute
fn decode_times(var: &netcdf::Variable, path: &Path) -> GridResult<Vec<NaiveDate>> {
    let units = string_attribute(var, "units").ok_or_else(|| {
        GridError::InvalidFormat(format!("Time variable in {} has no units", path.display()))
    })?;
    let calendar = CfCalendar::parse(string_attribute(var, "calendar").as_deref())?;
    let offsets = var.get_values::<f64, _>(..)?;
    parse_cf_times(&units, calendar, &offsets)
}

/// CF calendars of model output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfCalendar {
    /// `standard`, `gregorian`, `proleptic_gregorian` or no attribute
    Gregorian,
    /// `noleap` / `365_day`
    NoLeap,
    /// `all_leap` / `366_day`
    AllLeap,
    /// `360_day`, twelve months of 30 days
    Day360,
}

const NOLEAP_MONTH_STARTS: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
const ALL_LEAP_MONTH_STARTS: [u32; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

impl CfCalendar {
    pub fn parse(name: Option<&str>) -> GridResult<Self> {
        let name = name.map(|n| n.trim().to_ascii_lowercase());
        match name.as_deref() {
            None | Some("") | Some("standard") | Some("gregorian") | Some("proleptic_gregorian") => {
                Ok(CfCalendar::Gregorian)
            }
            Some("noleap") | Some("365_day") => Ok(CfCalendar::NoLeap),
            Some("all_leap") | Some("366_day") => Ok(CfCalendar::AllLeap),
            Some("360_day") => Ok(CfCalendar::Day360),
            Some(other) => Err(GridError::InvalidFormat(format!("Unsupported calendar '{}'", other))),
        }
    }

    fn year_length(&self) -> i64 {
        match self {
            CfCalendar::Gregorian | CfCalendar::NoLeap => 365,
            CfCalendar::AllLeap => 366,
            CfCalendar::Day360 => 360,
        }
    }

    /// Day of year (from 0) at which each month starts
    fn month_starts(&self) -> [u32; 12] {
        match self {
            CfCalendar::AllLeap => ALL_LEAP_MONTH_STARTS,
            CfCalendar::Day360 => [0, 30, 60, 90, 120, 150, 180, 210, 240, 270, 300, 330],
            CfCalendar::Gregorian | CfCalendar::NoLeap => NOLEAP_MONTH_STARTS,
        }
    }

    /// Days since year 0 of a fixed-length calendar date
    fn day_number(&self, year: i32, month: u32, day: u32) -> i64 {
        let starts = self.month_starts();
        let month_index = (month.clamp(1, 12) - 1) as usize;
        year as i64 * self.year_length() + starts[month_index] as i64 + day as i64 - 1
    }

    /// Calendar date of a day number. Days that do not exist in the Gregorian
    /// calendar (30 February) are clamped to the end of the month.
    fn date_of(&self, number: i64) -> GridResult<NaiveDate> {
        let year = number.div_euclid(self.year_length());
        let day_of_year = number.rem_euclid(self.year_length()) as u32;
        let starts = self.month_starts();
        let month_index = starts.iter().rposition(|s| *s <= day_of_year).unwrap_or(0);
        let day = day_of_year - starts[month_index] + 1;

        let first = i32::try_from(year)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, month_index as u32 + 1, 1))
            .ok_or_else(|| GridError::InvalidFormat(format!("Day {} is outside the supported date range", number)))?;
        let last = month_end(first);
        Ok(if day > last.day() { last } else { first + Duration::days(day as i64 - 1) })
    }
}

/// Split a CF reference (`yyyy-mm-dd[ T]hh:mm:ss`) into its date and the seconds
/// into that day. Dates are kept as numbers since `360_day` references like
/// `2000-02-30` are not valid Gregorian dates.
fn parse_reference(reference: &str) -> Option<((i32, u32, u32), f64)> {
    let reference = reference.trim().replace('T', " ");
    let mut parts = reference.split_whitespace();
    let mut ymd = parts.next()?.splitn(3, '-');
    let year = ymd.next()?.parse::<i32>().ok()?;
    let month = ymd.next()?.parse::<u32>().ok()?;
    let day_digits: String = ymd.next()?.chars().take_while(|c| c.is_ascii_digit()).collect();
    let day = day_digits.parse::<u32>().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let seconds = match parts.next() {
        Some(time) => {
            let time = time.trim_end_matches('Z');
            let mut total = 0.0;
            for (field, scale) in time.split(':').zip([3_600.0, 60.0, 1.0]) {
                total += field.parse::<f64>().ok()? * scale;
            }
            total
        }
        None => 0.0,
    };
    Some(((year, month, day), seconds))
}

/// Convert CF offsets to dates. Supports days, hours, minutes and seconds in the
/// Gregorian, 365-day, 366-day and 360-day calendars.
pub fn parse_cf_times(units: &str, calendar: CfCalendar, offsets: &[f64]) -> GridResult<Vec<NaiveDate>> {
    let bad = || GridError::InvalidFormat(format!("Unsupported time units '{}'", units));
    let parts: Vec<&str> = units.splitn(3, ' ').collect();
    if parts.len() < 3 || parts[1] != "since" {
        return Err(bad());
    }
    let seconds_per_unit = match parts[0].to_lowercase().as_str() {
        "days" | "day" => 86_400.0,
        "hours" | "hour" => 3_600.0,
        "minutes" | "minute" => 60.0,
        "seconds" | "second" | "s" => 1.0,
        _ => return Err(bad()),
    };
    let ((year, month, day), base_seconds) = parse_reference(parts[2]).ok_or_else(bad)?;

    match calendar {
        CfCalendar::Gregorian => {
            let base = NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(bad)?;
            Ok(offsets
                .iter()
                .map(|offset| {
                    let seconds = (offset * seconds_per_unit + base_seconds).round() as i64;
                    (base + Duration::seconds(seconds)).date()
                })
                .collect())
        }
        _ => {
            let base_day = calendar.day_number(year, month, day);
            offsets
                .iter()
                .map(|offset| {
                    let seconds = (offset * seconds_per_unit + base_seconds).round() as i64;
                    calendar.date_of(base_day + seconds.div_euclid(86_400))
                })
                .collect()
        }
    }
}
