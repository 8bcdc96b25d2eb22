//! Provenance record attached to every output product and the output naming convention.

use crate::types::{BoundingBox, GridResult, GriddedField, TimeResolution};
use std::io::Write;
use std::path::Path;

/// Authors credited on every EFMI product
pub const DEFAULT_AUTHORS: &str = "Dr. Rocio Barrio Guillo, Dr. Jasdeep S. Anand";

/// Fixed provenance record written with an output product
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceRecord {
    pub filename: String,
    pub variables: String,
    pub units: String,
    pub data_source: String,
    pub time_period: String,
    pub time_averaging: String,
    pub spatial_extent: String,
    pub coordinate_system: String,
    pub author_names: String,
    /// Extra free-text lines, e.g. where a derived quantity was computed
    pub notes: Vec<String>,
}

impl Default for ProvenanceRecord {
    fn default() -> Self {
        Self {
            filename: String::new(),
            variables: String::new(),
            units: String::new(),
            data_source: String::new(),
            time_period: String::new(),
            time_averaging: String::new(),
            spatial_extent: "Europe".to_string(),
            coordinate_system: "EPSG:4326".to_string(),
            author_names: DEFAULT_AUTHORS.to_string(),
            notes: Vec::new(),
        }
    }
}

impl ProvenanceRecord {
    /// Record pre-filled from a field's variables, units, time axis and CRS
    pub fn for_field(field: &GriddedField, filename: &str, data_source: &str) -> Self {
        let units = std::iter::once(field.units.clone())
            .chain(field.companions.iter().map(|c| c.units.clone()))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            filename: filename.to_string(),
            variables: field.variable_names().join(", "),
            units,
            data_source: data_source.to_string(),
            time_period: time_period_label(field),
            time_averaging: field.resolution.averaging_label().to_string(),
            coordinate_system: field.crs.to_string(),
            ..Self::default()
        }
    }

    /// Name the covered lon/lat range after the region label
    pub fn with_spatial_extent(mut self, bbox: &BoundingBox) -> Self {
        self.spatial_extent = format!(
            "Europe (lon {} to {}, lat {} to {})",
            bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat
        );
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Drop every inherited attribute and replace it with this record
    pub fn apply(&self, field: &mut GriddedField) {
        if !field.attributes.is_empty() {
            log::debug!("Clearing {} inherited attributes from '{}'", field.attributes.len(), field.name);
        }
        field.attributes.clear();
        for (key, value) in self.netcdf_attributes() {
            field.attributes.insert(key.to_string(), value);
        }
    }

    /// Global attribute names used in NetCDF products
    pub fn netcdf_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("Filename", self.filename.clone()),
            ("Variables", self.variables.clone()),
            ("Units", self.units.clone()),
            ("Data_source", self.data_source.clone()),
            ("Time_period", self.time_period.clone()),
            ("Time_averaging", self.time_averaging.clone()),
            ("Spatial_extent", self.spatial_extent.clone()),
            ("Coordinate_system", self.coordinate_system.clone()),
            ("Author_names", self.author_names.clone()),
        ];
        if !self.notes.is_empty() {
            attrs.push(("Notes", self.notes.join("; ")));
        }
        attrs
    }

    /// Band tag names used in GeoTIFF products
    pub fn band_tags(&self) -> Vec<(String, String)> {
        self.netcdf_attributes()
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect()
    }

    /// `Key: value` lines of the plain-text sidecar written next to vector products
    pub fn sidecar_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Filename: {}", self.filename),
            format!("Variables: {}", self.variables),
            format!("Units: {}", self.units),
            format!("Data source: {}", self.data_source),
            format!("Time period: {}", self.time_period),
            format!("Time averaging: {}", self.time_averaging),
            format!("Spatial extent: {}", self.spatial_extent),
            format!("Coordinate system: {}", self.coordinate_system),
            format!("Author names: {}", self.author_names),
        ];
        lines.extend(self.notes.iter().map(|n| format!("Note: {}", n)));
        lines
    }

    /// Write `metadata_<stem>.txt` in `dir`; returns its path
    pub fn write_sidecar(&self, dir: &Path, stem: &str) -> GridResult<std::path::PathBuf> {
        let path = dir.join(format!("metadata_{}.txt", stem));
        let mut file = std::fs::File::create(&path)?;
        for line in self.sidecar_lines() {
            writeln!(file, "{}", line)?;
        }
        log::info!("Metadata sidecar saved to: {}", path.display());
        Ok(path)
    }
}

/// "2015-01 to 2015-03" for monthly data, "2016" for a single year, ...
pub fn time_period_label(field: &GriddedField) -> String {
    let fmt = match field.resolution {
        TimeResolution::Monthly => "%Y-%m",
        TimeResolution::Annual => "%Y",
        _ => "%Y-%m-%d",
    };
    match (field.times.first(), field.times.last()) {
        (Some(first), Some(last)) if first == last => first.format(fmt).to_string(),
        (Some(first), Some(last)) => format!("{} to {}", first.format(fmt), last.format(fmt)),
        _ => String::new(),
    }
}

/// Builder for `rs_veg_europe_<variable>_none_<freq>_<start>[_<end>]_v<N>_<source>.<ext>`
#[derive(Debug, Clone)]
pub struct OutputName {
    variable: String,
    resolution: TimeResolution,
    start: String,
    end: Option<String>,
    version: u32,
    source: String,
    extension: String,
}

impl OutputName {
    pub fn new(variable: &str, resolution: TimeResolution, source: &str) -> Self {
        Self {
            variable: variable.to_string(),
            resolution,
            start: String::new(),
            end: None,
            version: 1,
            source: source.to_string(),
            extension: "nc".to_string(),
        }
    }

    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.start = start.to_string();
        self.end = if start == end { None } else { Some(end.to_string()) };
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.start = year.to_string();
        self.end = None;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn extension(mut self, ext: &str) -> Self {
        self.extension = ext.trim_start_matches('.').to_string();
        self
    }

    /// File name without extension
    pub fn stem(&self) -> String {
        let period = match &self.end {
            Some(end) => format!("{}_{}", self.start, end),
            None => self.start.clone(),
        };
        format!(
            "rs_veg_europe_{}_none_{}_{}_v{}_{}",
            self.variable,
            self.resolution.file_token(),
            period,
            self.version,
            self.source
        )
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.extension)
    }
}
