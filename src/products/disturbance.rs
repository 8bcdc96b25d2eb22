//! Forest disturbance events from vector databases: wind and storm damage
//! (FORWIND) and insect and disease damage (DEFID2).
//!
//! Polygons are clipped to the domain, dated, measured in an equal-area CRS and
//! written as an EPSG:4326 shapefile with a plain-text metadata sidecar.

use crate::config::RegridConfig;
use crate::core::metadata::{OutputName, ProvenanceRecord};
use crate::io::redownload::RedownloadQueue;
use crate::io::vector::{compute_areas, read_clipped, write_shapefile, VectorFeature, AREA_FIELD, EQUAL_AREA_EPSG};
use crate::pipeline::RunSummary;
use crate::types::{GridResult, TimeResolution};
use chrono::{Datelike, NaiveDate};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisturbanceSource {
    /// Wind disturbances in European forests 2000-2018
    Forwind,
    /// Database of European forest insect and disease disturbances
    Defid2,
}

impl DisturbanceSource {
    /// Directory under the input root and file name of the database
    pub fn input_location(&self) -> (&'static str, &'static str) {
        match self {
            DisturbanceSource::Forwind => ("FORWIND", "FORWIND_v2.shp"),
            DisturbanceSource::Defid2 => ("DEFID2", "defid2.gpkg"),
        }
    }

    pub fn date_field(&self) -> &'static str {
        match self {
            DisturbanceSource::Forwind => "EventDate",
            DisturbanceSource::Defid2 => "survey_date",
        }
    }

    /// Variable token of the output name
    pub fn variable(&self) -> &'static str {
        match self {
            DisturbanceSource::Forwind => "disturbanceWeather",
            DisturbanceSource::Defid2 => "disturbanceInsectsDisease",
        }
    }

    pub fn source_token(&self) -> &'static str {
        match self {
            DisturbanceSource::Forwind => "forwind",
            DisturbanceSource::Defid2 => "defid2",
        }
    }

    pub fn data_source(&self) -> &'static str {
        match self {
            DisturbanceSource::Forwind => "FORWIND database",
            DisturbanceSource::Defid2 => "DEFID2 database",
        }
    }

    /// Published coverage, used when no event date can be read
    pub fn published_period(&self) -> (NaiveDate, NaiveDate) {
        match self {
            DisturbanceSource::Forwind => (super::ymd(2000, 7, 25), super::ymd(2018, 10, 28)),
            DisturbanceSource::Defid2 => (super::ymd(1963, 8, 1), super::ymd(2021, 9, 30)),
        }
    }
}

impl std::str::FromStr for DisturbanceSource {
    type Err = crate::types::GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forwind" | "weather" => Ok(DisturbanceSource::Forwind),
            "defid2" | "insects" => Ok(DisturbanceSource::Defid2),
            other => Err(crate::types::GridError::Config(format!("Unknown disturbance source '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisturbanceParams {
    pub source: DisturbanceSource,
    /// Overrides the default database location
    pub input: Option<PathBuf>,
}

impl DisturbanceParams {
    pub fn new(source: DisturbanceSource) -> Self {
        Self { source, input: None }
    }
}

/// First and last event date, or the published coverage when none parsed
pub fn event_period(features: &[VectorFeature], source: DisturbanceSource) -> (NaiveDate, NaiveDate) {
    let dates = features.iter().filter_map(|f| f.date);
    let first = dates.clone().min();
    let last = dates.max();
    match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => source.published_period(),
    }
}

pub fn run(config: &RegridConfig, params: &DisturbanceParams) -> GridResult<RunSummary> {
    let source = params.source;
    let input = match &params.input {
        Some(path) => path.clone(),
        None => {
            let (dir, file) = source.input_location();
            config.input_dir(dir).join(file)
        }
    };

    let mut features = read_clipped(&input, &config.bbox, source.date_field())?;
    compute_areas(&mut features, EQUAL_AREA_EPSG)?;
    let total_ha: f64 = features.iter().map(|f| f.area_ha).sum();
    log::info!("{} disturbance polygons, {:.1} ha in total", features.len(), total_ha);

    let (first, last) = event_period(&features, source);
    let name = OutputName::new(source.variable(), TimeResolution::Event, source.source_token())
        .years(first.year(), last.year())
        .version(config.version)
        .extension("shp");
    let path = config.output_dir.join(name.file_name());
    write_shapefile(&features, &path)?;

    let record = ProvenanceRecord {
        filename: name.file_name(),
        variables: AREA_FIELD.to_string(),
        units: "Ha".to_string(),
        data_source: source.data_source().to_string(),
        time_period: format!("{} to {}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d")),
        time_averaging: TimeResolution::Event.averaging_label().to_string(),
        author_names: config.authors.clone(),
        ..ProvenanceRecord::default()
    }
    .with_note(format!("Areas computed in EPSG:{} (equal area)", EQUAL_AREA_EPSG));
    let sidecar = record.write_sidecar(&config.output_dir, &name.stem())?;

    Ok(RunSummary {
        outputs: vec![path, sidecar],
        time_steps: features.len(),
        redownload: RedownloadQueue::new(),
        missing_dates: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;
    use gdal::vector::{FieldValue, Geometry, LayerAccess, OGRFieldType, OGRwkbGeometryType};
    use gdal::LayerOptions;
    use gdal::{Dataset, DriverManager};
    use std::path::Path;

    fn write_forwind(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let driver = DriverManager::get_driver_by_name("ESRI Shapefile").unwrap();
        let mut dataset = driver.create_vector_only(path).unwrap();
        let srs = SpatialRef::from_epsg(4326).unwrap();
        srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        let mut layer = dataset
            .create_layer(LayerOptions {
                name: "FORWIND_v2",
                srs: Some(&srs),
                ty: OGRwkbGeometryType::wkbPolygon,
                options: None,
            })
            .unwrap();
        layer.create_defn_fields(&[("EventDate", OGRFieldType::OFTString)]).unwrap();
        for (wkt, date) in [
            ("POLYGON ((8 47, 8.05 47, 8.05 47.05, 8 47.05, 8 47))", "2003/07/12"),
            ("POLYGON ((14 46, 14.02 46, 14.02 46.02, 14 46.02, 14 46))", "2017-11-05"),
        ] {
            let geom = Geometry::from_wkt(wkt).unwrap();
            layer
                .create_feature_fields(geom, &["EventDate"], &[FieldValue::StringValue(date.to_string())])
                .unwrap();
        }
    }

    #[test]
    fn test_source_names() {
        assert_eq!("forwind".parse::<DisturbanceSource>().unwrap(), DisturbanceSource::Forwind);
        assert_eq!("DEFID2".parse::<DisturbanceSource>().unwrap(), DisturbanceSource::Defid2);
        assert!("fires".parse::<DisturbanceSource>().is_err());
        assert_eq!(DisturbanceSource::Defid2.date_field(), "survey_date");
    }

    #[test]
    fn test_weather_disturbance_run() {
        let root = tempfile::tempdir().unwrap();
        write_forwind(&root.path().join("FORWIND/FORWIND_v2.shp"));

        let config = RegridConfig {
            input_root: root.path().to_path_buf(),
            output_dir: root.path().join("out"),
            ..Default::default()
        };
        let summary = run(&config, &DisturbanceParams::new(DisturbanceSource::Forwind)).unwrap();
        assert_eq!(summary.time_steps, 2);

        let shapefile = &summary.outputs[0];
        assert!(shapefile.ends_with("rs_veg_europe_disturbanceWeather_none_event_2003_2017_v1_forwind.shp"));
        let dataset = Dataset::open(shapefile).unwrap();
        assert_eq!(dataset.layer(0).unwrap().feature_count(), 2);

        let sidecar = std::fs::read_to_string(&summary.outputs[1]).unwrap();
        assert!(sidecar.contains("Variables: area_ha"));
        assert!(sidecar.contains("Time period: 2003-07-12 to 2017-11-05"));
        assert!(sidecar.contains("Coordinate system: EPSG:4326"));
        assert!(sidecar.contains("EPSG:6933"));
    }
}
