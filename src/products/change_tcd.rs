//! Change in tree cover density from the CLMS High Resolution Layer (100 m, EPSG:3035).
//!
//! Each reference year is resampled in its own CRS to 1 km with nearest neighbour,
//! clipped to the domain projected into that CRS and differenced against 2012.

use super::ymd;
use crate::config::RegridConfig;
use crate::core::metadata::{OutputName, ProvenanceRecord};
use crate::core::regrid::{QuantityKind, Regridder};
use crate::io::archive::extract_directory;
use crate::io::geotiff::{project_bbox, GeoTiffReader, GeoTiffWriter, RasterLayer};
use crate::io::redownload::RedownloadQueue;
use crate::io::sources::FilePattern;
use crate::pipeline::RunSummary;
use crate::types::{CoordinateSystem, GridError, GridResult, TimeResolution};
use std::path::{Path, PathBuf};

pub const TCD_DIR: &str = "CLMS_TCD";

pub const DATA_SOURCE: &str = "Sentinel-2 Copernicus High-Resolution Layer Tree Cover Density dataset";

/// Unclassifiable (254) and outside-area (255) codes
pub const TCD_SENTINELS: [f32; 2] = [254.0, 255.0];

#[derive(Debug, Clone)]
pub struct ChangeTcdParams {
    pub base_year: i32,
    pub years: Vec<i32>,
    /// 100 m pixels per output pixel along each axis
    pub factor: usize,
    /// Unpack the downloaded ZIP archives first
    pub extract_archives: bool,
}

impl Default for ChangeTcdParams {
    fn default() -> Self {
        Self {
            base_year: 2012,
            years: vec![2015, 2018],
            factor: 10,
            extract_archives: false,
        }
    }
}

/// The 2018 archives unpack one directory level deeper
pub fn year_pattern(year: i32) -> FilePattern {
    if year == 2018 {
        FilePattern::new("TCD_{yyyy}/*/*/*.tif")
    } else {
        FilePattern::new("TCD_{yyyy}/*/*.tif")
    }
}

/// First GeoTIFF of a reference year
pub fn find_year_raster(tcd_dir: &Path, year: i32) -> GridResult<PathBuf> {
    let files = year_pattern(year).find(tcd_dir, ymd(year, 1, 1))?;
    if files.len() > 1 {
        log::warn!("{} rasters for {}, using {}", files.len(), year, files[0].display());
    }
    files
        .into_iter()
        .next()
        .ok_or_else(|| GridError::Processing(format!("No TCD raster for {} under {}", year, tcd_dir.display())))
}

/// Read, mask, resample and clip one reference year
pub fn prepare_year(path: &Path, config: &RegridConfig, factor: usize) -> GridResult<RasterLayer> {
    let layer = GeoTiffReader::read(path, &TCD_SENTINELS)?;
    let regridder = Regridder::for_quantity(QuantityKind::BoundedPercentage);
    let resampled = layer.resample(factor, &regridder)?;
    let bounds = project_bbox(&config.bbox, resampled.epsg, config.densify_points)?;
    resampled.clip(bounds)
}

fn provenance(config: &RegridConfig, params: &ChangeTcdParams, file_name: &str, year: i32, epsg: u32) -> ProvenanceRecord {
    ProvenanceRecord {
        filename: file_name.to_string(),
        variables: format!("% change in tree cover density from {}", params.base_year),
        units: "%".to_string(),
        data_source: DATA_SOURCE.to_string(),
        time_period: year.to_string(),
        time_averaging: TimeResolution::Annual.averaging_label().to_string(),
        coordinate_system: CoordinateSystem::from_epsg(epsg).to_string(),
        author_names: config.authors.clone(),
        ..ProvenanceRecord::default()
    }
}

pub fn run(config: &RegridConfig, params: &ChangeTcdParams) -> GridResult<RunSummary> {
    let tcd_dir = config.input_dir(TCD_DIR);
    if params.extract_archives {
        let extracted = extract_directory(&tcd_dir)?;
        log::info!("Extracted {} files", extracted.len());
    }

    log::info!("Base year {}", params.base_year);
    let base = prepare_year(&find_year_raster(&tcd_dir, params.base_year)?, config, params.factor)?;

    let mut outputs = Vec::new();
    for &year in &params.years {
        log::info!("Tree cover density change {}-{}", params.base_year, year);
        let layer = prepare_year(&find_year_raster(&tcd_dir, year)?, config, params.factor)?;
        let change = layer.difference(&base)?;

        let name = OutputName::new("changeTCD", TimeResolution::Annual, "clms")
            .year(year)
            .version(config.version)
            .extension("tif");
        let file_name = name.file_name();
        let record = provenance(config, params, &file_name, year, change.epsg);
        let path = config.output_dir.join(&file_name);
        GeoTiffWriter::write(&change, &path, &record.band_tags())?;
        outputs.push(path);
    }

    Ok(RunSummary {
        time_steps: outputs.len(),
        outputs,
        redownload: RedownloadQueue::new(),
        missing_dates: Vec::new(),
    })
}
