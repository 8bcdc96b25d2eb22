//! Land surface temperature from ESA-CCI LST MODIS Terra daily L3C files.
//!
//! Day and night overpasses are averaged per month separately, then combined
//! with an equal-weight mean. A cell is missing when either overpass is.

use super::{output_name, ymd};
use crate::config::RegridConfig;
use crate::core::temporal::TemporalAggregator;
use crate::io::loader::{LoadOutcome, LoaderParams, SourceLoader};
use crate::io::netcdf_store::VariableSpec;
use crate::io::sources::{Cadence, EraTable};
use crate::pipeline::{CompositePipeline, CompositeSpec, RunSummary};
use crate::types::{CompanionData, CompanionVariable, GridError, GridResult, GriddedField, TimeResolution};
use chrono::NaiveDate;
use ndarray::Axis;

pub const DATA_SOURCE: &str = "ESA LST CCI MODIST L3U V3.00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overpass {
    Day,
    Night,
}

impl Overpass {
    /// `<yyyy>/<mm>/<dd>/` tree with the overpass in the file name
    pub fn pattern(&self) -> &'static str {
        match self {
            Overpass::Day => "{yyyy}/{mm}/*/*DAY*.nc",
            Overpass::Night => "{yyyy}/{mm}/*/*NIGHT*.nc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LstParams {
    /// Top of the `TERRA_MODIS_L3C_0.01/<version>` tree
    pub input_dir: std::path::PathBuf,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for LstParams {
    fn default() -> Self {
        Self {
            input_dir: std::path::PathBuf::from("TERRA_MODIS_L3C_0.01/4.00"),
            start: ymd(2000, 3, 1),
            end: ymd(2018, 12, 31),
        }
    }
}

pub fn overpass_loader(config: &RegridConfig, params: &LstParams, overpass: Overpass) -> LoaderParams {
    LoaderParams::new(
        &config.input_root.join(&params.input_dir),
        EraTable::single("MODIS Terra", overpass.pattern()),
        VariableSpec::new("lst").with_units("K"),
    )
    .with_cadence(Cadence::Daily)
}

/// Product description; the loader is the day overpass, night uses the same settings
pub fn composite_spec(config: &RegridConfig, params: &LstParams) -> CompositeSpec {
    let output = output_name(config, "lst", TimeResolution::Monthly, "esacci", params.start, params.end);
    let mut spec = CompositeSpec::new(
        "lst",
        overpass_loader(config, params, Overpass::Day),
        params.start,
        params.end,
        output,
    );
    spec.data_source = DATA_SOURCE.to_string();
    spec.notes.push("Mean of the monthly day and night means".to_string());
    spec
}

/// Keep the time steps listed in `keep`, companions included
pub fn select_times(field: &GriddedField, keep: &[NaiveDate]) -> GridResult<GriddedField> {
    let idx: Vec<usize> = field
        .times
        .iter()
        .enumerate()
        .filter(|(_, t)| keep.contains(t))
        .map(|(i, _)| i)
        .collect();

    let mut out = field.clone();
    out.data = field.data.select(Axis(0), &idx);
    out.times = idx.iter().map(|i| field.times[*i]).collect();
    out.companions = field
        .companions
        .iter()
        .map(|c| CompanionVariable {
            name: c.name.clone(),
            units: c.units.clone(),
            data: match &c.data {
                CompanionData::Spatial(a) => CompanionData::Spatial(a.clone()),
                CompanionData::SpatioTemporal(a) => CompanionData::SpatioTemporal(a.select(Axis(0), &idx)),
            },
        })
        .collect();
    out.validate()?;
    Ok(out)
}

fn load_overpass(config: &RegridConfig, params: &LstParams, overpass: Overpass) -> GridResult<LoadOutcome> {
    log::info!("Loading {:?} overpass", overpass);
    let loader = SourceLoader::new(overpass_loader(config, params, overpass).with_bbox(Some(config.bbox)));
    loader.load(params.start, params.end)
}

pub fn run(config: &RegridConfig, params: &LstParams) -> GridResult<RunSummary> {
    let pipeline = CompositePipeline::new(config.clone());
    let spec = composite_spec(config, params);

    let day = load_overpass(config, params, Overpass::Day)?;
    let night = load_overpass(config, params, Overpass::Night)?;

    let common: Vec<NaiveDate> = day.field.times.iter().filter(|t| night.field.times.contains(t)).copied().collect();
    if common.is_empty() {
        return Err(GridError::Processing("No month has both day and night LST".to_string()));
    }
    let dropped = day.field.time_len() + night.field.time_len() - 2 * common.len();
    if dropped > 0 {
        log::warn!("{} monthly means without a matching overpass are left out", dropped);
    }

    let combined = TemporalAggregator::pairwise_mean(
        &select_times(&day.field, &common)?,
        &select_times(&night.field, &common)?,
    )?;

    let mut field = pipeline.transform(combined, &spec)?;
    let file_name = spec.output.file_name();
    pipeline.annotate(&mut field, &file_name, &spec.data_source, &spec.notes);
    let path = pipeline.write_netcdf(&field, &file_name)?;

    let mut redownload = day.redownload;
    redownload.extend(night.redownload);
    pipeline.handle_redownload("lst", &redownload)?;

    let mut missing_dates = day.missing_dates;
    missing_dates.extend(night.missing_dates);
    missing_dates.sort();
    missing_dates.dedup();

    Ok(RunSummary { outputs: vec![path], time_steps: field.time_len(), redownload, missing_dates })
}
