//! EURO-CORDEX climate projections regridded onto a reference lat/lon grid
//! (the ERA5-Land grid for the published files) with bilinear interpolation.

use crate::config::RegridConfig;
use crate::core::regrid::{Interpolation, QuantityKind, Regridder, TargetGrid};
use crate::io::netcdf_store::{NetCdfReader, VariableSpec};
use crate::io::sources::month_start;
use crate::pipeline::{CompositePipeline, RunSummary};
use crate::types::{GridError, GridResult, GriddedField, TimeResolution};
use chrono::Datelike;
use std::path::{Path, PathBuf};

/// How the source grid is described in the projection file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceGrid {
    /// 1-D rotated axes plus a grid-mapping variable carrying the pole
    Rotated { rlat: String, rlon: String, mapping: String },
    /// Plain 1-D latitude and longitude axes
    Geographic { lat: String, lon: String },
}

impl Default for SourceGrid {
    fn default() -> Self {
        SourceGrid::Rotated {
            rlat: "rlat".to_string(),
            rlon: "rlon".to_string(),
            mapping: "rotated_pole".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionParams {
    /// Model output split into time chunks, in any order
    pub inputs: Vec<PathBuf>,
    /// File whose `lat`/`lon` axes define the target grid
    pub target_grid: PathBuf,
    pub variable: String,
    /// Regional climate model, e.g. HIRHAM5 or RACMO22E
    pub model: String,
    /// Emission scenario, e.g. RCP26, RCP45, RCP85
    pub scenario: String,
    pub source_grid: SourceGrid,
}

impl ProjectionParams {
    pub fn new(inputs: Vec<PathBuf>, target_grid: PathBuf, variable: &str, model: &str, scenario: &str) -> Self {
        Self {
            inputs,
            target_grid,
            variable: variable.to_string(),
            model: model.to_string(),
            scenario: scenario.to_string(),
            source_grid: SourceGrid::default(),
        }
    }
}

/// `<variable>_Europe_<model>_<scenario>_mon_<start>_<end>.nc`
pub fn output_file_name(params: &ProjectionParams, start_year: i32, end_year: i32) -> String {
    format!(
        "{}_Europe_{}_{}_mon_{}_{}.nc",
        params.variable, params.model, params.scenario, start_year, end_year
    )
}

/// Read one chunk and interpolate it onto the target grid
fn regrid_chunk(
    input: &Path,
    params: &ProjectionParams,
    reader: &NetCdfReader,
    regridder: &Regridder,
    target: &TargetGrid,
) -> GridResult<GriddedField> {
    log::info!("Regridding chunk {}", input.display());
    match &params.source_grid {
        SourceGrid::Rotated { rlat, rlon, mapping } => {
            let pole = NetCdfReader::read_rotated_pole(input, mapping)?;
            log::debug!("Rotated pole at {}N {}E", pole.pole_lat, pole.pole_lon);
            let spec = VariableSpec::new(&params.variable).with_coords(rlat, rlon);
            let field = reader.read_field(input, &spec, None)?;
            regridder.regrid_from_rotated(&field, &pole, target)
        }
        SourceGrid::Geographic { lat, lon } => {
            let spec = VariableSpec::new(&params.variable).with_coords(lat, lon);
            let field = reader.read_field(input, &spec, None)?;
            regridder.regrid_field(&field, target)
        }
    }
}

pub fn run(config: &RegridConfig, params: &ProjectionParams) -> GridResult<RunSummary> {
    log::info!(
        "Regridding {} {} {} ({} files) onto {}",
        params.variable,
        params.model,
        params.scenario,
        params.inputs.len(),
        params.target_grid.display()
    );
    if params.inputs.is_empty() {
        return Err(GridError::Config(format!("No input files for {}", params.variable)));
    }
    let target = NetCdfReader::read_target_grid(&params.target_grid, "lat", "lon")?;
    let reader = NetCdfReader::new().with_resolution(TimeResolution::Monthly);
    let regridder = Regridder::new(QuantityKind::Continuous, Interpolation::Bilinear)?;

    let mut chunks = params
        .inputs
        .iter()
        .map(|input| regrid_chunk(input, params, &reader, &regridder, &target))
        .collect::<GridResult<Vec<_>>>()?;
    chunks.sort_by_key(|chunk| chunk.times.first().copied());
    let mut field = GriddedField::concat_time(chunks)?;

    // monthly values are stamped mid-month in the model output
    for t in field.times.iter_mut() {
        *t = month_start(*t);
    }
    if let Some(pair) = field.times.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(GridError::Processing(format!(
            "Input chunks overlap or repeat a month: {} followed by {}",
            pair[0], pair[1]
        )));
    }

    let (start_year, end_year) = match (field.times.first(), field.times.last()) {
        (Some(first), Some(last)) => (first.year(), last.year()),
        _ => return Err(GridError::Processing(format!("{} has no time steps", params.variable))),
    };
    let file_name = output_file_name(params, start_year, end_year);

    let pipeline = CompositePipeline::new(config.clone());
    let data_source = format!("EURO-CORDEX {} {}", params.model, params.scenario);
    let notes = vec!["Bilinear interpolation onto the ERA5-Land grid".to_string()];
    pipeline.annotate(&mut field, &file_name, &data_source, &notes);
    let path = pipeline.write_netcdf(&field, &file_name)?;

    Ok(RunSummary::single(path, field.time_len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn write_cordex(path: &Path, calendar: &str, offsets: [f64; 2], values: [f32; 2]) {
        let rlat: Vec<f64> = (0..9).map(|i| -2.0 + i as f64 * 0.5).collect();
        let rlon = rlat.clone();
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("time", 2).unwrap();
        file.add_dimension("rlat", rlat.len()).unwrap();
        file.add_dimension("rlon", rlon.len()).unwrap();

        let mut var = file.add_variable::<f64>("time", &["time"]).unwrap();
        var.put_attribute("units", "days since 2006-01-01 00:00:00").unwrap();
        var.put_attribute("calendar", calendar).unwrap();
        var.put_values(&offsets, ..).unwrap();
        let mut var = file.add_variable::<f64>("rlat", &["rlat"]).unwrap();
        var.put_values(&rlat, ..).unwrap();
        let mut var = file.add_variable::<f64>("rlon", &["rlon"]).unwrap();
        var.put_values(&rlon, ..).unwrap();

        let mut pole = file.add_variable::<i32>("rotated_pole", &[]).unwrap();
        pole.put_attribute("grid_north_pole_latitude", 39.25f64).unwrap();
        pole.put_attribute("grid_north_pole_longitude", -162.0f64).unwrap();

        let values: Vec<f32> = (0..2 * 81).map(|i| if i < 81 { values[0] } else { values[1] }).collect();
        let mut tas = file.add_variable::<f32>("tas", &["time", "rlat", "rlon"]).unwrap();
        tas.put_attribute("units", "K").unwrap();
        tas.put_values(&values, ..).unwrap();
    }

    fn write_target(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("lat", 2).unwrap();
        file.add_dimension("lon", 3).unwrap();
        let mut var = file.add_variable::<f64>("lat", &["lat"]).unwrap();
        var.put_values(&[50.5, 51.0], ..).unwrap();
        let mut var = file.add_variable::<f64>("lon", &["lon"]).unwrap();
        var.put_values(&[17.5, 18.0, 18.5], ..).unwrap();
    }

    #[test]
    fn test_output_name() {
        let params = ProjectionParams::new(vec!["in.nc".into()], "grid.nc".into(), "meantair", "HIRHAM5", "RCP26");
        assert_eq!(output_file_name(&params, 2006, 2100), "meantair_Europe_HIRHAM5_RCP26_mon_2006_2100.nc");
    }

    #[test]
    fn test_rotated_projection_onto_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tas_mon.nc");
        let grid = dir.path().join("era5_land_targetgrid.nc");
        write_cordex(&input, "standard", [15.0, 45.0], [275.0, 280.0]);
        write_target(&grid);

        let config = RegridConfig { output_dir: dir.path().join("out"), ..Default::default() };
        let params = ProjectionParams::new(vec![input], grid, "tas", "RACMO22E", "RCP45");
        let summary = run(&config, &params).unwrap();
        assert_eq!(summary.time_steps, 2);
        assert!(summary.outputs[0].ends_with("tas_Europe_RACMO22E_RCP45_mon_2006_2006.nc"));

        let back = NetCdfReader::new()
            .read_field(&summary.outputs[0], &VariableSpec::new("tas"), None)
            .unwrap();
        assert_eq!(back.shape(), (2, 2, 3));
        assert_relative_eq!(back.data[[0, 0, 0]], 275.0);
        assert_relative_eq!(back.data[[1, 1, 2]], 280.0);
        assert_eq!(back.times[1], crate::products::ymd(2006, 2, 1));
    }

    #[test]
    fn test_chunks_concatenated_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let early = dir.path().join("tas_200601-200602.nc");
        let late = dir.path().join("tas_200603-200604.nc");
        let grid = dir.path().join("era5_land_targetgrid.nc");
        // 360-day calendar: day 75 is 2006-03-16, day 105 is 2006-04-16
        write_cordex(&early, "360_day", [15.0, 45.0], [275.0, 276.0]);
        write_cordex(&late, "360_day", [75.0, 105.0], [277.0, 278.0]);
        write_target(&grid);

        let config = RegridConfig { output_dir: dir.path().join("out"), ..Default::default() };
        let params = ProjectionParams::new(vec![late, early], grid, "tas", "HIRHAM5", "RCP85");
        let summary = run(&config, &params).unwrap();
        assert_eq!(summary.time_steps, 4);

        let back = NetCdfReader::new()
            .read_field(&summary.outputs[0], &VariableSpec::new("tas"), None)
            .unwrap();
        assert_eq!(back.shape(), (4, 2, 3));
        let months: Vec<u32> = back.times.iter().map(|t| t.month()).collect();
        assert_eq!(months, vec![1, 2, 3, 4]);
        for (step, expected) in [275.0, 276.0, 277.0, 278.0].iter().enumerate() {
            assert_relative_eq!(back.data[[step, 1, 1]], *expected);
        }
    }

    #[test]
    fn test_overlapping_chunks_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("tas_a.nc");
        let second = dir.path().join("tas_b.nc");
        let grid = dir.path().join("era5_land_targetgrid.nc");
        write_cordex(&first, "noleap", [15.0, 45.0], [275.0, 276.0]);
        write_cordex(&second, "noleap", [45.0, 74.0], [276.0, 277.0]);
        write_target(&grid);

        let config = RegridConfig { output_dir: dir.path().join("out"), ..Default::default() };
        let params = ProjectionParams::new(vec![first, second], grid, "tas", "HIRHAM5", "RCP85");
        assert!(matches!(run(&config, &params), Err(GridError::Processing(_))));
    }

    #[test]
    fn test_unknown_calendar_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tas_mon.nc");
        let grid = dir.path().join("era5_land_targetgrid.nc");
        write_cordex(&input, "julian_mars", [15.0, 45.0], [275.0, 280.0]);
        write_target(&grid);

        let config = RegridConfig { output_dir: dir.path().join("out"), ..Default::default() };
        let params = ProjectionParams::new(vec![input], grid, "tas", "HIRHAM5", "RCP85");
        assert!(run(&config, &params).is_err());
    }

    #[test]
    fn test_no_inputs_is_config_error() {
        let params = ProjectionParams::new(Vec::new(), "grid.nc".into(), "tas", "HIRHAM5", "RCP85");
        assert!(matches!(run(&RegridConfig::default(), &params), Err(GridError::Config(_))));
    }
}
