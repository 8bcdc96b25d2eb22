//! Leaf Area Index from the CLMS 300 m 10-daily composites.
//!
//! Three product lines cover the record: RT5 PROBA-V, RT0 PROBA-V and RT0 OLCI.
//! Dekads are averaged per month, subset and coarsened 3x3 to about 1 km.

use super::{output_name, ymd};
use crate::config::RegridConfig;
use crate::core::coarsen::{BlockReducer, CoarsenParams};
use crate::io::loader::LoaderParams;
use crate::io::netcdf_store::VariableSpec;
use crate::io::sources::{Cadence, Era, EraTable};
use crate::pipeline::{CompositePipeline, CompositeSpec, RunSummary};
use crate::types::{GridResult, TimeResolution};
use chrono::NaiveDate;

/// Sub-directory of the input root holding the downloaded composites
pub const LAI_DIR: &str = "CopernicusLand/LAI";

pub const DATA_SOURCE: &str = "Copernicus Global Land Service Leaf Area Index dataset";

#[derive(Debug, Clone)]
pub struct LaiParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// 333 m cells per output cell along each axis
    pub factor: usize,
}

impl Default for LaiParams {
    fn default() -> Self {
        Self {
            start: ymd(2014, 1, 1),
            end: ymd(2023, 12, 31),
            factor: 3,
        }
    }
}

/// RT5 PROBA-V until August 2016, RT0 PROBA-V until October 2020, RT0 OLCI after
pub fn lai_eras() -> GridResult<EraTable> {
    EraTable::new(vec![
        Era::new("RT5 PROBA-V", ymd(2014, 1, 1), ymd(2016, 8, 31), "c_gls_LAI300_{yyyy}{mm}*.nc"),
        Era::new("RT0 PROBA-V", ymd(2016, 9, 1), ymd(2020, 10, 31), "c_gls_LAI300-RT0_{yyyy}{mm}*_PROBAV_*.nc"),
        Era::new("RT0 OLCI", ymd(2020, 11, 1), ymd(2023, 12, 31), "c_gls_LAI300-RT0_{yyyy}{mm}*_OLCI_*.nc"),
    ])
}

pub fn composite_spec(config: &RegridConfig, params: &LaiParams) -> GridResult<CompositeSpec> {
    let loader = LoaderParams::new(
        &config.input_dir(LAI_DIR),
        lai_eras()?,
        VariableSpec::new("LAI").with_units("none"),
    )
    .with_cadence(Cadence::Dekadal);

    let output = output_name(config, "lai", TimeResolution::Monthly, "clms", params.start, params.end);
    let mut spec = CompositeSpec::new("lai", loader, params.start, params.end, output);
    spec.coarsen = Some(CoarsenParams::square(params.factor, BlockReducer::Mean));
    spec.rename = Some("lai".to_string());
    spec.data_source = DATA_SOURCE.to_string();
    Ok(spec)
}

pub fn run(config: &RegridConfig, params: &LaiParams) -> GridResult<RunSummary> {
    let spec = composite_spec(config, params)?;
    CompositePipeline::new(config.clone()).run(&spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::netcdf_store::{NetCdfReader, NetCdfWriter};
    use crate::types::{GriddedField, SpatialGrid};
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn write_dekad(dir: &std::path::Path, date: NaiveDate, value: f32) {
        let grid = SpatialGrid::Regular {
            lat: (0..6).map(|i| 50.0 + i as f64 * 0.003).collect(),
            lon: (0..6).map(|i| 10.0 + i as f64 * 0.003).collect(),
        };
        let field = GriddedField::new(
            "LAI",
            "none",
            Array3::from_elem((1, 6, 6), value),
            grid,
            vec![date],
            TimeResolution::TenDaily,
        )
        .unwrap();
        let name = format!("c_gls_LAI300_{}0000_GLOBE_PROBAV_V1.0.1.nc", date.format("%Y%m%d"));
        NetCdfWriter::write(&field, &dir.join(name)).unwrap();
    }

    #[test]
    fn test_eras_cover_record_without_gaps() {
        let eras = lai_eras().unwrap();
        assert_eq!(eras.era_for(ymd(2016, 8, 31)).unwrap().name, "RT5 PROBA-V");
        assert_eq!(eras.era_for(ymd(2016, 9, 1)).unwrap().name, "RT0 PROBA-V");
        assert_eq!(eras.era_for(ymd(2020, 11, 10)).unwrap().name, "RT0 OLCI");
        assert!(eras.era_for(ymd(2024, 1, 10)).is_none());
    }

    #[test]
    fn test_monthly_mean_of_dekads() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join(LAI_DIR);
        std::fs::create_dir_all(&input).unwrap();
        write_dekad(&input, ymd(2015, 1, 10), 1.0);
        write_dekad(&input, ymd(2015, 1, 20), 2.0);
        write_dekad(&input, ymd(2015, 1, 31), 3.0);
        write_dekad(&input, ymd(2015, 2, 10), 4.0);

        let config = RegridConfig {
            input_root: root.path().to_path_buf(),
            output_dir: root.path().join("out"),
            ..Default::default()
        };
        let params = LaiParams { start: ymd(2015, 1, 1), end: ymd(2015, 2, 28), ..Default::default() };
        let summary = run(&config, &params).unwrap();

        assert_eq!(summary.time_steps, 2);
        // February has one of three dekads
        assert_eq!(summary.missing_dates, vec![ymd(2015, 2, 20), ymd(2015, 2, 28)]);

        let output = &summary.outputs[0];
        assert!(output.ends_with("rs_veg_europe_lai_none_mon_2015_v1_clms.nc"));
        let back = NetCdfReader::new().read_field(output, &VariableSpec::new("lai"), None).unwrap();
        assert_eq!(back.shape(), (2, 2, 2));
        assert_relative_eq!(back.data[[0, 0, 0]], 2.0);
        assert_relative_eq!(back.data[[1, 1, 1]], 4.0);
        assert_eq!(back.times, vec![ymd(2015, 1, 1), ymd(2015, 2, 1)]);
        assert_eq!(back.attributes.get("Data_source").map(String::as_str), Some(DATA_SOURCE));
    }
}
