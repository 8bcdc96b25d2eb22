//! Soil organic carbon from SMAP L4 Carbon daily files (9 km EASE-Grid 2.0, HDF5).

use super::{output_name, ymd};
use crate::config::RegridConfig;
use crate::core::cell_area::AreaUnit;
use crate::core::units::GRAMS_TO_TONNES_PER_M2;
use crate::io::loader::LoaderParams;
use crate::io::netcdf_store::VariableSpec;
use crate::io::sources::{Cadence, EraTable};
use crate::pipeline::{CellAreaSpec, CompositePipeline, CompositeSpec, RunSummary};
use crate::types::{GridResult, TimeResolution};
use chrono::NaiveDate;

pub const SOC_DIR: &str = "SMAP_Soil_Carbon";

pub const DATA_SOURCE: &str =
    "SMAP L4 Global Daily 9 km EASE-Grid Carbon Net Ecosystem Exchange, Version 7 product";

/// Fill value of the SMAP L4 science layers
pub const SMAP_FILL: f32 = -9999.0;

const FILE_PATTERN: &str = "SMAP_L4_C_mdl_{yyyy}{mm}*.h5";

#[derive(Debug, Clone)]
pub struct SoilCarbonParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for SoilCarbonParams {
    fn default() -> Self {
        // the first granule (31 March 2015) is left out
        Self { start: ymd(2015, 4, 1), end: ymd(2023, 12, 31) }
    }
}

pub fn variable_spec() -> VariableSpec {
    VariableSpec::new("SOC/soc_mean")
        .with_coords("GEO/latitude", "GEO/longitude")
        .without_time()
        .with_sentinels(&[SMAP_FILL])
        .with_units(GRAMS_TO_TONNES_PER_M2.from)
}

pub fn composite_spec(config: &RegridConfig, params: &SoilCarbonParams) -> CompositeSpec {
    let loader = LoaderParams::new(&config.input_dir(SOC_DIR), EraTable::single("V7", FILE_PATTERN), variable_spec())
        .with_cadence(Cadence::Daily);

    let output = output_name(config, "soilCarbon", TimeResolution::Monthly, "smap", params.start, params.end);
    let mut spec = CompositeSpec::new("soil_carbon", loader, params.start, params.end, output);
    spec.conversion = Some(GRAMS_TO_TONNES_PER_M2);
    spec.rename = Some("SOC".to_string());
    spec.cell_area = Some(CellAreaSpec::new("cell_area_m2", AreaUnit::SquareMetres, false));
    spec.data_source = DATA_SOURCE.to_string();
    spec
}

pub fn run(config: &RegridConfig, params: &SoilCarbonParams) -> GridResult<RunSummary> {
    let spec = composite_spec(config, params);
    CompositePipeline::new(config.clone()).run(&spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompanionData, GriddedField, SpatialGrid};
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_curvilinear_subset_conversion_and_area() {
        // 3x3 grid whose last column lies east of the domain
        let lat = Array2::from_shape_fn((3, 3), |(r, _)| 50.0 - r as f64 * 0.08);
        let lon = Array2::from_shape_fn((3, 3), |(_, c)| 65.0 + c as f64 * 0.2);
        let mut data = Array3::from_elem((1, 3, 3), 5000.0f32);
        data[[0, 0, 0]] = f32::NAN;
        let field = GriddedField::new(
            "soc_mean",
            "g C m-2",
            data,
            SpatialGrid::Curvilinear { lat, lon },
            vec![ymd(2016, 5, 1)],
            TimeResolution::Monthly,
        )
        .unwrap();

        let config = RegridConfig::default();
        let spec = composite_spec(&config, &SoilCarbonParams::default());
        let out = CompositePipeline::new(config).transform(field, &spec).unwrap();

        assert_eq!(out.shape(), (1, 3, 2));
        assert_eq!(out.name, "SOC");
        assert_eq!(out.units, "tons C m-2");
        assert!(out.data[[0, 0, 0]].is_nan());
        assert_relative_eq!(out.data[[0, 1, 1]], 0.005);

        let area = out.companion("cell_area_m2").unwrap();
        assert_eq!(area.units, "m2");
        match &area.data {
            CompanionData::Spatial(a) => assert_eq!(a.dim(), (3, 2)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(spec.output.file_name(), "rs_veg_europe_soilCarbon_none_mon_2015_2023_v1_smap.nc");
    }
}
