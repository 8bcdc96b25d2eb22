//! Burned area from the C3S OLCI pixel product (300 m, monthly).
//!
//! The `LC` layer holds the land-cover class of burned pixels and 0 elsewhere.
//! Two presence masks are derived before the 3x3 "any" aggregation: all fires
//! and fires in forest classes.

use super::{output_name, ymd};
use crate::config::RegridConfig;
use crate::core::cell_area::AreaUnit;
use crate::core::coarsen::{BlockReducer, CoarsenParams};
use crate::io::loader::LoaderParams;
use crate::io::netcdf_store::VariableSpec;
use crate::io::sources::{Cadence, EraTable};
use crate::pipeline::{CellAreaSpec, CompositePipeline, CompositeSpec, RunSummary};
use crate::types::{CompanionVariable, GridResult, GriddedField, TimeResolution};
use chrono::NaiveDate;

pub const FIRES_DIR: &str = "C3S_Burned_Area";

pub const DATA_SOURCE: &str = "ECMWF C3S Pixel OLCI Burned Area product";

/// One sub-directory per year, files named from their `yyyymmdd` date
const FILE_PATTERN: &str = "*/{yyyy}{mm}*.nc";

#[derive(Debug, Clone)]
pub struct FiresParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub factor: usize,
}

impl Default for FiresParams {
    fn default() -> Self {
        Self {
            start: ymd(2017, 1, 1),
            end: ymd(2022, 12, 31),
            factor: 3,
        }
    }
}

/// Tree-cover classes of the land-cover legend (50-90 broadleaf/needleleaf/mixed,
/// 160/170 flooded tree cover)
pub fn is_forest_class(code: f32) -> bool {
    (50.0..=90.0).contains(&code) || code == 160.0 || code == 170.0
}

/// `fires` (any burned class) with a `forest_fires` companion, both 0/1
pub fn classify_burned(field: &GriddedField) -> GridResult<GriddedField> {
    let mut out = field.clone();
    out.name = "fires".to_string();
    out.units = "none".to_string();
    out.data = field.data.mapv(|v| if !v.is_nan() && v != 0.0 { 1.0 } else { 0.0 });
    let forest = field.data.mapv(|v| if !v.is_nan() && is_forest_class(v) { 1.0 } else { 0.0 });
    out.companions = vec![CompanionVariable::spatio_temporal("forest_fires", "none", forest)];
    out.validate()?;
    Ok(out)
}

pub fn composite_spec(config: &RegridConfig, params: &FiresParams) -> GridResult<CompositeSpec> {
    let loader = LoaderParams::new(
        &config.input_dir(FIRES_DIR),
        EraTable::single("C3S OLCI", FILE_PATTERN),
        VariableSpec::new("LC"),
    )
    .with_cadence(Cadence::Monthly);

    let output = output_name(config, "fires", TimeResolution::Monthly, "c3s", params.start, params.end);
    let mut spec = CompositeSpec::new("fires", loader, params.start, params.end, output);
    spec.classify = Some(classify_burned);
    spec.coarsen = Some(CoarsenParams::square(params.factor, BlockReducer::Any));
    spec.cell_area = Some(CellAreaSpec::new("cell_area_ha", AreaUnit::Hectares, true));
    spec.data_source = DATA_SOURCE.to_string();
    Ok(spec)
}

pub fn run(config: &RegridConfig, params: &FiresParams) -> GridResult<RunSummary> {
    let spec = composite_spec(config, params)?;
    CompositePipeline::new(config.clone()).run(&spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompanionData, SpatialGrid};
    use ndarray::Array3;

    fn land_cover() -> GriddedField {
        let grid = SpatialGrid::Regular {
            lat: (0..6).map(|i| 45.0 + i as f64 * 0.003).collect(),
            lon: (0..6).map(|i| 5.0 + i as f64 * 0.003).collect(),
        };
        let mut data = Array3::zeros((1, 6, 6));
        data[[0, 1, 1]] = 10.0; // cropland fire
        data[[0, 2, 4]] = 70.0; // needleleaf fire
        data[[0, 0, 5]] = f32::NAN;
        GriddedField::new("LC", "none", data, grid, vec![ymd(2018, 7, 1)], TimeResolution::Monthly).unwrap()
    }

    #[test]
    fn test_forest_classes() {
        assert!(is_forest_class(50.0));
        assert!(is_forest_class(90.0));
        assert!(is_forest_class(170.0));
        assert!(!is_forest_class(100.0));
        assert!(!is_forest_class(10.0));
    }

    #[test]
    fn test_masks_and_block_any() {
        let config = RegridConfig::default();
        let spec = composite_spec(&config, &FiresParams::default()).unwrap();
        let out = CompositePipeline::new(config).transform(land_cover(), &spec).unwrap();

        assert_eq!(out.shape(), (1, 2, 2));
        assert_eq!(out.name, "fires");
        assert_eq!(out.data[[0, 0, 0]], 1.0);
        assert_eq!(out.data[[0, 0, 1]], 1.0);
        assert_eq!(out.data[[0, 1, 0]], 0.0);

        match &out.companion("forest_fires").unwrap().data {
            CompanionData::SpatioTemporal(a) => {
                assert_eq!(a[[0, 0, 0]], 0.0);
                assert_eq!(a[[0, 0, 1]], 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        let area = out.companion("cell_area_ha").unwrap();
        assert_eq!(area.units, "ha");
        assert!(matches!(area.data, CompanionData::SpatioTemporal(_)));
    }
}
