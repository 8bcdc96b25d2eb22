//! Forest carbon stock from the ESA-CCI above-ground biomass maps (100 m, annual).

use super::{output_name, ymd};
use crate::config::RegridConfig;
use crate::core::coarsen::{BlockReducer, CoarsenParams};
use crate::core::temporal::TemporalGrouping;
use crate::core::units::BIOMASS_TO_CARBON;
use crate::io::loader::LoaderParams;
use crate::io::netcdf_store::VariableSpec;
use crate::io::sources::{Cadence, EraTable};
use crate::pipeline::{CompositePipeline, CompositeSpec, RunSummary};
use crate::types::{GridResult, TimeResolution};
use chrono::NaiveDate;

pub const AGB_DIR: &str = "ESACCI_AGB";

pub const DATA_SOURCE: &str = "ESA-CCI biomass map v5";

const FILE_PATTERN: &str = "ESACCI-BIOMASS-L4-AGB-MERGED-100m-{yyyy}-fv*.nc";

#[derive(Debug, Clone)]
pub struct AgbParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// 100 m cells per output cell along each axis
    pub factor: usize,
}

impl Default for AgbParams {
    fn default() -> Self {
        Self {
            start: ymd(2010, 1, 1),
            end: ymd(2021, 12, 31),
            factor: 10,
        }
    }
}

pub fn composite_spec(config: &RegridConfig, params: &AgbParams) -> GridResult<CompositeSpec> {
    let loader = LoaderParams::new(
        &config.input_dir(AGB_DIR),
        EraTable::single("v5", FILE_PATTERN),
        VariableSpec::new("agb").with_units(BIOMASS_TO_CARBON.from),
    )
    .with_cadence(Cadence::Annual)
    .with_grouping(TemporalGrouping::Annual);

    let output = output_name(config, "agb", TimeResolution::Annual, "esacci", params.start, params.end);
    let mut spec = CompositeSpec::new("agb", loader, params.start, params.end, output);
    spec.coarsen = Some(CoarsenParams::square(params.factor, BlockReducer::Mean));
    spec.conversion = Some(BIOMASS_TO_CARBON);
    spec.rename = Some("carbon_stock".to_string());
    spec.data_source = DATA_SOURCE.to_string();
    spec.notes.push("Carbon stock is half of the above-ground biomass".to_string());
    Ok(spec)
}

pub fn run(config: &RegridConfig, params: &AgbParams) -> GridResult<RunSummary> {
    let spec = composite_spec(config, params)?;
    CompositePipeline::new(config.clone()).run(&spec)
}
