//! Dataset pipelines, one module per EFMI product.
//!
//! Each product has a `Params` struct with the defaults used for the published
//! files and a `run` entry point taking the shared [`RegridConfig`].

pub mod agb;
pub mod change_tcd;
pub mod disturbance;
pub mod fires;
pub mod lai;
pub mod lst;
pub mod projection;
pub mod soil_carbon;

use crate::config::RegridConfig;
use crate::core::metadata::OutputName;
use crate::types::TimeResolution;
use chrono::{Datelike, NaiveDate};

/// Calendar date from literal components
pub(crate) fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Output name covering the years of `[start, end]`
pub(crate) fn output_name(
    config: &RegridConfig,
    variable: &str,
    resolution: TimeResolution,
    source: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> OutputName {
    OutputName::new(variable, resolution, source)
        .years(start.year(), end.year())
        .version(config.version)
}
