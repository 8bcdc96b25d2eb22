//! efmi-regrid: regridding and EURO-CORDEX subsetting of Earth-observation datasets
//!
//! Turns global satellite products (leaf area index, burned area, biomass, land
//! surface temperature, soil carbon, tree cover density, disturbance events) and
//! regional climate projections into continental European Forest Management
//! Indicator layers with a common domain, resolution, unit and provenance record.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;
pub mod products;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CompanionData, CompanionVariable, CoordinateSystem, GeoTransform, GridError, GridResult,
    GriddedField, SpatialGrid, TimeResolution,
};

pub use config::RegridConfig;
pub use io::{NetCdfReader, NetCdfWriter, RedownloadQueue, SourceLoader};
pub use pipeline::{CompositePipeline, CompositeSpec, RunSummary};
