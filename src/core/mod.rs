//! Core regridding and subsetting modules

pub mod subset;
pub mod temporal;
pub mod coarsen;
pub mod regrid;
pub mod cell_area;
pub mod units;
pub mod metadata;

// Re-export main types
pub use subset::DomainSubsetter;
pub use temporal::{TemporalAggregator, TemporalGrouping};
pub use coarsen::{CoarsenProcessor, CoarsenParams, BlockReducer};
pub use regrid::{Regridder, TargetGrid, QuantityKind, Interpolation, RotatedPole};
pub use cell_area::{CellAreaCalculator, AreaUnit, spherical_cell_area};
pub use units::UnitConversion;
pub use metadata::{ProvenanceRecord, OutputName, DEFAULT_AUTHORS};
