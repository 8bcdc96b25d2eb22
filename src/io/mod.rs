//! Input/output modules for source products and EFMI outputs

pub mod archive;
pub mod download;
pub mod geotiff;
pub mod loader;
pub mod netcdf_store;
pub mod redownload;
pub mod sources;
pub mod vector;

// Re-export main types
pub use download::{DownloadParams, DownloadRequest, Downloader, HdaCredentials};
pub use geotiff::{GeoTiffReader, GeoTiffWriter, RasterLayer};
pub use loader::{LoadOutcome, LoaderParams, SourceLoader};
pub use netcdf_store::{NetCdfReader, NetCdfWriter, VariableSpec};
pub use redownload::RedownloadQueue;
pub use sources::{Cadence, Era, EraTable, FilePattern};
pub use vector::VectorFeature;
