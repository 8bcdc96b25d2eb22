//! Composite regrid-and-subset pipeline shared by the gridded products:
//! load, subset, classify, coarsen, convert, derive areas, annotate, write.

use crate::config::RegridConfig;
use crate::core::cell_area::{AreaUnit, CellAreaCalculator};
use crate::core::coarsen::{CoarsenParams, CoarsenProcessor};
use crate::core::metadata::{OutputName, ProvenanceRecord};
use crate::core::subset::DomainSubsetter;
use crate::core::units::UnitConversion;
use crate::io::loader::{LoaderParams, SourceLoader};
use crate::io::netcdf_store::NetCdfWriter;
use crate::io::redownload::RedownloadQueue;
use crate::types::{GridResult, GriddedField};
use chrono::NaiveDate;
use std::path::PathBuf;

/// Per-cell derivation run on the subset field before block aggregation
pub type Classifier = fn(&GriddedField) -> GridResult<GriddedField>;

/// Cell-area companion to attach to the output
#[derive(Debug, Clone)]
pub struct CellAreaSpec {
    pub name: String,
    pub unit: AreaUnit,
    /// Broadcast along time (as `cell_area_ha` in the fires product)
    pub per_time_step: bool,
}

impl CellAreaSpec {
    pub fn new(name: &str, unit: AreaUnit, per_time_step: bool) -> Self {
        Self { name: name.to_string(), unit, per_time_step }
    }
}

/// Everything one gridded product needs
#[derive(Debug, Clone)]
pub struct CompositeSpec {
    /// Short product name, used in logs and the redownload list name
    pub product: String,
    pub loader: LoaderParams,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub classify: Option<Classifier>,
    pub coarsen: Option<CoarsenParams>,
    pub conversion: Option<UnitConversion>,
    /// New name of the primary variable after conversion
    pub rename: Option<String>,
    pub cell_area: Option<CellAreaSpec>,
    pub output: OutputName,
    pub data_source: String,
    pub notes: Vec<String>,
}

impl CompositeSpec {
    pub fn new(product: &str, loader: LoaderParams, start: NaiveDate, end: NaiveDate, output: OutputName) -> Self {
        Self {
            product: product.to_string(),
            loader,
            start,
            end,
            classify: None,
            coarsen: None,
            conversion: None,
            rename: None,
            cell_area: None,
            output,
            data_source: String::new(),
            notes: Vec::new(),
        }
    }
}

/// What a run produced
#[derive(Debug)]
pub struct RunSummary {
    pub outputs: Vec<PathBuf>,
    pub time_steps: usize,
    pub redownload: RedownloadQueue,
    pub missing_dates: Vec<NaiveDate>,
}

impl RunSummary {
    pub fn single(output: PathBuf, time_steps: usize) -> Self {
        Self { outputs: vec![output], time_steps, redownload: RedownloadQueue::new(), missing_dates: Vec::new() }
    }
}

pub struct CompositePipeline {
    config: RegridConfig,
}

impl CompositePipeline {
    pub fn new(config: RegridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegridConfig {
        &self.config
    }

    /// Load, transform, annotate and write one product
    pub fn run(&self, spec: &CompositeSpec) -> GridResult<RunSummary> {
        log::info!("Processing {} from {} to {}", spec.product, spec.start, spec.end);
        let loader = SourceLoader::new(spec.loader.clone().with_bbox(Some(self.config.bbox)));
        let outcome = loader.load(spec.start, spec.end)?;

        let mut field = self.transform(outcome.field, spec)?;
        let file_name = spec.output.file_name();
        self.annotate(&mut field, &file_name, &spec.data_source, &spec.notes);
        let path = self.write_netcdf(&field, &file_name)?;

        self.handle_redownload(&spec.product, &outcome.redownload)?;
        Ok(RunSummary {
            outputs: vec![path],
            time_steps: field.time_len(),
            redownload: outcome.redownload,
            missing_dates: outcome.missing_dates,
        })
    }

    /// Subset, classify, coarsen, convert and attach cell areas
    pub fn transform(&self, field: GriddedField, spec: &CompositeSpec) -> GridResult<GriddedField> {
        let mut field = DomainSubsetter::new(self.config.bbox).subset(&field)?;

        if let Some(classify) = spec.classify {
            field = classify(&field)?;
        }
        if let Some(params) = &spec.coarsen {
            field = CoarsenProcessor::new(params.clone()).apply(&field)?;
        }
        if let Some(conversion) = &spec.conversion {
            conversion.apply(&mut field)?;
        }
        if let Some(name) = &spec.rename {
            log::debug!("Renaming '{}' to '{}'", field.name, name);
            field.name = name.clone();
        }
        if let Some(area) = &spec.cell_area {
            CellAreaCalculator::new(area.unit)
                .with_radius(self.config.earth_radius_m)
                .attach(&mut field, &area.name, area.per_time_step)?;
        }
        Ok(field)
    }

    /// Replace inherited attributes with the product's provenance record
    pub fn annotate(&self, field: &mut GriddedField, file_name: &str, data_source: &str, notes: &[String]) -> ProvenanceRecord {
        let mut record = ProvenanceRecord::for_field(field, file_name, data_source);
        if let Some(extent) = field.grid.extent() {
            record = record.with_spatial_extent(&extent);
        }
        record.author_names = self.config.authors.clone();
        for note in notes {
            record = record.with_note(note.clone());
        }
        record.apply(field);
        record
    }

    /// Write under the configured output directory
    pub fn write_netcdf(&self, field: &GriddedField, file_name: &str) -> GridResult<PathBuf> {
        let path = self.config.output_dir.join(file_name);
        NetCdfWriter::write(field, &path)?;
        Ok(path)
    }

    /// Persist and optionally purge the files that failed to open
    pub fn handle_redownload(&self, product: &str, queue: &RedownloadQueue) -> GridResult<Option<PathBuf>> {
        if queue.is_empty() {
            return Ok(None);
        }
        log::warn!("Download these again ({} files):", queue.len());
        for path in queue.paths() {
            log::warn!("  {}", path.display());
        }
        let list = if self.config.write_redownload_list {
            std::fs::create_dir_all(&self.config.output_dir)?;
            let list = self.config.output_dir.join(format!("redownload_{}.txt", product));
            queue.persist(&list)?;
            Some(list)
        } else {
            None
        };
        if self.config.purge_corrupt {
            queue.purge();
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coarsen::BlockReducer;
    use crate::io::netcdf_store::VariableSpec;
    use crate::io::sources::EraTable;
    use crate::types::{SpatialGrid, TimeResolution};
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use std::path::Path;

    fn spec() -> CompositeSpec {
        let loader = LoaderParams::new(Path::new("."), EraTable::single("all", "*.nc"), VariableSpec::new("agb"));
        let d = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let mut spec = CompositeSpec::new("agb", loader, d, d, OutputName::new("agb", TimeResolution::Annual, "esacci"));
        spec.coarsen = Some(CoarsenParams::square(2, BlockReducer::Mean));
        spec.conversion = Some(crate::core::units::BIOMASS_TO_CARBON);
        spec.rename = Some("carbon_stock".to_string());
        spec.cell_area = Some(CellAreaSpec::new("cell_area_ha", AreaUnit::Hectares, false));
        spec
    }

    fn field() -> GriddedField {
        let grid = SpatialGrid::Regular {
            lat: vec![10.0, 50.0, 50.5, 51.0, 51.5],
            lon: vec![0.0, 0.5, 1.0, 1.5],
        };
        let data = Array3::from_elem((1, 5, 4), 100.0f32);
        let times = vec![NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()];
        GriddedField::new("agb", "Mg/ha", data, grid, times, TimeResolution::Annual).unwrap()
    }

    #[test]
    fn test_transform_chain() {
        let pipeline = CompositePipeline::new(RegridConfig::default());
        let out = pipeline.transform(field(), &spec()).unwrap();

        // lat 10 is outside the domain, the 4x4 rest coarsens to 2x2
        assert_eq!(out.shape(), (1, 2, 2));
        assert_eq!(out.name, "carbon_stock");
        assert_eq!(out.units, "tons_per_ha");
        assert_relative_eq!(out.data[[0, 0, 0]], 50.0);
        assert!(out.companion("cell_area_ha").is_some());
    }

    #[test]
    fn test_annotate_replaces_attributes() {
        let config = RegridConfig { authors: "A. Author".to_string(), ..Default::default() };
        let pipeline = CompositePipeline::new(config);
        let mut f = field();
        f.attributes.insert("history".to_string(), "inherited".to_string());

        let record = pipeline.annotate(&mut f, "out.nc", "ESA-CCI biomass map v5", &["note".to_string()]);
        assert_eq!(record.author_names, "A. Author");
        assert!(!f.attributes.contains_key("history"));
        assert_eq!(f.attributes.get("Data_source").map(String::as_str), Some("ESA-CCI biomass map v5"));
        assert_eq!(f.attributes.get("Notes").map(String::as_str), Some("note"));
        assert_eq!(
            f.attributes.get("Spatial_extent").map(String::as_str),
            Some("Europe (lon 0 to 1.5, lat 10 to 51.5)")
        );
    }

    #[test]
    fn test_redownload_list_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegridConfig { output_dir: dir.path().to_path_buf(), ..Default::default() };
        let pipeline = CompositePipeline::new(config);

        assert!(pipeline.handle_redownload("lai", &RedownloadQueue::new()).unwrap().is_none());

        let mut queue = RedownloadQueue::new();
        queue.push(Path::new("/data/c_gls_LAI300_201502100000.nc"), "open failed");
        let list = pipeline.handle_redownload("lai", &queue).unwrap().unwrap();
        assert_eq!(list, dir.path().join("redownload_lai.txt"));
        assert!(std::fs::read_to_string(list).unwrap().contains("201502100000"));
    }
}
