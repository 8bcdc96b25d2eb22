//! Era-aware loading of a source product into one gridded field.
//!
//! For every output period the era table picks the file pattern, the matching
//! files are read (domain hyperslab only) and averaged into one time step.
//! Files that fail to open are queued for redownload and skipped.

use crate::core::temporal::{TemporalAggregator, TemporalGrouping};
use crate::io::netcdf_store::{NetCdfReader, VariableSpec};
use crate::io::redownload::RedownloadQueue;
use crate::io::sources::{date_from_filename, missing_dates, months_between, Cadence, EraTable, FilePattern};
use crate::types::{BoundingBox, GridError, GridResult, GriddedField};
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

/// Where and how to load one source product
#[derive(Debug, Clone)]
pub struct LoaderParams {
    pub root: PathBuf,
    pub eras: EraTable,
    pub variable: VariableSpec,
    /// Cadence of the source files, used to report missing sub-periods
    pub cadence: Cadence,
    pub grouping: TemporalGrouping,
    pub bbox: Option<BoundingBox>,
}

impl LoaderParams {
    pub fn new(root: &Path, eras: EraTable, variable: VariableSpec) -> Self {
        Self {
            root: root.to_path_buf(),
            eras,
            variable,
            cadence: Cadence::Monthly,
            grouping: TemporalGrouping::Monthly,
            bbox: Some(BoundingBox::EURO_CORDEX),
        }
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_grouping(mut self, grouping: TemporalGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_bbox(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bbox = bbox;
        self
    }
}

/// Result of a load: the field and everything that went missing on the way
#[derive(Debug)]
pub struct LoadOutcome {
    pub field: GriddedField,
    pub redownload: RedownloadQueue,
    /// Expected sub-period dates with no readable file
    pub missing_dates: Vec<NaiveDate>,
    /// Output periods with no readable file at all
    pub empty_periods: Vec<NaiveDate>,
}

pub struct SourceLoader {
    params: LoaderParams,
    reader: NetCdfReader,
}

impl SourceLoader {
    pub fn new(params: LoaderParams) -> Self {
        let mut reader = NetCdfReader::new();
        if let Some(bbox) = params.bbox {
            reader = reader.with_bbox(bbox);
        }
        Self { params, reader }
    }

    pub fn params(&self) -> &LoaderParams {
        &self.params
    }

    /// Start dates of the output periods overlapping `[start, end]`
    pub fn period_starts(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        match self.params.grouping {
            TemporalGrouping::Monthly => months_between(start, end),
            TemporalGrouping::Annual => (start.year()..=end.year())
                .filter_map(|y| NaiveDate::from_ymd_opt(y, 1, 1))
                .collect(),
        }
    }

    /// Load every period from `start` to `end` inclusive.
    ///
    /// Periods without a readable file are absent from the result; it is an error
    /// only when no period has data.
    pub fn load(&self, start: NaiveDate, end: NaiveDate) -> GridResult<LoadOutcome> {
        log::info!(
            "Loading '{}' from {} for {} to {}",
            self.params.variable.name,
            self.params.root.display(),
            start,
            end
        );
        let mut queue = RedownloadQueue::new();
        let mut missing = Vec::new();
        let mut empty_periods = Vec::new();
        let mut parts = Vec::new();

        for period in self.period_starts(start, end) {
            match self.load_period(period, &mut queue, &mut missing)? {
                Some(field) => parts.push(field),
                None => empty_periods.push(period),
            }
        }

        if !missing.is_empty() {
            log::warn!("{} expected dates have no file:", missing.len());
            for date in &missing {
                log::warn!("  {}", date);
            }
        }
        if !empty_periods.is_empty() {
            log::warn!("{} periods without data are left out", empty_periods.len());
        }

        if parts.is_empty() {
            return Err(GridError::Processing(format!(
                "No readable '{}' files under {} for {} to {}",
                self.params.variable.name,
                self.params.root.display(),
                start,
                end
            )));
        }
        let field = GriddedField::concat_time(parts)?;
        log::info!("Loaded '{}' with shape {:?}", field.name, field.shape());
        Ok(LoadOutcome { field, redownload: queue, missing_dates: missing, empty_periods })
    }

    /// Mean of every readable file of one period, or `None` when there is none
    fn load_period(
        &self,
        period: NaiveDate,
        queue: &mut RedownloadQueue,
        missing: &mut Vec<NaiveDate>,
    ) -> GridResult<Option<GriddedField>> {
        let era = match self.params.eras.era_for(period) {
            Some(era) => era,
            None => {
                log::warn!("No product era covers {}, skipping", period);
                return Ok(None);
            }
        };

        let files = self.period_files(period, &era.pattern)?;
        log::debug!("{}: {} files from era '{}'", period, files.len(), era.name);

        let mut found_dates = Vec::new();
        let mut samples = Vec::new();
        for file in files {
            let hint = file.file_name().and_then(|n| n.to_str()).and_then(date_from_filename);
            match self.reader.read_field(&file, &self.params.variable, hint.or(Some(period))) {
                Ok(mut field) => {
                    // samples are dated by their period start
                    for t in field.times.iter_mut() {
                        *t = self.params.grouping.period_start(*t);
                    }
                    if field.times.iter().any(|t| *t != period) {
                        log::warn!("{} holds data outside {}, skipping", file.display(), period);
                        continue;
                    }
                    found_dates.extend(hint);
                    samples.push(field);
                }
                Err(e) if e.is_read_failure() => queue.push(&file, e.to_string()),
                Err(e) => return Err(e),
            }
        }

        if matches!(self.params.cadence, Cadence::Daily | Cadence::Dekadal) {
            for month in self.months_in(period) {
                missing.extend(missing_dates(&found_dates, &self.params.cadence.expected_dates(month)));
            }
        }

        if samples.is_empty() {
            log::warn!("No readable files for {}", period);
            return Ok(None);
        }

        let mut period_field = GriddedField::concat_time(samples)?;
        period_field.resolution = self.params.grouping.resolution();
        let aggregated = TemporalAggregator::new(self.params.grouping).aggregate(&period_field)?;
        Ok(Some(aggregated))
    }

    /// Files for every month of a period, deduplicated
    fn period_files(&self, period: NaiveDate, pattern: &FilePattern) -> GridResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for month in self.months_in(period) {
            for file in pattern.find(&self.params.root, month)? {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn months_in(&self, period: NaiveDate) -> Vec<NaiveDate> {
        match self.params.grouping {
            TemporalGrouping::Monthly => vec![period],
            TemporalGrouping::Annual => {
                let end = NaiveDate::from_ymd_opt(period.year(), 12, 1).unwrap_or(period);
                months_between(period, end)
            }
        }
    }
}
