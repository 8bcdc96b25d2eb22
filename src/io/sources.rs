use crate::types::{GridError, GridResult};
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Filename template for one product variant.
///
/// Placeholders `{yyyy}`, `{mm}` and `{dd}` are filled from the requested period,
/// `{date}` matches any `yyyymmdd` stamp, `*` and `?` behave like shell globs.
/// A `/` separates directory levels, each matched against the listing of its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    template: String,
}

impl FilePattern {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// One anchored regex per path component, placeholders filled for `period`
    pub fn component_regexes(&self, period: NaiveDate) -> GridResult<Vec<Regex>> {
        self.template
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|component| {
                let expr = Self::component_to_regex(component, period);
                Regex::new(&expr).map_err(|e| GridError::Config(format!("Bad file pattern '{}': {}", self.template, e)))
            })
            .collect()
    }

    fn component_to_regex(component: &str, period: NaiveDate) -> String {
        let filled = component
            .replace("{yyyy}", &format!("{:04}", period.year()))
            .replace("{mm}", &format!("{:02}", period.month()))
            .replace("{dd}", &format!("{:02}", period.day()));

        let mut expr = String::from("^");
        let mut rest = filled.as_str();
        while let Some(c) = rest.chars().next() {
            if rest.starts_with("{date}") {
                expr.push_str(r"\d{8}");
                rest = &rest["{date}".len()..];
                continue;
            }
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
            rest = &rest[c.len_utf8()..];
        }
        expr.push('$');
        expr
    }

    /// Files under `root` matching the pattern for `period`, sorted by path
    pub fn find(&self, root: &Path, period: NaiveDate) -> GridResult<Vec<PathBuf>> {
        let regexes = self.component_regexes(period)?;
        let mut current = vec![root.to_path_buf()];

        for (level, regex) in regexes.iter().enumerate() {
            let last = level + 1 == regexes.len();
            let mut next = Vec::new();
            for dir in &current {
                let entries = match std::fs::read_dir(dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        log::debug!("Cannot list {}: {}", dir.display(), e);
                        continue;
                    }
                };
                for entry in entries.flatten() {
                    let path = entry.path();
                    let name = entry.file_name();
                    let matches = name.to_str().map(|n| regex.is_match(n)).unwrap_or(false);
                    if matches && (path.is_dir() != last) {
                        next.push(path);
                    }
                }
            }
            current = next;
        }

        current.sort();
        Ok(current)
    }
}

/// Calendar range during which one product variant is authoritative
#[derive(Debug, Clone)]
pub struct Era {
    pub name: String,
    pub start: NaiveDate,
    /// Inclusive
    pub end: NaiveDate,
    pub pattern: FilePattern,
}

impl Era {
    pub fn new(name: &str, start: NaiveDate, end: NaiveDate, pattern: &str) -> Self {
        Self { name: name.to_string(), start, end, pattern: FilePattern::new(pattern) }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Ordered, non-overlapping table of eras, evaluated by a single lookup
#[derive(Debug, Clone)]
pub struct EraTable {
    eras: Vec<Era>,
}

impl EraTable {
    pub fn new(mut eras: Vec<Era>) -> GridResult<Self> {
        eras.sort_by_key(|e| e.start);
        for era in &eras {
            if era.end < era.start {
                return Err(GridError::Config(format!("Era '{}' ends before it starts", era.name)));
            }
        }
        for pair in eras.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(GridError::Config(format!(
                    "Eras '{}' and '{}' overlap",
                    pair[0].name, pair[1].name
                )));
            }
        }
        Ok(Self { eras })
    }

    /// Table with a single era spanning all time
    pub fn single(name: &str, pattern: &str) -> Self {
        Self { eras: vec![Era::new(name, NaiveDate::MIN, NaiveDate::MAX, pattern)] }
    }

    pub fn era_for(&self, date: NaiveDate) -> Option<&Era> {
        self.eras.iter().find(|e| e.covers(date))
    }

    pub fn eras(&self) -> &[Era] {
        &self.eras
    }
}

/// Sub-period cadence of a source product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    /// 10th, 20th and last day of each month
    Dekadal,
    Monthly,
    Annual,
}

impl Cadence {
    /// Sub-period dates expected inside the month starting at `month`
    pub fn expected_dates(&self, month: NaiveDate) -> Vec<NaiveDate> {
        let first = month_start(month);
        let last = month_end(first);
        match self {
            Cadence::Daily => first.iter_days().take_while(|d| *d <= last).collect(),
            Cadence::Dekadal => [first.with_day(10), first.with_day(20), Some(last)]
                .into_iter()
                .flatten()
                .collect(),
            Cadence::Monthly | Cadence::Annual => vec![first],
        }
    }
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let first = month_start(date);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next.map(|n| n - Duration::days(1)).unwrap_or(first)
}

/// Month starts from `start` to `end` inclusive
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = month_start(start);
    while current <= end {
        months.push(current);
        current = month_end(current) + Duration::days(1);
    }
    months
}

/// Date stamp embedded in a file name (`yyyymmdd`, optionally followed by `THHMMSS`
/// or more digits)
pub fn date_from_filename(name: &str) -> Option<NaiveDate> {
    filename_stamp()?
        .captures_iter(name)
        .filter_map(|c| c.get(1))
        .find_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
}

/// Compiled once, shared by every file of a scan
fn filename_stamp() -> Option<&'static Regex> {
    static STAMP: OnceLock<Option<Regex>> = OnceLock::new();
    STAMP.get_or_init(|| Regex::new(r"(?:^|[^0-9])(\d{8})").ok()).as_ref()
}

/// Expected dates with no matching file
pub fn missing_dates(found: &[NaiveDate], expected: &[NaiveDate]) -> Vec<NaiveDate> {
    expected.iter().filter(|d| !found.contains(d)).copied().collect()
}
