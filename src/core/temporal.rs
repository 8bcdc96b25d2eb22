use crate::types::{
    CompanionData, CompanionVariable, GridError, GridResult, GriddedField, Raster, RasterStack, TimeResolution,
};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Calendar period used to group finer samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalGrouping {
    Monthly,
    Annual,
}

impl TemporalGrouping {
    /// First day of the period containing `date`
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TemporalGrouping::Monthly => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            TemporalGrouping::Annual => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        }
        .unwrap_or(date)
    }

    pub fn resolution(&self) -> TimeResolution {
        match self {
            TemporalGrouping::Monthly => TimeResolution::Monthly,
            TemporalGrouping::Annual => TimeResolution::Annual,
        }
    }
}

/// Temporal aggregation of gridded fields by arithmetic mean over valid samples
pub struct TemporalAggregator {
    grouping: TemporalGrouping,
}

impl TemporalAggregator {
    pub fn new(grouping: TemporalGrouping) -> Self {
        Self { grouping }
    }

    pub fn monthly() -> Self {
        Self::new(TemporalGrouping::Monthly)
    }

    /// Per-cell mean over the samples that are not missing.
    ///
    /// A cell where every sample is missing stays missing (NaN), never zero.
    pub fn nanmean(samples: &[ArrayView2<f32>]) -> GridResult<Raster> {
        let first = samples
            .first()
            .ok_or_else(|| GridError::Processing("No samples to average".to_string()))?;
        let shape = first.dim();
        if let Some(bad) = samples.iter().find(|s| s.dim() != shape) {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?}", shape),
                found: format!("{:?}", bad.dim()),
            });
        }

        let mut sum = Array2::<f64>::zeros(shape);
        let mut count = Array2::<u32>::zeros(shape);
        for sample in samples {
            ndarray::Zip::from(&mut sum)
                .and(&mut count)
                .and(sample)
                .for_each(|s, n, &v| {
                    if !v.is_nan() {
                        *s += v as f64;
                        *n += 1;
                    }
                });
        }

        let mut mean = Array2::<f32>::from_elem(shape, f32::NAN);
        ndarray::Zip::from(&mut mean)
            .and(&sum)
            .and(&count)
            .for_each(|m, &s, &n| {
                if n > 0 {
                    *m = (s / n as f64) as f32;
                }
            });
        Ok(mean)
    }

    /// Mean of two aggregated means; missing where either input is missing
    pub fn pairwise_mean(a: &GriddedField, b: &GriddedField) -> GridResult<GriddedField> {
        if a.grid != b.grid || a.times != b.times {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?} over {} steps", a.grid.shape(), a.times.len()),
                found: format!("{:?} over {} steps", b.grid.shape(), b.times.len()),
            });
        }
        if a.units != b.units {
            return Err(GridError::UnitMismatch { expected: a.units.clone(), found: b.units.clone() });
        }

        let mut out = a.clone();
        ndarray::Zip::from(&mut out.data)
            .and(&b.data)
            .for_each(|x, &y| *x = (*x + y) / 2.0);
        Ok(out)
    }

    /// Group time steps into calendar periods. Periods appear in first-seen order
    /// of a time-sorted input; periods without samples are absent.
    pub fn periods(&self, times: &[NaiveDate]) -> Vec<(NaiveDate, Vec<usize>)> {
        let mut periods: Vec<(NaiveDate, Vec<usize>)> = Vec::new();
        for (i, date) in times.iter().enumerate() {
            let start = self.grouping.period_start(*date);
            match periods.iter_mut().find(|(p, _)| *p == start) {
                Some((_, idx)) => idx.push(i),
                None => periods.push((start, vec![i])),
            }
        }
        periods.sort_by_key(|(p, _)| *p);
        periods
    }

    /// Aggregate the time axis of a field into calendar periods
    pub fn aggregate(&self, field: &GriddedField) -> GridResult<GriddedField> {
        let periods = self.periods(&field.times);
        log::info!(
            "Temporal aggregation of '{}': {} samples -> {} {} periods",
            field.name,
            field.time_len(),
            periods.len(),
            self.grouping.resolution()
        );

        let mut out = field.clone();
        out.data = Self::aggregate_stack(&field.data, &periods)?;
        out.times = periods.iter().map(|(p, _)| *p).collect();
        out.resolution = self.grouping.resolution();
        out.companions = field
            .companions
            .iter()
            .map(|c| {
                let data = match &c.data {
                    CompanionData::Spatial(a) => CompanionData::Spatial(a.clone()),
                    CompanionData::SpatioTemporal(a) => {
                        CompanionData::SpatioTemporal(Self::aggregate_stack(a, &periods)?)
                    }
                };
                Ok(CompanionVariable { name: c.name.clone(), units: c.units.clone(), data })
            })
            .collect::<GridResult<Vec<_>>>()?;

        out.validate()?;
        Ok(out)
    }

    fn aggregate_stack(stack: &RasterStack, periods: &[(NaiveDate, Vec<usize>)]) -> GridResult<RasterStack> {
        let (_, ny, nx) = stack.dim();
        let mut out = Array3::<f32>::from_elem((periods.len(), ny, nx), f32::NAN);
        for (k, (_, indices)) in periods.iter().enumerate() {
            let samples: Vec<ArrayView2<f32>> = indices.iter().map(|i| stack.index_axis(Axis(0), *i)).collect();
            let mean = Self::nanmean(&samples)?;
            out.index_axis_mut(Axis(0), k).assign(&mean);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpatialGrid;
    use ndarray::array;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_nanmean_skips_missing() {
        let a = array![[1.0f32, f32::NAN], [3.0, f32::NAN]];
        let b = array![[3.0f32, 4.0], [f32::NAN, f32::NAN]];
        let mean = TemporalAggregator::nanmean(&[a.view(), b.view()]).unwrap();
        assert_eq!(mean[[0, 0]], 2.0);
        assert_eq!(mean[[0, 1]], 4.0);
        assert_eq!(mean[[1, 0]], 3.0);
        assert!(mean[[1, 1]].is_nan(), "all-missing cell must stay missing, not zero");
    }

    #[test]
    fn test_monthly_aggregation() {
        let times = vec![d(2015, 1, 10), d(2015, 1, 20), d(2015, 1, 31), d(2015, 2, 10)];
        let data = Array3::from_shape_fn((4, 1, 2), |(t, _, j)| if j == 1 { f32::NAN } else { t as f32 });
        let grid = SpatialGrid::Regular { lat: vec![50.0], lon: vec![0.0, 1.0] };
        let field = GriddedField::new("lai", "none", data, grid, times, TimeResolution::TenDaily).unwrap();

        let out = TemporalAggregator::monthly().aggregate(&field).unwrap();
        assert_eq!(out.times, vec![d(2015, 1, 1), d(2015, 2, 1)]);
        assert_eq!(out.resolution, TimeResolution::Monthly);
        assert_eq!(out.data[[0, 0, 0]], 1.0);
        assert_eq!(out.data[[1, 0, 0]], 3.0);
        assert!(out.data[[0, 0, 1]].is_nan());
        assert!(out.data[[1, 0, 1]].is_nan());
    }

    #[test]
    fn test_annual_grouping() {
        let agg = TemporalAggregator::new(TemporalGrouping::Annual);
        let periods = agg.periods(&[d(2016, 3, 1), d(2015, 6, 1), d(2016, 1, 1)]);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0], (d(2015, 1, 1), vec![1]));
        assert_eq!(periods[1], (d(2016, 1, 1), vec![0, 2]));
    }

    #[test]
    fn test_pairwise_mean_propagates_missing() {
        let grid = SpatialGrid::Regular { lat: vec![50.0], lon: vec![0.0, 1.0] };
        let times = vec![d(2001, 7, 1)];
        let day = GriddedField::new(
            "lst",
            "K",
            Array3::from_shape_vec((1, 1, 2), vec![300.0, 290.0]).unwrap(),
            grid.clone(),
            times.clone(),
            TimeResolution::Monthly,
        )
        .unwrap();
        let night = GriddedField::new(
            "lst",
            "K",
            Array3::from_shape_vec((1, 1, 2), vec![280.0, f32::NAN]).unwrap(),
            grid,
            times,
            TimeResolution::Monthly,
        )
        .unwrap();

        let mean = TemporalAggregator::pairwise_mean(&day, &night).unwrap();
        assert_eq!(mean.data[[0, 0, 0]], 290.0);
        assert!(mean.data[[0, 0, 1]].is_nan());
    }
}
