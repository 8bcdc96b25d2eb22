use crate::types::{
    BoundingBox, CompanionData, CompanionVariable, GridError, GridResult, GriddedField, SpatialGrid,
};
use ndarray::{s, Array2, Axis};
use std::ops::Range;

/// Restricts gridded fields to a fixed bounding box
pub struct DomainSubsetter {
    bbox: BoundingBox,
}

impl DomainSubsetter {
    pub fn new(bbox: BoundingBox) -> Self {
        Self { bbox }
    }

    /// Subsetter for the EURO-CORDEX domain
    pub fn euro_cordex() -> Self {
        Self::new(BoundingBox::EURO_CORDEX)
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Contiguous index range of `coords` inside `[min, max]`.
    ///
    /// Works for ascending and descending axes. Returns `None` when no coordinate
    /// falls inside the interval.
    pub fn index_range(coords: &[f64], min: f64, max: f64) -> GridResult<Option<Range<usize>>> {
        let inside: Vec<usize> = coords
            .iter()
            .enumerate()
            .filter(|(_, c)| **c >= min && **c <= max)
            .map(|(i, _)| i)
            .collect();

        let (first, last) = match (inside.first(), inside.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(None),
        };

        // A monotonic axis always yields a gap-free run of indices
        if last - first + 1 != inside.len() {
            return Err(GridError::InvalidFormat(format!(
                "Coordinate axis is not monotonic inside [{}, {}]",
                min, max
            )));
        }

        Ok(Some(first..last + 1))
    }

    /// (lat range, lon range) of a regular grid inside the box
    pub fn regular_window(&self, lat: &[f64], lon: &[f64]) -> GridResult<(Range<usize>, Range<usize>)> {
        let lat_range = Self::index_range(lat, self.bbox.min_lat, self.bbox.max_lat)?
            .ok_or_else(|| GridError::EmptyDomain(format!("no latitude inside {:?}", self.bbox)))?;
        let lon_range = Self::index_range(lon, self.bbox.min_lon, self.bbox.max_lon)?
            .ok_or_else(|| GridError::EmptyDomain(format!("no longitude inside {:?}", self.bbox)))?;
        Ok((lat_range, lon_range))
    }

    /// Per-cell membership mask for a 2-D coordinate grid
    pub fn cell_mask(&self, lat: &Array2<f64>, lon: &Array2<f64>) -> Array2<bool> {
        let mut mask = Array2::from_elem(lat.dim(), false);
        ndarray::Zip::from(&mut mask)
            .and(lat)
            .and(lon)
            .for_each(|m, &la, &lo| *m = self.bbox.contains(lo, la));
        mask
    }

    /// Return a new field holding only the grid cells inside the box
    pub fn subset(&self, field: &GriddedField) -> GridResult<GriddedField> {
        let (nt, rows, cols) = field.shape();
        log::debug!("Subsetting {}x{}x{} field '{}' to {:?}", nt, rows, cols, field.name, self.bbox);

        let result = match &field.grid {
            SpatialGrid::Regular { lat, lon } => self.subset_regular(field, lat, lon)?,
            SpatialGrid::Curvilinear { lat, lon } => self.subset_curvilinear(field, lat, lon)?,
        };

        let (_, out_rows, out_cols) = result.shape();
        log::info!("Domain subset: {}x{} -> {}x{} cells", rows, cols, out_rows, out_cols);
        Ok(result)
    }

    fn subset_regular(&self, field: &GriddedField, lat: &[f64], lon: &[f64]) -> GridResult<GriddedField> {
        let (lat_range, lon_range) = self.regular_window(lat, lon)?;

        let mut out = field.clone();
        out.data = field
            .data
            .slice(s![.., lat_range.clone(), lon_range.clone()])
            .to_owned();
        out.grid = SpatialGrid::Regular {
            lat: lat[lat_range.clone()].to_vec(),
            lon: lon[lon_range.clone()].to_vec(),
        };
        out.companions = field
            .companions
            .iter()
            .map(|c| CompanionVariable {
                name: c.name.clone(),
                units: c.units.clone(),
                data: match &c.data {
                    CompanionData::Spatial(a) => {
                        CompanionData::Spatial(a.slice(s![lat_range.clone(), lon_range.clone()]).to_owned())
                    }
                    CompanionData::SpatioTemporal(a) => CompanionData::SpatioTemporal(
                        a.slice(s![.., lat_range.clone(), lon_range.clone()]).to_owned(),
                    ),
                },
            })
            .collect();

        out.validate()?;
        Ok(out)
    }

    /// Rows and columns without any in-box cell are dropped; out-of-box cells left
    /// inside the kept block become missing.
    fn subset_curvilinear(
        &self,
        field: &GriddedField,
        lat: &Array2<f64>,
        lon: &Array2<f64>,
    ) -> GridResult<GriddedField> {
        let mask = self.cell_mask(lat, lon);

        let keep_rows: Vec<usize> = mask
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|m| *m))
            .map(|(i, _)| i)
            .collect();
        let keep_cols: Vec<usize> = mask
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, col)| col.iter().any(|m| *m))
            .map(|(i, _)| i)
            .collect();

        if keep_rows.is_empty() || keep_cols.is_empty() {
            return Err(GridError::EmptyDomain(format!("no cell inside {:?}", self.bbox)));
        }

        let kept_mask = mask.select(Axis(0), &keep_rows).select(Axis(1), &keep_cols);
        let take2 = |a: &Array2<f64>| a.select(Axis(0), &keep_rows).select(Axis(1), &keep_cols);
        let take_raster = |a: &Array2<f32>| {
            let mut out = a.select(Axis(0), &keep_rows).select(Axis(1), &keep_cols);
            ndarray::Zip::from(&mut out).and(&kept_mask).for_each(|v, &m| {
                if !m {
                    *v = f32::NAN;
                }
            });
            out
        };
        let take_stack = |a: &ndarray::Array3<f32>| {
            let mut out = a.select(Axis(1), &keep_rows).select(Axis(2), &keep_cols);
            for mut slice in out.axis_iter_mut(Axis(0)) {
                ndarray::Zip::from(&mut slice).and(&kept_mask).for_each(|v, &m| {
                    if !m {
                        *v = f32::NAN;
                    }
                });
            }
            out
        };

        let mut out = field.clone();
        out.data = take_stack(&field.data);
        out.grid = SpatialGrid::Curvilinear { lat: take2(lat), lon: take2(lon) };
        out.companions = field
            .companions
            .iter()
            .map(|c| CompanionVariable {
                name: c.name.clone(),
                units: c.units.clone(),
                data: match &c.data {
                    CompanionData::Spatial(a) => CompanionData::Spatial(take_raster(a)),
                    CompanionData::SpatioTemporal(a) => CompanionData::SpatioTemporal(take_stack(a)),
                },
            })
            .collect();

        out.validate()?;
        Ok(out)
    }
}

impl Default for DomainSubsetter {
    fn default() -> Self {
        Self::euro_cordex()
    }
}
