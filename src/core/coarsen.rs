use crate::types::{
    CompanionData, CompanionVariable, GridError, GridResult, GriddedField, Raster, RasterStack, SpatialGrid,
};
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Reduction applied to each block of fine cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReducer {
    /// Mean of the valid cells; missing when the whole block is missing
    Mean,
    /// 1.0 when any valid cell is non-zero, otherwise 0.0
    Any,
}

/// Block aggregation parameters
#[derive(Debug, Clone)]
pub struct CoarsenParams {
    /// Number of fine rows per coarse row
    pub row_factor: usize,
    /// Number of fine columns per coarse column
    pub col_factor: usize,
    pub reducer: BlockReducer,
}

impl Default for CoarsenParams {
    fn default() -> Self {
        Self {
            row_factor: 3,  // 333m -> 1km
            col_factor: 3,
            reducer: BlockReducer::Mean,
        }
    }
}

impl CoarsenParams {
    pub fn square(factor: usize, reducer: BlockReducer) -> Self {
        Self { row_factor: factor, col_factor: factor, reducer }
    }
}

/// Non-overlapping block aggregation of gridded fields.
///
/// Incomplete blocks at the trailing edges are trimmed, so an input of
/// shape (k·m + r, k·n + s) yields (m, n).
pub struct CoarsenProcessor {
    params: CoarsenParams,
}

impl CoarsenProcessor {
    pub fn new(params: CoarsenParams) -> Self {
        Self { params }
    }

    /// 3x3 mean, the 333m -> 1km step used by most products
    pub fn standard() -> Self {
        Self::new(CoarsenParams::default())
    }

    pub fn params(&self) -> &CoarsenParams {
        &self.params
    }

    /// Output (rows, cols) for an input of the given size
    pub fn output_dims(&self, rows: usize, cols: usize) -> GridResult<(usize, usize)> {
        if self.params.row_factor == 0 || self.params.col_factor == 0 {
            return Err(GridError::Config("Coarsening factor must be at least 1".to_string()));
        }
        let out_rows = rows / self.params.row_factor;
        let out_cols = cols / self.params.col_factor;
        if out_rows == 0 || out_cols == 0 {
            return Err(GridError::Processing(format!(
                "Coarsening factor {}x{} too large for {}x{} grid",
                self.params.row_factor, self.params.col_factor, rows, cols
            )));
        }
        Ok((out_rows, out_cols))
    }

    /// Aggregate one raster
    pub fn coarsen_raster(&self, data: &ArrayView2<f32>) -> GridResult<Raster> {
        let (rows, cols) = data.dim();
        let (out_rows, out_cols) = self.output_dims(rows, cols)?;
        let (rf, cf) = (self.params.row_factor, self.params.col_factor);

        let mut output = Array2::<f32>::zeros((out_rows, out_cols));
        for out_row in 0..out_rows {
            for out_col in 0..out_cols {
                let start_row = out_row * rf;
                let start_col = out_col * cf;

                let mut sum = 0.0f64;
                let mut count = 0usize;
                let mut any = false;
                for in_row in start_row..start_row + rf {
                    for in_col in start_col..start_col + cf {
                        let v = data[[in_row, in_col]];
                        if v.is_nan() {
                            continue;
                        }
                        sum += v as f64;
                        count += 1;
                        any |= v != 0.0;
                    }
                }

                output[[out_row, out_col]] = match self.params.reducer {
                    BlockReducer::Mean if count > 0 => (sum / count as f64) as f32,
                    BlockReducer::Mean => f32::NAN,
                    BlockReducer::Any => {
                        if any {
                            1.0
                        } else {
                            0.0
                        }
                    }
                };
            }
        }

        Ok(output)
    }

    /// Aggregate every time step of a stack
    pub fn coarsen_stack(&self, stack: &RasterStack) -> GridResult<RasterStack> {
        let (nt, rows, cols) = stack.dim();
        let (out_rows, out_cols) = self.output_dims(rows, cols)?;
        let mut out = Array3::<f32>::zeros((nt, out_rows, out_cols));
        for (t, slice) in stack.axis_iter(Axis(0)).enumerate() {
            out.index_axis_mut(Axis(0), t).assign(&self.coarsen_raster(&slice)?);
        }
        Ok(out)
    }

    /// Block means of a 1-D coordinate axis, trailing remainder trimmed
    pub fn coarsen_axis(coords: &[f64], factor: usize) -> Vec<f64> {
        coords
            .chunks_exact(factor.max(1))
            .map(|block| block.iter().sum::<f64>() / block.len() as f64)
            .collect()
    }

    fn coarsen_coords_2d(&self, coords: &Array2<f64>) -> GridResult<Array2<f64>> {
        let (rows, cols) = coords.dim();
        let (out_rows, out_cols) = self.output_dims(rows, cols)?;
        let (rf, cf) = (self.params.row_factor, self.params.col_factor);
        Ok(Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
            let block = coords.slice(ndarray::s![r * rf..(r + 1) * rf, c * cf..(c + 1) * cf]);
            block.sum() / (rf * cf) as f64
        }))
    }

    /// Coarsen a gridded field, its coordinates and every companion variable
    pub fn apply(&self, field: &GriddedField) -> GridResult<GriddedField> {
        let (nt, rows, cols) = field.shape();
        log::info!(
            "Coarsening '{}' by {}x{} ({:?}): {}x{}x{}",
            field.name,
            self.params.row_factor,
            self.params.col_factor,
            self.params.reducer,
            nt,
            rows,
            cols
        );

        let mut out = field.clone();
        out.data = self.coarsen_stack(&field.data)?;
        out.grid = match &field.grid {
            SpatialGrid::Regular { lat, lon } => SpatialGrid::Regular {
                lat: Self::coarsen_axis(lat, self.params.row_factor),
                lon: Self::coarsen_axis(lon, self.params.col_factor),
            },
            SpatialGrid::Curvilinear { lat, lon } => SpatialGrid::Curvilinear {
                lat: self.coarsen_coords_2d(lat)?,
                lon: self.coarsen_coords_2d(lon)?,
            },
        };
        out.companions = field
            .companions
            .iter()
            .map(|c| {
                let data = match &c.data {
                    CompanionData::Spatial(a) => CompanionData::Spatial(self.coarsen_raster(&a.view())?),
                    CompanionData::SpatioTemporal(a) => CompanionData::SpatioTemporal(self.coarsen_stack(a)?),
                };
                Ok(CompanionVariable { name: c.name.clone(), units: c.units.clone(), data })
            })
            .collect::<GridResult<Vec<_>>>()?;

        out.validate()?;
        let (_, out_rows, out_cols) = out.shape();
        log::info!("Coarsening complete: {}x{} -> {}x{}", rows, cols, out_rows, out_cols);
        Ok(out)
    }
}
