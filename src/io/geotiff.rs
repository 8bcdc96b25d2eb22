use crate::core::regrid::Regridder;
use crate::types::{BoundingBox, GeoTransform, GridError, GridResult, Raster};
use gdal::raster::Buffer;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{s, Array2};
use std::path::Path;

/// Single-band raster with its geotransform and EPSG code
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    /// Missing values are NaN
    pub data: Raster,
    pub transform: GeoTransform,
    pub epsg: u32,
}

impl RasterLayer {
    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// (min_x, min_y, max_x, max_y) of the pixel edges, north-up rasters only
    pub fn bounds(&self) -> [f64; 4] {
        let (rows, cols) = self.shape();
        let gt = &self.transform;
        let x0 = gt.top_left_x;
        let x1 = gt.top_left_x + cols as f64 * gt.pixel_width;
        let y0 = gt.top_left_y;
        let y1 = gt.top_left_y + rows as f64 * gt.pixel_height;
        [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
    }

    /// Resample in the layer's own CRS to pixels `factor` times larger
    pub fn resample(&self, factor: usize, regridder: &Regridder) -> GridResult<RasterLayer> {
        if factor == 0 {
            return Err(GridError::Config("Resampling factor must be at least 1".to_string()));
        }
        let (rows, cols) = self.shape();
        let target_shape = (rows / factor, cols / factor);
        if target_shape.0 == 0 || target_shape.1 == 0 {
            return Err(GridError::Processing(format!(
                "Resampling factor {} too large for {}x{} raster",
                factor, rows, cols
            )));
        }
        let target_transform = self.transform.scaled(factor as f64);
        let data = regridder.resample_transform(&self.data.view(), &self.transform, &target_transform, target_shape);
        log::info!(
            "Resampled {}x{} -> {}x{} ({:?})",
            rows,
            cols,
            target_shape.0,
            target_shape.1,
            regridder.method()
        );
        Ok(RasterLayer { data, transform: target_transform, epsg: self.epsg })
    }

    /// Crop to the pixels whose centres fall inside `bounds` (min_x, min_y, max_x, max_y)
    pub fn clip(&self, bounds: [f64; 4]) -> GridResult<RasterLayer> {
        let [min_x, min_y, max_x, max_y] = bounds;
        let (rows, cols) = self.shape();

        let col_idx: Vec<usize> = (0..cols)
            .filter(|c| {
                let (x, _) = self.transform.pixel_center(0, *c);
                x >= min_x && x <= max_x
            })
            .collect();
        let row_idx: Vec<usize> = (0..rows)
            .filter(|r| {
                let (_, y) = self.transform.pixel_center(*r, 0);
                y >= min_y && y <= max_y
            })
            .collect();

        let (r0, r1, c0, c1) = match (row_idx.first(), row_idx.last(), col_idx.first(), col_idx.last()) {
            (Some(r0), Some(r1), Some(c0), Some(c1)) => (*r0, *r1, *c0, *c1),
            _ => return Err(GridError::EmptyDomain(format!("raster does not overlap {:?}", bounds))),
        };

        let data = self.data.slice(s![r0..=r1, c0..=c1]).to_owned();
        let transform = GeoTransform {
            top_left_x: self.transform.top_left_x + c0 as f64 * self.transform.pixel_width,
            top_left_y: self.transform.top_left_y + r0 as f64 * self.transform.pixel_height,
            ..self.transform
        };
        log::debug!("Clipped raster to rows {}..={}, cols {}..={}", r0, r1, c0, c1);
        Ok(RasterLayer { data, transform, epsg: self.epsg })
    }

    /// Cell-wise `self - base`; missing where either is missing
    pub fn difference(&self, base: &RasterLayer) -> GridResult<RasterLayer> {
        if self.shape() != base.shape() || self.transform != base.transform || self.epsg != base.epsg {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?} at {:?}", base.shape(), base.transform),
                found: format!("{:?} at {:?}", self.shape(), self.transform),
            });
        }
        Ok(RasterLayer { data: &self.data - &base.data, transform: self.transform, epsg: self.epsg })
    }
}

/// GeoTIFF reader (first band)
pub struct GeoTiffReader;

impl GeoTiffReader {
    /// Read band 1 as f32, masking the band's nodata value and the given sentinels to NaN
    pub fn read(path: &Path, sentinels: &[f32]) -> GridResult<RasterLayer> {
        log::info!("Reading GeoTIFF: {}", path.display());
        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        let epsg = dataset
            .spatial_ref()
            .and_then(|srs| srs.auth_code())
            .map_err(|e| GridError::Metadata(format!("{} has no EPSG code: {}", path.display(), e)))?;

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value().map(|v| v as f32);
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let values: Vec<f32> = band_data
            .data
            .into_iter()
            .map(|v| if Some(v) == nodata || sentinels.contains(&v) { f32::NAN } else { v })
            .collect();
        let data = Array2::from_shape_vec((height, width), values)
            .map_err(|e| GridError::Processing(format!("Failed to reshape raster data: {}", e)))?;

        log::debug!("GeoTIFF size: {}x{}, EPSG:{}", width, height, epsg);
        Ok(RasterLayer { data, transform: GeoTransform::from_gdal(geo_transform), epsg: epsg as u32 })
    }
}

/// GeoTIFF writer
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    /// Write a single f32 band with NaN nodata and the given band tags
    pub fn write(layer: &RasterLayer, path: &Path, tags: &[(String, String)]) -> GridResult<()> {
        log::info!("Saving GeoTIFF: {}", path.display());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = layer.shape();
        let mut dataset = driver.create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)?;

        dataset.set_geo_transform(&layer.transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(layer.epsg)?)?;

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<f32> = layer.data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        rasterband.set_no_data_value(Some(f32::NAN as f64))?;

        for (key, value) in tags {
            rasterband.set_metadata_item(key, value, "")?;
        }
        Ok(())
    }

    /// Band tags of an existing GeoTIFF
    pub fn read_tags(path: &Path) -> GridResult<Vec<(String, String)>> {
        let dataset = Dataset::open(path)?;
        let rasterband = dataset.rasterband(1)?;
        Ok(rasterband
            .metadata()
            .filter(|entry| entry.domain.is_empty())
            .map(|entry| (entry.key, entry.value))
            .collect())
    }
}

/// Bounds of a geographic box in another CRS, from `densify` points along each edge
pub fn project_bbox(bbox: &BoundingBox, epsg: u32, densify: usize) -> GridResult<[f64; 4]> {
    let wgs84 = SpatialRef::from_epsg(4326)?;
    wgs84.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    let target = SpatialRef::from_epsg(epsg)?;
    target.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    let transform = CoordTransform::new(&wgs84, &target)?;

    let (mut xs, mut ys) = bbox_edge_points(bbox, densify);
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    let finite = |v: &&f64| v.is_finite();
    let min_x = xs.iter().filter(finite).cloned().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().filter(finite).cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().filter(finite).cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().filter(finite).cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
        return Err(GridError::Processing(format!("Could not project {:?} to EPSG:{}", bbox, epsg)));
    }
    log::debug!("Projected {:?} to EPSG:{} bounds [{}, {}, {}, {}]", bbox, epsg, min_x, min_y, max_x, max_y);
    Ok([min_x, min_y, max_x, max_y])
}

/// Points along the four edges of the box, `densify` intervals per edge
fn bbox_edge_points(bbox: &BoundingBox, densify: usize) -> (Vec<f64>, Vec<f64>) {
    let n = densify.max(1);
    let mut xs = Vec::with_capacity(4 * n);
    let mut ys = Vec::with_capacity(4 * n);
    for i in 0..n {
        let f = i as f64 / n as f64;
        let lon = bbox.min_lon + f * (bbox.max_lon - bbox.min_lon);
        let lat = bbox.min_lat + f * (bbox.max_lat - bbox.min_lat);
        xs.extend([lon, bbox.max_lon, bbox.max_lon - f * (bbox.max_lon - bbox.min_lon), bbox.min_lon]);
        ys.extend([bbox.min_lat, lat, bbox.max_lat, bbox.max_lat - f * (bbox.max_lat - bbox.min_lat)]);
    }
    (xs, ys)
}
