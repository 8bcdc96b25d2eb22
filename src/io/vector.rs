use crate::types::{BoundingBox, GridError, GridResult};
use chrono::NaiveDate;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::{FieldValue, Geometry, LayerAccess, OGRFieldType, OGRwkbGeometryType};
use gdal::LayerOptions;
use gdal::{Dataset, DriverManager};
use std::path::Path;

/// Equal-area CRS used for polygon areas (EASE-Grid 2.0 global)
pub const EQUAL_AREA_EPSG: u32 = 6933;

/// Name of the area attribute on output features
pub const AREA_FIELD: &str = "area_ha";

/// One clipped disturbance polygon
#[derive(Clone)]
pub struct VectorFeature {
    pub geometry: Geometry,
    pub date: Option<NaiveDate>,
    pub area_ha: f64,
}

/// Parse an event date written as `yyyy/mm/dd` or `yyyy-mm-dd`, optionally with a
/// trailing time. The separator decides which format is tried.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(|c| c == ' ' || c == 'T').next().unwrap_or(raw);
    if date_part.contains('/') {
        NaiveDate::parse_from_str(date_part, "%Y/%m/%d")
            .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
            .ok()
    } else if date_part.contains('-') {
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    } else {
        None
    }
}

fn spatial_ref(epsg: u32) -> GridResult<SpatialRef> {
    let srs = SpatialRef::from_epsg(epsg)?;
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

fn bbox_polygon(bbox: &BoundingBox) -> GridResult<Geometry> {
    let wkt = format!(
        "POLYGON (({w} {s}, {e} {s}, {e} {n}, {w} {n}, {w} {s}))",
        w = bbox.min_lon,
        s = bbox.min_lat,
        e = bbox.max_lon,
        n = bbox.max_lat
    );
    Ok(Geometry::from_wkt(&wkt)?)
}

/// Polygonal parts of a clip result as one MultiPolygon, `None` when nothing areal is left
fn areal_part(geometry: &Geometry) -> GridResult<Option<Geometry>> {
    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons);
    if polygons.is_empty() {
        return Ok(None);
    }
    let mut multi = Geometry::empty(OGRwkbGeometryType::wkbMultiPolygon)?;
    for polygon in polygons {
        multi.add_geometry(polygon)?;
    }
    Ok(Some(multi))
}

fn collect_polygons(geometry: &Geometry, out: &mut Vec<Geometry>) {
    match geometry.geometry_name().as_str() {
        "POLYGON" => {
            if !geometry.is_empty() && geometry.area() > 0.0 {
                out.push(geometry.clone());
            }
        }
        "MULTIPOLYGON" | "GEOMETRYCOLLECTION" => {
            for i in 0..geometry.geometry_count() {
                collect_polygons(&geometry.get_geometry(i), out);
            }
        }
        _ => {}
    }
}

/// Read the first layer of a vector file, keep the parts of each feature inside
/// `bbox` and parse `date_field`. Geometries are returned in EPSG:4326.
pub fn read_clipped(path: &Path, bbox: &BoundingBox, date_field: &str) -> GridResult<Vec<VectorFeature>> {
    log::info!("Reading vector features: {}", path.display());
    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;

    let wgs84 = spatial_ref(4326)?;
    let to_wgs84 = match layer.spatial_ref() {
        Some(src) => {
            src.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
            match src.auth_code() {
                Ok(4326) => None,
                _ => Some(CoordTransform::new(&src, &wgs84)?),
            }
        }
        None => {
            log::warn!("{} has no CRS, assuming EPSG:4326", path.display());
            None
        }
    };

    let clip = bbox_polygon(bbox)?;
    let mut features = Vec::new();
    let mut unparsed_dates = 0usize;
    let mut total = 0usize;

    for feature in layer.features() {
        total += 1;
        let geometry = match feature.geometry() {
            Some(g) => match &to_wgs84 {
                Some(t) => g.transform(t)?,
                None => g.clone(),
            },
            None => continue,
        };
        // edge contacts come back as lines or points, the layer only takes polygons
        let clipped = match geometry.intersection(&clip) {
            Some(g) if !g.is_empty() => match areal_part(&g)? {
                Some(areal) => areal,
                None => {
                    log::debug!("Dropping non-areal clip result {}", g.geometry_name());
                    continue;
                }
            },
            _ => continue,
        };

        let raw_date = feature.field_as_string_by_name(date_field)?;
        let date = raw_date.as_deref().and_then(parse_event_date);
        if date.is_none() {
            unparsed_dates += 1;
        }
        features.push(VectorFeature { geometry: clipped, date, area_ha: 0.0 });
    }

    if unparsed_dates > 0 {
        log::warn!("{} features with an unreadable '{}' value", unparsed_dates, date_field);
    }
    log::info!("Kept {} of {} features inside the domain", features.len(), total);
    Ok(features)
}

/// Fill `area_ha` from the polygon area in an equal-area CRS
pub fn compute_areas(features: &mut [VectorFeature], equal_area_epsg: u32) -> GridResult<()> {
    let transform = CoordTransform::new(&spatial_ref(4326)?, &spatial_ref(equal_area_epsg)?)?;
    for feature in features.iter_mut() {
        let projected = feature.geometry.transform(&transform)?;
        feature.area_ha = projected.area() / 10_000.0;
    }
    Ok(())
}

/// Write features as an ESRI Shapefile in EPSG:4326 with `date` and `area_ha` fields
pub fn write_shapefile(features: &[VectorFeature], path: &Path) -> GridResult<()> {
    log::info!("Saving shapefile: {}", path.display());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let layer_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GridError::Config(format!("Bad output name {}", path.display())))?;

    let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
    let mut dataset = driver.create_vector_only(path)?;
    let srs = spatial_ref(4326)?;
    let mut layer = dataset.create_layer(LayerOptions {
        name: layer_name,
        srs: Some(&srs),
        ty: OGRwkbGeometryType::wkbMultiPolygon,
        options: None,
    })?;
    layer.create_defn_fields(&[("date", OGRFieldType::OFTString), (AREA_FIELD, OGRFieldType::OFTReal)])?;

    for feature in features {
        let date = feature.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        layer.create_feature_fields(
            feature.geometry.clone(),
            &["date", AREA_FIELD],
            &[FieldValue::StringValue(date), FieldValue::RealValue(feature.area_ha)],
        )?;
    }
    log::debug!("Wrote {} features", features.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_forms() {
        let expected = NaiveDate::from_ymd_opt(2009, 1, 24);
        assert_eq!(parse_event_date("2009/01/24"), expected);
        assert_eq!(parse_event_date("2009-01-24"), expected);
        assert_eq!(parse_event_date("24/01/2009"), expected);
        assert_eq!(parse_event_date("2009-01-24T00:00:00"), expected);
        assert_eq!(parse_event_date("unknown"), None);
    }

    fn write_input(path: &Path) {
        let driver = DriverManager::get_driver_by_name("ESRI Shapefile").unwrap();
        let mut dataset = driver.create_vector_only(path).unwrap();
        let srs = spatial_ref(4326).unwrap();
        let mut layer = dataset
            .create_layer(LayerOptions {
                name: "storms",
                srs: Some(&srs),
                ty: OGRwkbGeometryType::wkbPolygon,
                options: None,
            })
            .unwrap();
        layer.create_defn_fields(&[("EventDate", OGRFieldType::OFTString)]).unwrap();
        let inside = Geometry::from_wkt("POLYGON ((10 50, 10.1 50, 10.1 50.1, 10 50.1, 10 50))").unwrap();
        let straddling = Geometry::from_wkt("POLYGON ((65 60, 66 60, 66 61, 65 61, 65 60))").unwrap();
        let outside = Geometry::from_wkt("POLYGON ((100 10, 101 10, 101 11, 100 11, 100 10))").unwrap();
        for (geom, date) in [(inside, "2009/01/24"), (straddling, "2005-01-08"), (outside, "2010-02-28")] {
            layer
                .create_feature_fields(geom, &["EventDate"], &[FieldValue::StringValue(date.to_string())])
                .unwrap();
        }
    }

    #[test]
    fn test_clip_area_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("FORWIND_v2.shp");
        write_input(&input);

        let mut features = read_clipped(&input, &BoundingBox::EURO_CORDEX, "EventDate").unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].date, NaiveDate::from_ymd_opt(2009, 1, 24));
        assert_eq!(features[1].date, NaiveDate::from_ymd_opt(2005, 1, 8));

        compute_areas(&mut features, EQUAL_AREA_EPSG).unwrap();
        // 0.1 x 0.1 degree at 50N is roughly 79.6 km2
        assert!(features[0].area_ha > 7000.0 && features[0].area_ha < 9000.0);
        // only the western quarter of the straddling polygon is inside
        let full_cell_ha = 111.32 * 111.32 * 60f64.to_radians().cos() * 100.0;
        assert!(features[1].area_ha < 0.35 * full_cell_ha);

        let output = dir.path().join("out/disturbance.shp");
        write_shapefile(&features, &output).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_areal_part_keeps_only_polygons() {
        let mixed = Geometry::from_wkt(
            "GEOMETRYCOLLECTION (POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0)), LINESTRING (1 0, 2 0), POINT (3 3))",
        )
        .unwrap();
        let areal = areal_part(&mixed).unwrap().unwrap();
        assert_eq!(areal.geometry_name(), "MULTIPOLYGON");
        assert_eq!(areal.geometry_count(), 1);
        assert!((areal.area() - 1.0).abs() < 1e-12);

        let line = Geometry::from_wkt("LINESTRING (65.25 60, 65.25 61)").unwrap();
        assert!(areal_part(&line).unwrap().is_none());

        let polygon = Geometry::from_wkt("POLYGON ((0 0, 2 0, 2 1, 0 1, 0 0))").unwrap();
        assert_eq!(areal_part(&polygon).unwrap().unwrap().geometry_name(), "MULTIPOLYGON");
    }

    #[test]
    fn test_edge_contacts_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("edges.shp");
        {
            let driver = DriverManager::get_driver_by_name("ESRI Shapefile").unwrap();
            let mut dataset = driver.create_vector_only(&input).unwrap();
            let srs = spatial_ref(4326).unwrap();
            let mut layer = dataset
                .create_layer(LayerOptions {
                    name: "edges",
                    srs: Some(&srs),
                    ty: OGRwkbGeometryType::wkbPolygon,
                    options: None,
                })
                .unwrap();
            layer.create_defn_fields(&[("EventDate", OGRFieldType::OFTString)]).unwrap();
            // east edge of the domain is lon 65.25, north-east corner is (65.25, 72.75)
            let shared_edge = Geometry::from_wkt("POLYGON ((65.25 60, 66 60, 66 61, 65.25 61, 65.25 60))").unwrap();
            let corner = Geometry::from_wkt("POLYGON ((65.25 72.75, 66 72.75, 66 73, 65.25 73, 65.25 72.75))").unwrap();
            let inside = Geometry::from_wkt("POLYGON ((10 50, 10.1 50, 10.1 50.1, 10 50.1, 10 50))").unwrap();
            for (geom, date) in [(shared_edge, "2005-01-08"), (corner, "2005-01-09"), (inside, "2009-01-24")] {
                layer
                    .create_feature_fields(geom, &["EventDate"], &[FieldValue::StringValue(date.to_string())])
                    .unwrap();
            }
        }

        let features = read_clipped(&input, &BoundingBox::EURO_CORDEX, "EventDate").unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].date, NaiveDate::from_ymd_opt(2009, 1, 24));
        assert_eq!(features[0].geometry.geometry_name(), "MULTIPOLYGON");

        let output = dir.path().join("out/edges.shp");
        write_shapefile(&features, &output).unwrap();
        assert!(output.exists());
    }
}
