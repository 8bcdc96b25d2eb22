use chrono::NaiveDate;
use efmi_regrid::io::netcdf_store::VariableSpec;
use efmi_regrid::{CompanionVariable, GriddedField, NetCdfReader, NetCdfWriter, SpatialGrid, TimeResolution};
use ndarray::{Array2, Array3};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_regular_field_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regular.nc");

    let lat = vec![48.0, 48.5, 49.0];
    let lon = vec![2.0, 2.5, 3.0, 3.5];
    let mut data = Array3::from_shape_fn((2, 3, 4), |(t, r, c)| (t * 100 + r * 10 + c) as f32);
    data[[1, 2, 3]] = f32::NAN;
    let mut field = GriddedField::new(
        "lai",
        "none",
        data.clone(),
        SpatialGrid::Regular { lat: lat.clone(), lon: lon.clone() },
        vec![d(2016, 1, 1), d(2016, 2, 1)],
        TimeResolution::Monthly,
    )
    .unwrap();
    field
        .add_companion(CompanionVariable::spatial("cell_area_m2", "m2", Array2::from_elem((3, 4), 2.5e9)))
        .unwrap();
    field.attributes.insert("Data_source".to_string(), "synthetic".to_string());

    NetCdfWriter::write(&field, &path).unwrap();

    let spec = VariableSpec::new("lai").with_companion("cell_area_m2");
    let back = NetCdfReader::new().read_field(&path, &spec, None).unwrap();
    assert_eq!(back.grid, SpatialGrid::Regular { lat, lon });
    assert_eq!(back.times, field.times);
    assert_eq!(back.units, "none");
    assert!(back.data[[1, 2, 3]].is_nan());
    for ((t, r, c), v) in data.indexed_iter() {
        if !v.is_nan() {
            assert_eq!(back.data[[t, r, c]], *v);
        }
    }
    let area = back.companion("cell_area_m2").unwrap();
    assert_eq!(area.units, "m2");
    assert_eq!(back.attributes.get("Data_source").map(String::as_str), Some("synthetic"));
}

#[test]
fn test_curvilinear_field_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("curvilinear.nc");

    let lat = Array2::from_shape_fn((2, 3), |(r, c)| 50.0 + r as f64 * 0.1 + c as f64 * 0.01);
    let lon = Array2::from_shape_fn((2, 3), |(r, c)| 10.0 + c as f64 * 0.1 - r as f64 * 0.01);
    let data = Array3::from_shape_fn((1, 2, 3), |(_, r, c)| (r * 3 + c) as f32);
    let field = GriddedField::new(
        "SOC",
        "tons C m-2",
        data.clone(),
        SpatialGrid::Curvilinear { lat: lat.clone(), lon: lon.clone() },
        vec![d(2017, 5, 1)],
        TimeResolution::Monthly,
    )
    .unwrap();

    NetCdfWriter::write(&field, &path).unwrap();
    assert!(!dir.path().join("curvilinear.nc.partial").exists());

    let back = NetCdfReader::new().read_field(&path, &VariableSpec::new("SOC"), None).unwrap();
    assert_eq!(back.grid, SpatialGrid::Curvilinear { lat, lon });
    assert_eq!(back.data, data);
    assert_eq!(back.times, vec![d(2017, 5, 1)]);
}

#[test]
fn test_written_file_reopens_clean() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reopen.nc");
    let field = GriddedField::new(
        "fires",
        "none",
        Array3::zeros((1, 2, 2)),
        SpatialGrid::Regular { lat: vec![40.0, 41.0], lon: vec![0.0, 1.0] },
        vec![d(2019, 8, 1)],
        TimeResolution::Monthly,
    )
    .unwrap();
    NetCdfWriter::write(&field, &path).unwrap();
    NetCdfReader::verify_readable(&path).unwrap();
}
