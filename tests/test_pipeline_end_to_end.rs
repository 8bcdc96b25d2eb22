use approx::assert_relative_eq;
use chrono::NaiveDate;
use efmi_regrid::core::coarsen::{BlockReducer, CoarsenParams};
use efmi_regrid::core::metadata::OutputName;
use efmi_regrid::io::loader::LoaderParams;
use efmi_regrid::io::netcdf_store::VariableSpec;
use efmi_regrid::io::sources::EraTable;
use efmi_regrid::{
    CompositePipeline, CompositeSpec, GriddedField, NetCdfReader, NetCdfWriter, RedownloadQueue, RegridConfig,
    SpatialGrid, TimeResolution,
};
use ndarray::Array3;
use std::path::Path;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn write_month(dir: &Path, date: NaiveDate, value: f32) {
    let grid = SpatialGrid::Regular {
        lat: vec![45.0, 45.1, 45.2, 45.3],
        lon: vec![5.0, 5.1, 5.2, 5.3],
    };
    let field = GriddedField::new("x", "K", Array3::from_elem((1, 4, 4), value), grid, vec![date], TimeResolution::Monthly)
        .unwrap();
    let name = format!("product_{}.nc", date.format("%Y%m%d"));
    NetCdfWriter::write(&field, &dir.join(name)).unwrap();
}

fn composite(root: &Path) -> CompositeSpec {
    let loader = LoaderParams::new(root, EraTable::single("all", "product_{yyyy}{mm}*.nc"), VariableSpec::new("x"));
    let output = OutputName::new("x", TimeResolution::Monthly, "test").years(2015, 2015);
    let mut spec = CompositeSpec::new("test", loader, d(2015, 1, 1), d(2015, 3, 31), output);
    spec.coarsen = Some(CoarsenParams::square(2, BlockReducer::Mean));
    spec.data_source = "Synthetic monthly product".to_string();
    spec
}

#[test]
fn test_corrupt_month_is_dropped_and_listed() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in");
    std::fs::create_dir_all(&input).unwrap();
    write_month(&input, d(2015, 1, 15), 280.0);
    let corrupt = input.join("product_20150215.nc");
    std::fs::write(&corrupt, b"CDF\x01 truncated").unwrap();
    write_month(&input, d(2015, 3, 15), 290.0);

    let config = RegridConfig {
        output_dir: root.path().join("out"),
        ..Default::default()
    };
    let summary = CompositePipeline::new(config.clone()).run(&composite(&input)).unwrap();

    assert_eq!(summary.time_steps, 2);
    assert!(summary.redownload.contains(&corrupt));
    assert!(corrupt.exists(), "corrupt file is only deleted when purging");

    let list = config.output_dir.join("redownload_test.txt");
    let listed = RedownloadQueue::load(&list).unwrap();
    assert_eq!(listed.paths(), vec![corrupt.clone()]);

    let output = &summary.outputs[0];
    assert!(output.ends_with("rs_veg_europe_x_none_mon_2015_v1_test.nc"));
    let back = NetCdfReader::new().read_field(output, &VariableSpec::new("x"), None).unwrap();
    assert_eq!(back.shape(), (2, 2, 2));
    assert_eq!(back.times, vec![d(2015, 1, 1), d(2015, 3, 1)]);
    assert_relative_eq!(back.data[[0, 1, 1]], 280.0);
    assert_relative_eq!(back.data[[1, 0, 0]], 290.0);
    assert_eq!(back.attributes.get("Data_source").map(String::as_str), Some("Synthetic monthly product"));
}

#[test]
fn test_purge_removes_corrupt_copy() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in");
    std::fs::create_dir_all(&input).unwrap();
    write_month(&input, d(2015, 1, 15), 280.0);
    let corrupt = input.join("product_20150315.nc");
    std::fs::write(&corrupt, b"not netcdf").unwrap();

    let config = RegridConfig {
        output_dir: root.path().join("out"),
        write_redownload_list: false,
        purge_corrupt: true,
        ..Default::default()
    };
    let summary = CompositePipeline::new(config.clone()).run(&composite(&input)).unwrap();

    assert_eq!(summary.time_steps, 1);
    assert!(!corrupt.exists());
    assert!(!config.output_dir.join("redownload_test.txt").exists());
}

#[test]
fn test_no_readable_period_fails() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("product_20150115.nc"), b"garbage").unwrap();

    let config = RegridConfig {
        output_dir: root.path().join("out"),
        ..Default::default()
    };
    let result = CompositePipeline::new(config).run(&composite(root.path()));
    assert!(result.is_err());
}
