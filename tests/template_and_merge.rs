mod common;

use std::{fs, time::Duration};

use approx::assert_relative_eq;
use common::{card, init_logging, sin_cube_cards, utf8_tempdir, write_fits_header};
use optifind::{
    catalogue::SourceRecord,
    cube::CubeGeometry,
    merge::{merge, MergeStatus},
    optifind_errors::OptifindError,
    parameters::ParameterSet,
    region::{compute_region, SubRegion},
    runner::{CatalogueFormat, OutputCatalogue, RunResult},
};

const TEMPLATE: &str = "\
# SoFiA 2 parameter file
pipeline.verbose     =  false
input.data           =  /data/cube.fits
input.region         =
scfind.kernelsXY     =  0, 3, 6
scfind.threshold     =  3.5
output.writeCatASCII =  true
output.writeCatXML   =  false
";

#[test]
fn test_template_round_trip() {
    let (_tmp, dir) = utf8_tempdir();
    let path = dir.join("in.par");
    fs::write(&path, TEMPLATE).unwrap();

    let template = ParameterSet::load(&path).unwrap();
    assert_eq!(template.get("scfind.kernelsXY"), Some("0, 3, 6"));
    assert_eq!(template.get("input.region"), Some(""));

    let copy = dir.join("copy.par");
    template.serialize(&copy).unwrap();
    let reloaded = ParameterSet::load(&copy).unwrap();
    assert_eq!(reloaded, template);
    assert_eq!(
        reloaded.iter().map(|(k, _)| k).collect::<Vec<_>>(),
        template.iter().map(|(k, _)| k).collect::<Vec<_>>()
    );
}

#[test]
fn test_template_without_input_cube() {
    let (_tmp, dir) = utf8_tempdir();
    let path = dir.join("in.par");
    fs::write(&path, "scfind.threshold = 4\n").unwrap();
    assert_eq!(
        ParameterSet::load(&path),
        Err(OptifindError::MissingKey("input.data".into()))
    );
}

fn write_catalogue(path: &camino::Utf8Path, text: &str) -> OutputCatalogue {
    fs::write(path, text).unwrap();
    OutputCatalogue {
        path: path.to_path_buf(),
        format: CatalogueFormat::Ascii,
    }
}

fn result(id: &str, exit: i32, output: Option<OutputCatalogue>) -> RunResult {
    RunResult {
        source_id: id.into(),
        region: SubRegion::default(),
        exit_code: Some(exit),
        timed_out: false,
        stdout: String::new(),
        stderr: String::new(),
        elapsed: Duration::from_millis(10),
        output_catalogue: output,
    }
}

#[test]
fn test_merge_is_idempotent_and_unions_columns() {
    init_logging();
    let (_tmp, dir) = utf8_tempdir();

    let a = write_catalogue(
        &dir.join("a_cat.txt"),
        "# name id x\n# - - pix\n#\n  \"SoFiA J1\"  1  10.5\n  \"SoFiA J2\"  2  11.0\n",
    );
    let b = write_catalogue(
        &dir.join("b_cat.txt"),
        "# name id x rms\n  \"SoFiA J3\"  1  3.25  0.001\n",
    );
    let not_ascii = write_catalogue(&dir.join("c_cat.txt"), "<?xml version=\"1.0\"?>\n");
    let results = vec![
        result("a", 0, Some(a)),
        result("b", 0, Some(b)),
        result("c", 0, Some(not_ascii)),
        result("d", 0, None),
        result("e", 1, None),
    ];

    let first = dir.join("merged_1.txt");
    let second = dir.join("merged_2.txt");
    let report = merge(&results, &first).unwrap();
    merge(&results, &second).unwrap();

    let text = fs::read_to_string(&first).unwrap();
    assert_eq!(text, fs::read_to_string(&second).unwrap());

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.merged_runs(), 2);
    assert!(matches!(
        report.status_of("c"),
        Some(MergeStatus::UnsupportedFormat { .. })
    ));
    assert_eq!(report.status_of("d"), Some(&MergeStatus::NoOutput));
    assert_eq!(report.status_of("e"), Some(&MergeStatus::RunFailed));

    let header = text.lines().nth(3).unwrap();
    let names: Vec<&str> = header.trim_start_matches('#').split_whitespace().collect();
    assert_eq!(names, vec!["source_id", "name", "id", "x", "rms"]);
    assert!(text.contains("# Merged runs: 2"));
    // rows of `a` have no `rms` value
    assert!(text
        .lines()
        .any(|l| l.starts_with("  a ") && l.trim_end().ends_with("\"\"")));
}

#[test]
fn test_sin_cube_from_fits() {
    let (_tmp, dir) = utf8_tempdir();
    let path = dir.join("sin.fits");
    write_fits_header(&path, &sin_cube_cards());

    let geometry = CubeGeometry::from_fits(&path).unwrap();
    assert_eq!(geometry.extents(), vec![101, 101, 50]);
    assert_eq!(geometry.spectral_axis(), Some(2));

    let pixel = geometry.world_to_pixel(&[180.0, -30.0, 20_000.0]).unwrap();
    assert_relative_eq!(pixel[0], 50.0, epsilon = 1e-9);
    assert_relative_eq!(pixel[1], 50.0, epsilon = 1e-9);
    assert_relative_eq!(pixel[2], 20.0, epsilon = 1e-9);

    let world = geometry.pixel_to_world(&[60.0, 40.0, 5.0]).unwrap();
    let back = geometry.world_to_pixel(&world).unwrap();
    for (p, q) in back.iter().zip([60.0, 40.0, 5.0]) {
        assert_relative_eq!(*p, q, epsilon = 1e-8);
    }

    // RA increases to the left: a source east of the centre has a smaller x pixel
    let east = geometry.world_to_pixel(&[180.1, -30.0, 0.0]).unwrap();
    assert!(east[0] < 50.0);

    let source = SourceRecord::new("centre", vec![180.0, -30.0, 20_000.0]);
    let region = compute_region(&geometry, &source, 10.0, 4.0).unwrap();
    assert_eq!(region.to_string(), "[40:60, 40:60, 16:24]");
}

#[test]
fn test_truncated_fits_header() {
    let (_tmp, dir) = utf8_tempdir();
    let path = dir.join("broken.fits");
    fs::write(&path, format!("{:<80}", card("SIMPLE", "T"))).unwrap();
    assert!(matches!(
        CubeGeometry::from_fits(&path),
        Err(OptifindError::FitsHeader(_))
    ));
}
