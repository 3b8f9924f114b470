//! `optifind`: run SoFiA 2 on the neighbourhood of every catalogued source of a cube.
//!
//! ```text
//! optifind <par_file> <source_list> <r_spat> <r_spec> [<sofia_exe>]
//! ```
//!
//! The merged catalogue is written to `<output directory>/optifind_merged_catalogue.txt`,
//! where the output directory is the template's `output.directory`, or the directory of
//! the input cube when it is not set.
use std::{process::ExitCode, time::Duration};

use camino::Utf8PathBuf;
use clap::Parser;
use log::{error, info, warn};

use optifind::{
    catalogue::read_source_list,
    constants::{DEFAULT_SOFIA_EXECUTABLE, MERGED_CATALOGUE_NAME},
    cube::CubeGeometry,
    merge::merge,
    optifind_errors::OptifindError,
    parameters::ParameterSet,
    runner::{RunDriver, RunOptions, SofiaExecutable},
    summary::BatchSummary,
};

#[derive(Parser, Debug)]
#[command(
    name = "optifind",
    version,
    about = "Run SoFiA 2 on sub-regions of a data cube around catalogued sources",
    long_about = None
)]
struct Args {
    /// SoFiA 2 parameter file used as template for every run
    par_file: Utf8PathBuf,

    /// Source list: `id, coord_1, coord_2, ...` in world coordinates of the cube
    source_list: Utf8PathBuf,

    /// Half-width of the sub-region on the spatial axes, in pixels
    r_spat: f64,

    /// Half-width of the sub-region on the spectral axis, in channels
    r_spec: f64,

    /// SoFiA 2 executable (path or name looked up in PATH)
    #[arg(default_value = DEFAULT_SOFIA_EXECUTABLE)]
    sofia_exe: Utf8PathBuf,

    /// Kill a SoFiA 2 run after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Directory receiving the per-source parameter files
    #[arg(long, value_name = "DIR", default_value = ".")]
    work_dir: Utf8PathBuf,

    /// Keep the per-source parameter files after each run
    #[arg(long)]
    keep_parameter_files: bool,
}

fn run(args: Args) -> Result<(), OptifindError> {
    let template = ParameterSet::load(&args.par_file)?;
    if !template.catalogue_formats().ascii {
        warn!(
            "Plain-text catalogues are disabled in {}: no per-source catalogue can be merged",
            args.par_file
        );
    }

    let cube = template.input_cube()?.to_path_buf();
    let geometry = CubeGeometry::from_fits(&cube)?;
    info!(
        "Cube {cube}: axes {:?}, spectral axis {:?}",
        geometry.extents(),
        geometry.spectral_axis()
    );

    let sources = read_source_list(&args.source_list)?;
    info!("Read {} source(s) from {}", sources.len(), args.source_list);

    let options = RunOptions::builder()
        .spatial_radius(args.r_spat)
        .spectral_radius(args.r_spec)
        .timeout(args.timeout.map(Duration::from_secs))
        .work_dir(args.work_dir)
        .keep_parameter_files(args.keep_parameter_files)
        .build()?;

    let output_path = template.output_directory().join(MERGED_CATALOGUE_NAME);
    let driver = RunDriver::new(
        template,
        geometry,
        SofiaExecutable::new(args.sofia_exe),
        options,
    );
    let report = driver.run_all(&sources)?;

    let merged = merge(report.run_results(), &output_path)?;
    println!("{}", BatchSummary::new(&report, Some(&merged)));
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
