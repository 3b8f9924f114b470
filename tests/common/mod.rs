#![allow(dead_code)]

use std::{cell::RefCell, collections::HashMap, fs, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use optifind::{
    optifind_errors::OptifindError,
    runner::{CatalogueFormat, RunConfig, RunResult, SourceFinder},
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    (tmp, path)
}

/// One 80-character header card.
pub fn card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= {value:>20}")
}

pub fn string_card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= '{value:<8}'")
}

/// Integer value of `keyword` among `cards`.
fn card_value(cards: &[String], keyword: &str) -> Option<i64> {
    cards
        .iter()
        .find(|c| c[..8].trim_end() == keyword)
        .and_then(|c| c[10..].split('/').next()?.trim().parse().ok())
}

/// Write a FITS file made of the primary header `cards` and a zero-filled data unit
/// sized from `BITPIX` and `NAXISi`.
pub fn write_fits_header(path: &Utf8Path, cards: &[String]) {
    let mut header = String::new();
    for c in cards
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("END"))
    {
        assert!(c.len() <= 80, "card too long: {c}");
        header.push_str(&format!("{c:<80}"));
    }
    while header.len() % 2880 != 0 {
        header.push(' ');
    }

    let naxis = card_value(cards, "NAXIS").unwrap_or(0);
    let data_bytes = if naxis == 0 {
        0
    } else {
        let bytes_per_pixel = card_value(cards, "BITPIX").unwrap_or(8).unsigned_abs() / 8;
        (1..=naxis)
            .map(|i| card_value(cards, &format!("NAXIS{i}")).unwrap_or(0) as u64)
            .product::<u64>()
            * bytes_per_pixel
    };

    let mut bytes = header.into_bytes();
    bytes.resize(bytes.len() + (data_bytes as usize).div_ceil(2880) * 2880, 0);
    fs::write(path, bytes).unwrap();
}

/// Header of a 64x64x32x1 cube (RA, DEC, FREQ, STOKES) with a linear WCS:
/// `RA = 100 + 0.5 * p`, `DEC = -30 + 0.5 * p`, `FREQ = 1.4e9 + 1e5 * p`, `STOKES = 1`
/// with `p` the 0-based pixel.
pub fn linear_cube_cards() -> Vec<String> {
    vec![
        card("SIMPLE", "T"),
        card("BITPIX", "-32"),
        card("NAXIS", "4"),
        card("NAXIS1", "64"),
        card("NAXIS2", "64"),
        card("NAXIS3", "32"),
        card("NAXIS4", "1"),
        string_card("CTYPE1", "RA"),
        string_card("CTYPE2", "DEC"),
        string_card("CTYPE3", "FREQ"),
        string_card("CTYPE4", "STOKES"),
        card("CRPIX1", "1.0"),
        card("CRPIX2", "1.0"),
        card("CRPIX3", "1.0"),
        card("CRPIX4", "1.0"),
        card("CRVAL1", "100.0"),
        card("CRVAL2", "-30.0"),
        card("CRVAL3", "1.4E9"),
        card("CRVAL4", "1.0"),
        card("CDELT1", "0.5"),
        card("CDELT2", "0.5"),
        card("CDELT3", "1.0E5"),
        card("CDELT4", "1.0"),
    ]
}

/// Header of a 101x101x50 SIN-projected cube centred on (RA, DEC) = (180, -30) at
/// pixel (50, 50), 36 arcsec pixels.
pub fn sin_cube_cards() -> Vec<String> {
    vec![
        card("SIMPLE", "T"),
        card("BITPIX", "-32"),
        card("NAXIS", "3"),
        card("NAXIS1", "101"),
        card("NAXIS2", "101"),
        card("NAXIS3", "50"),
        string_card("CTYPE1", "RA---SIN"),
        string_card("CTYPE2", "DEC--SIN"),
        string_card("CTYPE3", "VRAD"),
        card("CRPIX1", "51.0"),
        card("CRPIX2", "51.0"),
        card("CRPIX3", "1.0"),
        card("CRVAL1", "180.0"),
        card("CRVAL2", "-30.0"),
        card("CRVAL3", "0.0"),
        card("CDELT1", "-0.01"),
        card("CDELT2", "0.01"),
        card("CDELT3", "1000.0"),
    ]
}

/// Write a template parameter file pointing at `cube`, with outputs in `out_dir`.
pub fn write_template(dir: &Utf8Path, cube: &Utf8Path, out_dir: &Utf8Path, extra: &str) -> Utf8PathBuf {
    let path = dir.join("template.par");
    fs::write(
        &path,
        format!(
            "# test template\ninput.data = {cube}\noutput.directory = {out_dir}\n\
             output.writeCatASCII = true\nscfind.threshold = 5.0\n{extra}"
        ),
    )
    .unwrap();
    path
}

/// What [`FakeFinder`] does for a given source.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    /// Exit 0 and write a plain-text catalogue with these column names and rows.
    Ascii {
        columns: Vec<&'static str>,
        rows: Vec<Vec<&'static str>>,
    },
    /// Exit 0 and write a VOTable catalogue only.
    Xml,
    /// Exit 0 without writing any catalogue (no detection).
    Empty,
    /// Exit with this non-zero code.
    Fail(i32),
}

impl FakeBehaviour {
    pub fn two_rows() -> Self {
        FakeBehaviour::Ascii {
            columns: vec!["name", "id", "x", "y", "f_sum"],
            rows: vec![
                vec!["\"SoFiA J1 a\"", "1", "3.5", "4.5", "1.0e+01"],
                vec!["\"SoFiA J1 b\"", "2", "6.0", "2.0", "2.5e+01"],
            ],
        }
    }
}

/// In-process [`SourceFinder`] that writes fake catalogues where SoFiA 2 would.
pub struct FakeFinder {
    behaviours: HashMap<String, FakeBehaviour>,
    default: FakeBehaviour,
    delay: Duration,
    pub calls: RefCell<Vec<RunConfig>>,
}

impl FakeFinder {
    pub fn new(default: FakeBehaviour) -> Self {
        FakeFinder {
            behaviours: HashMap::new(),
            default,
            delay: Duration::ZERO,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with(mut self, source_id: &str, behaviour: FakeBehaviour) -> Self {
        self.behaviours.insert(source_id.to_string(), behaviour);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn called_ids(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.source_id.clone())
            .collect()
    }
}

impl SourceFinder for FakeFinder {
    fn name(&self) -> &str {
        "fake-sofia"
    }

    fn execute(&self, config: &RunConfig) -> Result<RunResult, OptifindError> {
        assert!(
            config.parameter_file.is_file(),
            "parameter file must exist while the finder runs"
        );
        self.calls.borrow_mut().push(config.clone());
        std::thread::sleep(self.delay);

        fs::create_dir_all(&config.output_directory)?;
        let behaviour = self
            .behaviours
            .get(&config.source_id)
            .unwrap_or(&self.default);

        let exit_code = match behaviour {
            FakeBehaviour::Ascii { columns, rows } => {
                let mut text = String::from("# SoFiA 2 (fake) source catalogue\n#\n");
                text.push_str(&format!("# {}\n", columns.join("  ")));
                text.push_str(&format!("# {}\n#\n", vec!["-"; columns.len()].join("  ")));
                for row in rows {
                    text.push_str(&format!("  {}\n", row.join("  ")));
                }
                fs::write(config.catalogue_path(CatalogueFormat::Ascii), text)?;
                0
            }
            FakeBehaviour::Xml => {
                fs::write(
                    config.catalogue_path(CatalogueFormat::Xml),
                    "<?xml version=\"1.0\"?>\n<VOTABLE/>\n",
                )?;
                0
            }
            FakeBehaviour::Empty => 0,
            FakeBehaviour::Fail(code) => *code,
        };

        Ok(RunResult {
            exit_code: Some(exit_code),
            stdout: format!("fake run of {}", config.parameter_file),
            ..RunResult::for_config(config)
        })
    }
}
