//! # Primary header of a FITS data cube
//!
//! The primary HDU is opened with `fitsio` and the keywords needed to describe the cube
//! (`NAXIS`, `NAXISi`, `CTYPEi`, `CRPIXi`, `CRVALi`, `CDELTi`, `PCi_j`, `CDi_j`,
//! `LONPOLE`, `LATPOLE`) are copied into a [`KeywordMap`] once. The data unit is never
//! read.
//!
//! Values are looked up through the [`KeywordProvider`] trait, implemented by
//! [`FitsHeader`] and by the in-memory [`KeywordMap`].
use std::collections::HashMap;

use ahash::RandomState;
use camino::Utf8Path;
use fitsio::compat::{
    fitsfile::FitsFile,
    hdu::{FitsHdu, HduInfo},
    headers::ReadsKey,
};

use crate::optifind_errors::OptifindError;

/// Read access to WCS-related header keywords.
pub trait KeywordProvider {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_float(&self, key: &str) -> Option<f64>;
    fn get_int(&self, key: &str) -> Option<i64>;
}

/// WCS keywords of the primary HDU of a FITS file.
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    keywords: KeywordMap,
}

impl FitsHeader {
    /// Read the primary header of the FITS file at `path`.
    ///
    /// Return
    /// ----------
    /// * The header keywords describing the cube axes and their WCS.
    /// * [`OptifindError::FitsHeader`] if the file cannot be opened as FITS, the
    ///   primary HDU is not an image or `NAXIS` is missing.
    pub fn read(path: &Utf8Path) -> Result<Self, OptifindError> {
        let fits_error = |e: fitsio::compat::errors::Error| OptifindError::FitsHeader(format!("{path}: {e}"));

        let mut fptr = FitsFile::open(path.as_std_path()).map_err(fits_error)?;
        let hdu = fptr.primary_hdu().map_err(fits_error)?;

        if !matches!(hdu.info(&fptr).map_err(fits_error)?, HduInfo::ImageInfo { .. }) {
            return Err(OptifindError::FitsHeader(format!(
                "{path}: primary HDU is not an image"
            )));
        }

        let naxis: i64 = hdu.read_key(&mut fptr, "NAXIS").map_err(fits_error)?;
        let mut keywords = KeywordMap::new();
        keywords.set_int("NAXIS", naxis);

        let naxis = naxis.max(0) as usize;
        for i in 1..=naxis {
            copy_key::<i64>(&hdu, &mut fptr, &format!("NAXIS{i}"), &mut keywords);
            copy_key::<String>(&hdu, &mut fptr, &format!("CTYPE{i}"), &mut keywords);
            for prefix in ["CRPIX", "CRVAL", "CDELT"] {
                copy_key::<f64>(&hdu, &mut fptr, &format!("{prefix}{i}"), &mut keywords);
            }
            for j in 1..=naxis {
                copy_key::<f64>(&hdu, &mut fptr, &format!("PC{i}_{j}"), &mut keywords);
                copy_key::<f64>(&hdu, &mut fptr, &format!("CD{i}_{j}"), &mut keywords);
            }
        }
        copy_key::<f64>(&hdu, &mut fptr, "LONPOLE", &mut keywords);
        copy_key::<f64>(&hdu, &mut fptr, "LATPOLE", &mut keywords);

        Ok(FitsHeader { keywords })
    }

    /// Number of keywords read from the file.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl KeywordProvider for FitsHeader {
    fn get_string(&self, key: &str) -> Option<String> {
        self.keywords.get_string(key)
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        self.keywords.get_float(key)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.keywords.get_int(key)
    }
}

/// Value stored into a [`KeywordMap`] when read from a header.
trait HeaderKey: ReadsKey {
    fn store(self, key: &str, map: &mut KeywordMap);
}

impl HeaderKey for i64 {
    fn store(self, key: &str, map: &mut KeywordMap) {
        map.set_int(key, self);
    }
}

impl HeaderKey for f64 {
    fn store(self, key: &str, map: &mut KeywordMap) {
        map.set_float(key, self);
    }
}

impl HeaderKey for String {
    fn store(self, key: &str, map: &mut KeywordMap) {
        // trailing blanks are not significant in FITS strings
        map.set_string(key, self.trim_end());
    }
}

/// Copy `key` into `map` when present; absent or mistyped keys are left out.
fn copy_key<T: HeaderKey>(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str, map: &mut KeywordMap) {
    if let Ok(value) = hdu.read_key::<T>(fptr, key) {
        value.store(key, map);
    }
}

/// In-memory keyword set, used to describe a cube without a file.
#[derive(Debug, Clone, Default)]
pub struct KeywordMap {
    strings: HashMap<String, String, RandomState>,
    floats: HashMap<String, f64, RandomState>,
    ints: HashMap<String, i64, RandomState>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.strings.insert(key.into(), value.into());
        self
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.floats.insert(key.into(), value);
        self
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.ints.insert(key.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.strings.len() + self.floats.len() + self.ints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeywordProvider for KeywordMap {
    fn get_string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        self.floats
            .get(key)
            .copied()
            .or_else(|| self.ints.get(key).map(|&i| i as f64))
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    /// Header cards padded to a 2880-byte block, followed by a zero-filled data unit.
    fn write_fits(dir: &tempfile::TempDir, name: &str, cards: &[&str], data_bytes: usize) -> Utf8PathBuf {
        let mut bytes: Vec<u8> = cards
            .iter()
            .chain(std::iter::once(&"END"))
            .flat_map(|c| format!("{c:<80}").into_bytes())
            .collect();
        bytes.resize(bytes.len().div_ceil(2880) * 2880, b' ');
        bytes.resize(bytes.len() + data_bytes.div_ceil(2880) * 2880, 0);

        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_read_wcs_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fits(
            &dir,
            "image.fits",
            &[
                "SIMPLE  =                    T / conforms to FITS standard",
                "BITPIX  =                    8",
                "NAXIS   =                    2",
                "NAXIS1  =                   10",
                "NAXIS2  =                   12",
                "CTYPE1  = 'RA---TAN'           / right ascension",
                "CTYPE2  = 'DEC--TAN'",
                "CRPIX1  =                  5.5",
                "CRVAL2  =                -30.0",
                "CDELT1  =             -1.0E-02",
                "PC1_2   =                  0.5",
                "LONPOLE =                180.0",
                "OBJECT  = 'not a wcs keyword'",
                "COMMENT just some text",
            ],
            10 * 12,
        );

        let header = FitsHeader::read(&path).unwrap();
        assert_eq!(header.get_int("NAXIS"), Some(2));
        assert_eq!(header.get_int("NAXIS2"), Some(12));
        assert_eq!(header.get_float("NAXIS1"), Some(10.0));
        assert_eq!(header.get_string("CTYPE1").as_deref(), Some("RA---TAN"));
        assert_eq!(header.get_float("CRPIX1"), Some(5.5));
        assert_eq!(header.get_float("CRVAL2"), Some(-30.0));
        assert_eq!(header.get_float("CDELT1"), Some(-0.01));
        assert_eq!(header.get_float("PC1_2"), Some(0.5));
        assert_eq!(header.get_float("LONPOLE"), Some(180.0));
        assert_eq!(header.get_float("CD1_1"), None);
        assert_eq!(header.get_string("OBJECT"), None);
    }

    #[test]
    fn test_not_a_fits_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("notes.fits")).unwrap();
        fs::write(&path, "just some text\n").unwrap();
        assert!(matches!(
            FitsHeader::read(&path),
            Err(OptifindError::FitsHeader(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.fits")).unwrap();
        assert!(matches!(
            FitsHeader::read(&path),
            Err(OptifindError::FitsHeader(msg)) if msg.contains("absent.fits")
        ));
    }

    #[test]
    fn test_keyword_map_int_as_float() {
        let mut map = KeywordMap::new();
        map.set_int("NAXIS1", 64).set_string("CTYPE1", "FREQ");
        assert_eq!(map.get_float("NAXIS1"), Some(64.0));
        assert_eq!(map.get_int("NAXIS1"), Some(64));
        assert_eq!(map.get_float("CRVAL1"), None);
        assert_eq!(map.get_string("CTYPE1").as_deref(), Some("FREQ"));
        assert_eq!(map.len(), 2);
    }
}
