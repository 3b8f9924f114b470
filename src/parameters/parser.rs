//! Line parser for SoFiA 2 control files (`key = value`).
use std::sync::LazyLock;

use regex::Regex;

use crate::optifind_errors::OptifindError;

static SETTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.]+)\s*=\s*(.*)$").expect("valid parameter regex")
});

/// Parse one line of a control file.
///
/// Blank lines and `#` comment lines yield `Ok(None)`. Inline comments are removed
/// from the value, which is then trimmed (an empty value is kept as `""`).
///
/// Arguments
/// -----------------
/// * `line_number` – 1-based line number, used in the error.
/// * `line` – Raw line content.
///
/// Return
/// ----------
/// * `Ok(Some((key, value)))` for a setting, `Ok(None)` for a line carrying none.
/// * [`OptifindError::TemplateParse`] when the line is neither.
pub(crate) fn parse_line(
    line_number: usize,
    line: &str,
) -> Result<Option<(String, String)>, OptifindError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let caps = SETTING_RE
        .captures(trimmed)
        .ok_or_else(|| OptifindError::TemplateParse {
            line: line_number,
            content: trimmed.to_string(),
        })?;

    let key = caps[1].to_string();
    let raw_value = &caps[2];
    let value = match raw_value.find('#') {
        Some(pos) => raw_value[..pos].trim(),
        None => raw_value.trim(),
    };

    Ok(Some((key, value.to_string())))
}

/// Interpret a SoFiA boolean setting.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            parse_line(1, "input.data  =  cube.fits").unwrap(),
            Some(("input.data".into(), "cube.fits".into()))
        );
        assert_eq!(
            parse_line(1, "\tscfind.threshold\t=\t4.0   # sigma").unwrap(),
            Some(("scfind.threshold".into(), "4.0".into()))
        );
        assert_eq!(
            parse_line(1, "output.filename =").unwrap(),
            Some(("output.filename".into(), String::new()))
        );
    }

    #[test]
    fn test_value_keeps_inner_equals() {
        assert_eq!(
            parse_line(3, "input.mask = a=b.fits").unwrap(),
            Some(("input.mask".into(), "a=b.fits".into()))
        );
    }

    #[test]
    fn test_skip_comments_and_blanks() {
        assert_eq!(parse_line(1, "   ").unwrap(), None);
        assert_eq!(parse_line(2, "# Pipeline settings").unwrap(), None);
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(
            parse_line(7, "this is not a setting").unwrap_err(),
            OptifindError::TemplateParse {
                line: 7,
                content: "this is not a setting".into()
            }
        );
        assert!(parse_line(8, "= orphan value").is_err());
        assert!(parse_line(9, "bad key = 1").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" False "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
