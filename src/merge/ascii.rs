//! Parser for the plain-text catalogues written by SoFiA 2.
//!
//! ```text
//! # SoFiA 2.5.1 source catalogue
//! # Creator: SoFiA 2.5.1
//! #
//! #                      name    id            x            y   ...
//! #                         -     -          pix          pix   ...
//! #
//!   "SoFiA J123456-301234"     1      45.3210      51.0921   ...
//! ```
//!
//! * Lines starting with `#` form the header, blank lines are ignored.
//! * Column names come from the **last block** of consecutive non-empty header lines
//!   preceding the data: the first line of that block which is not a column-number row
//!   (`1 2 3 ...` or `(1) (2) (3) ...`). Later lines of the block (units) are ignored.
//! * Data rows are split on whitespace; a double-quoted token is kept whole, without
//!   its quotes.
use crate::optifind_errors::OptifindError;

/// Column names and data rows of one catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsciiCatalogue {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Split a line on whitespace, keeping double-quoted tokens whole.
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let token: String = chars.by_ref().take_while(|&c| c != '"').collect();
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    tokens
}

fn is_column_number_row(tokens: &[String]) -> bool {
    !tokens.is_empty()
        && tokens.iter().all(|t| {
            let inner = t
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .unwrap_or(t);
            !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit())
        })
}

fn column_names(block: &[Vec<String>]) -> Option<Vec<String>> {
    block
        .iter()
        .find(|tokens| !is_column_number_row(tokens))
        .cloned()
}

impl AsciiCatalogue {
    /// Parse catalogue text.
    ///
    /// Arguments
    /// -----------------
    /// * `text` – Content of the catalogue file.
    /// * `origin` – Path or label used in error messages.
    ///
    /// Return
    /// ----------
    /// * The parsed catalogue (possibly without rows).
    /// * [`OptifindError::UnsupportedFormat`] if data rows have no column header, a row
    ///   has a different number of fields than there are columns, or a column name is
    ///   repeated.
    pub fn parse(text: &str, origin: &str) -> Result<Self, OptifindError> {
        let unsupported = |reason: String| OptifindError::UnsupportedFormat {
            path: origin.to_string(),
            reason,
        };

        let mut block: Vec<Vec<String>> = Vec::new();
        let mut last_block: Vec<Vec<String>> = Vec::new();
        let mut columns: Vec<String> = Vec::new();
        let mut in_data = false;
        let mut rows = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(comment) = trimmed.strip_prefix('#') {
                if in_data {
                    continue;
                }
                let tokens = tokenize(comment);
                if tokens.is_empty() {
                    if !block.is_empty() {
                        last_block = std::mem::take(&mut block);
                    }
                } else {
                    block.push(tokens);
                }
                continue;
            }

            if !in_data {
                if !block.is_empty() {
                    last_block = std::mem::take(&mut block);
                }
                columns = column_names(&last_block)
                    .ok_or_else(|| unsupported("no column header before the data".into()))?;
                in_data = true;
            }

            let fields = tokenize(trimmed);
            if fields.len() != columns.len() {
                return Err(unsupported(format!(
                    "line {}: {} field(s) for {} column(s)",
                    idx + 1,
                    fields.len(),
                    columns.len()
                )));
            }
            rows.push(fields);
        }

        // header-only catalogue: take the names from the trailing block
        if !in_data {
            if !block.is_empty() {
                last_block = block;
            }
            columns = column_names(&last_block).unwrap_or_default();
        }

        if let Some(dup) = columns
            .iter()
            .enumerate()
            .find(|&(i, c)| columns[..i].contains(c))
            .map(|(_, c)| c)
        {
            return Err(unsupported(format!("column {dup:?} appears twice")));
        }

        Ok(AsciiCatalogue { columns, rows })
    }
}
