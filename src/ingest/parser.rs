//! Delimited text to tagged rows.
//!
//! Columns are matched by header name when the input has a header line and
//! by position otherwise. Header names compare case-insensitively and ignore
//! spaces, dashes and underscores, so `Customer Name`, `customer_name` and
//! `customerName` all land in the same column.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::FulfillmentError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFormat {
    #[serde(default = "TextFormat::default_delimiter")]
    pub delimiter: char,
    #[serde(default = "TextFormat::default_header")]
    pub has_header: bool,
}

impl Default for TextFormat {
    fn default() -> Self { Self { delimiter: ',', has_header: true } }
}

impl TextFormat {
    fn default_delimiter() -> char { ',' }
    fn default_header() -> bool { true }
}

/// One input line, keyed by canonical column name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub line: usize,
    fields: HashMap<&'static str, String>,
}

impl Row {
    #[cfg(test)]
    pub(crate) fn from_pairs(line: usize, pairs: &[(&'static str, &str)]) -> Self {
        Self { line, fields: pairs.iter().map(|(k, v)| (*k, v.to_string())).collect() }
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    /// Parses an optional value, naming the column in the error.
    pub fn parse<T: FromStr>(&self, column: &str) -> Result<Option<T>, String> {
        match self.get(column) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| format!("{column} must be a number, got {raw:?}")),
        }
    }
}

fn normalise(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, ' ' | '_' | '-')).flat_map(char::to_lowercase).collect()
}

/// Splits `input` into rows. Blank lines are skipped; unknown header columns are ignored.
pub fn parse_rows(input: &str, format: TextFormat, columns: &[&'static str]) -> Result<Vec<Row>, FulfillmentError> {
    if !format.delimiter.is_ascii() {
        return Err(FulfillmentError::validation("Delimiter must be a single ASCII character"));
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter as u8)
        .has_headers(format.has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    // Position in the record -> canonical column.
    let layout: Vec<Option<&'static str>> = if format.has_header {
        let headers = reader.headers().map_err(|e| FulfillmentError::validation(format!("Unreadable header: {e}")))?;
        let by_name: HashMap<String, &'static str> = columns.iter().map(|c| (normalise(c), *c)).collect();
        headers.iter().map(|h| by_name.get(&normalise(h)).copied()).collect()
    } else {
        columns.iter().copied().map(Some).collect()
    };

    let mut rows = vec![];
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or_default();
            FulfillmentError::validation(format!("line {line}: {e}"))
        })?;
        if record.iter().all(str::is_empty) { continue; }
        let line = record.position().map(|p| p.line() as usize).unwrap_or(rows.len() + 1);
        let fields = record.iter().zip(&layout)
            .filter_map(|(value, column)| column.map(|c| (c, value.to_string())))
            .collect();
        rows.push(Row { line, fields });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["name", "sku", "weight"];

    #[test]
    fn test_header_mapping() {
        let input = "Weight;Name;Colour\n1.5; Desk Lamp ;red\n\n2;Kettle;\n";
        let rows = parse_rows(input, TextFormat { delimiter: ';', has_header: true }, COLUMNS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some("Desk Lamp"));
        assert_eq!(rows[0].parse::<f64>("weight").unwrap(), Some(1.5));
        assert_eq!(rows[0].get("sku"), None);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn test_positional_columns() {
        let rows = parse_rows("Mug,MUG-1,0.3\nPlate", TextFormat { delimiter: ',', has_header: false }, COLUMNS).unwrap();
        assert_eq!(rows[0].get("sku"), Some("MUG-1"));
        assert_eq!(rows[1].get("name"), Some("Plate"));
        assert_eq!(rows[1].get("weight"), None);
        assert_eq!(rows[1].line, 2);
    }

    #[test]
    fn test_bad_number_names_column() {
        let rows = parse_rows("name,weight\nMug,heavy", TextFormat::default(), COLUMNS).unwrap();
        let err = rows[0].parse::<f64>("weight").unwrap_err();
        assert!(err.starts_with("weight must be a number"));
    }

    #[test]
    fn test_header_normalisation() {
        assert_eq!(normalise("Customer Name"), normalise("customerName"));
        assert_eq!(normalise("external_order-id"), "externalorderid");
    }
}
