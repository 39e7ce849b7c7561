//! Parsing of lattice attribute tables.
//!
//! `show lat -no_label_lines -attribute <attr> <selection>` answers with one
//! whitespace-delimited row per element:
//!
//! ```text
//!   12  Q21201   Quadrupole   2045.1200   0.1080   -12.4471
//! index name     key          s           length   <attr>
//! ```

use tracing::debug;

/// One parsed row of an attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeRow {
    /// Element name as known to the model.
    pub element: String,
    /// Element length in metres.
    pub length: f64,
    /// Value of the requested attribute, in model units.
    pub value: f64,
}

/// Parse a single row. Returns `None` for rows that do not have exactly six
/// columns or whose numeric columns do not parse.
pub fn parse_row(row: &str) -> Option<LatticeRow> {
    let fields: Vec<&str> = row.split_whitespace().collect();
    let [_index, element, _key, _s, length, value] = fields.as_slice() else {
        return None;
    };
    let length = length.parse::<f64>().ok()?;
    let value = value.parse::<f64>().ok()?;
    Some(LatticeRow {
        element: (*element).to_string(),
        length,
        value,
    })
}

/// Parse a whole table, dropping malformed rows.
pub fn parse_table<I, S>(rows: I) -> Vec<LatticeRow>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    rows.into_iter()
        .filter_map(|row| {
            let row = row.as_ref();
            let parsed = parse_row(row);
            if parsed.is_none() && !row.trim().is_empty() {
                debug!(row, "Skipping malformed lattice row");
            }
            parsed
        })
        .collect()
}
