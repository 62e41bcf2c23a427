use anyhow::{Context, Result, bail};
use std::path::Path;
use std::str::FromStr;

/// Reads a whitespace-separated table, one row per non-empty line.
///
/// Every row must have the same number of columns.
pub fn read_table<T>(path: &Path) -> Result<Vec<Vec<T>>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    parse_table(&content).with_context(|| format!("failed to parse {path:?}"))
}

pub fn parse_table<T>(content: &str) -> Result<Vec<Vec<T>>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut rows: Vec<Vec<T>> = Vec::new();
    for (line_idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|value| {
                value
                    .parse::<T>()
                    .with_context(|| format!("line {}: invalid value {value:?}", line_idx + 1))
            })
            .collect::<Result<Vec<T>>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                bail!(
                    "line {}: expected {} columns, found {}",
                    line_idx + 1,
                    first.len(),
                    row.len()
                );
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scientific_notation_and_skips_blank_lines() {
        let table: Vec<Vec<f32>> =
            parse_table("  1.0e-1  -2.5e+00\n\n3 4\n").unwrap();
        assert_eq!(table, vec![vec![0.1, -2.5], vec![3., 4.]]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse_table::<f32>("1 2 3\n4 5\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
    }

    #[test]
    fn reports_the_offending_value() {
        let err = parse_table::<usize>("1\nx\n").unwrap_err();
        assert!(format!("{err:#}").contains("\"x\""), "{err:#}");
    }
}
