use std::{collections::HashSet, io::Read, path::Path};

use once_cell::sync::OnceCell;
use regex::Regex;
use time::UtcOffset;
use water_client::{QualityReading, QualitySeries};

use super::{csv_reader, parse_local, parse_number};
use crate::error::AnalyticsError;

static PARAMETER_HEADER: OnceCell<Regex> = OnceCell::new();

fn parameter_header() -> Result<&'static Regex, AnalyticsError> {
    PARAMETER_HEADER.get_or_try_init(|| {
        Regex::new(r"(?i)^\s*\d+\.\s*(.+?)\s*,\s*Safe Range:\s*\(([^)]+)\)\s*$")
            .map_err(|e| AnalyticsError::Source(format!("invalid parameter header pattern: {e}")))
    })
}

/// Parse `"a to b"` into `(a, b)`.
fn parse_safe_range(text: &str) -> Option<(f64, f64)> {
    let (lo, hi) = text.split_once("to")?;
    Some((parse_number(lo)?, parse_number(hi)?))
}

#[derive(Debug)]
struct Section {
    parameter: String,
    safe_min: f64,
    safe_max: f64,
    in_table: bool,
}

/// Try the first cell alone, then the row re-joined, since an unquoted
/// header is split by the CSV reader at its comma.
fn match_section(cells: &[&str], line: u64) -> Result<Option<Section>, AnalyticsError> {
    let re = parameter_header()?;
    let joined = cells.join(",");
    let Some(caps) = re.captures(cells[0]).or_else(|| re.captures(&joined)) else {
        return Ok(None);
    };

    let parameter = caps[1].trim().to_string();
    let range = caps[2].trim();
    let (safe_min, safe_max) = parse_safe_range(range).ok_or_else(|| {
        AnalyticsError::InputShape(format!(
            "quality line {line}: invalid safe range '{range}' for {parameter}"
        ))
    })?;

    Ok(Some(Section {
        parameter,
        safe_min,
        safe_max,
        in_table: false,
    }))
}

/// Parse a quality export made of per-parameter blocks:
///
/// ```text
/// 1. ETP (pH), Safe Range: (6.5 to 8.5)
/// Date,Time,Value
/// 01/03/2024,10:00,7.1
/// ```
///
/// Rows outside a `Date | Time | Value` table are ignored. Inside a table,
/// an unparseable timestamp or value is an `InputShape` error naming the line.
/// A repeated `(parameter, timestamp)` keeps its first row.
pub fn read_quality_blocks<R: Read>(
    reader: R,
    offset: UtcOffset,
) -> Result<QualitySeries, AnalyticsError> {
    let mut rdr = csv_reader(reader);
    let mut readings = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates = 0usize;
    let mut section: Option<Section> = None;
    let mut sections = 0usize;

    for result in rdr.records() {
        let record = result.map_err(|e| {
            AnalyticsError::Source(format!("failed to read quality CSV record: {e}"))
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let cells: Vec<&str> = record.iter().filter(|c| !c.is_empty()).collect();
        if cells.is_empty() {
            continue;
        }

        if let Some(next) = match_section(&cells, line)? {
            sections += 1;
            section = Some(next);
            continue;
        }

        let Some(current) = section.as_mut() else {
            continue;
        };

        if cells.len() >= 3
            && cells[0].eq_ignore_ascii_case("date")
            && cells[1].eq_ignore_ascii_case("time")
        {
            current.in_table = true;
            continue;
        }
        if !current.in_table || cells.len() < 3 {
            continue;
        }

        let timestamp = parse_local(cells[0], cells[1], offset)
            .map_err(|e| AnalyticsError::InputShape(format!("quality line {line}: {e}")))?;
        let value = parse_number(cells[2]).ok_or_else(|| {
            AnalyticsError::InputShape(format!(
                "quality line {line}: invalid value '{}'",
                cells[2]
            ))
        })?;

        if !seen.insert((current.parameter.clone(), timestamp)) {
            duplicates += 1;
            continue;
        }
        readings.push(QualityReading {
            timestamp,
            parameter: current.parameter.clone(),
            value,
            safe_min: current.safe_min,
            safe_max: current.safe_max,
        });
    }

    metrics::counter!("source_quality_rows_total").increment(readings.len() as u64);
    if duplicates > 0 {
        tracing::warn!(duplicates, "dropped repeated quality rows");
    }
    tracing::info!(sections, rows = readings.len(), "quality blocks parsed");

    Ok(QualitySeries::from_readings(readings)?)
}

pub fn load_quality_csv<P: AsRef<Path>>(
    path: P,
    offset: UtcOffset,
) -> Result<QualitySeries, AnalyticsError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        AnalyticsError::Source(format!("failed to open quality file {}: {e}", path.display()))
    })?;
    read_quality_blocks(bytes.as_slice(), offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    const EXPORT: &str = "\
Water Quality Report,,
1. ETP (pH), Safe Range: (6.5 to 8.5)
Date,Time,Value
01/03/2024,10:00,7.1
01/03/2024,11:00,9.2
,,
\"2. HUMIDITY (HUMIDITY), Safe Range: (30 to 70)\",,
Date,Time,Value
2024-03-01,10:00:00,55
";

    #[test]
    fn sections_carry_their_safe_range() {
        let quality = read_quality_blocks(EXPORT.as_bytes(), offset!(+05:30)).unwrap();

        assert_eq!(quality.len(), 3);
        assert_eq!(quality.parameters(), vec!["ETP (pH)", "HUMIDITY (HUMIDITY)"]);

        let ph = quality.for_parameter("ETP (pH)");
        assert_eq!(ph.len(), 2);
        assert_eq!(ph[1].timestamp, datetime!(2024-03-01 11:00:00 +05:30));
        assert_eq!((ph[1].safe_min, ph[1].safe_max), (6.5, 8.5));
        assert!(!ph[1].in_range());

        let humidity = quality.for_parameter("HUMIDITY (HUMIDITY)");
        assert_eq!((humidity[0].safe_min, humidity[0].safe_max), (30.0, 70.0));
    }

    #[test]
    fn rows_before_table_header_are_ignored() {
        let text = "1. TDS (TDS), Safe Range: (0 to 500)\n01/03/2024,10:00,100\n\
                    Date,Time,Value\n01/03/2024,11:00,200\n";
        let quality = read_quality_blocks(text.as_bytes(), offset!(+05:30)).unwrap();
        assert_eq!(quality.len(), 1);
        assert_eq!(quality.readings()[0].value, 200.0);
    }

    #[test]
    fn bad_value_names_the_line() {
        let text =
            "1. TDS (TDS), Safe Range: (0 to 500)\nDate,Time,Value\n01/03/2024,10:00,high\n";
        let err = read_quality_blocks(text.as_bytes(), offset!(+05:30)).unwrap_err();
        match err {
            AnalyticsError::InputShape(msg) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn repeated_rows_keep_the_first_value() {
        let text = "1. TDS (TDS), Safe Range: (0 to 500)\nDate,Time,Value\n\
                    01/03/2024,10:00,100\n01/03/2024,10:00,900\n01/03/2024,11:00,200\n";
        let quality = read_quality_blocks(text.as_bytes(), offset!(+05:30)).unwrap();
        let values: Vec<f64> = quality.readings().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![100.0, 200.0]);
    }

    #[test]
    fn unparseable_safe_range_is_rejected() {
        let text = "1. TDS (TDS), Safe Range: (low to high)\nDate,Time,Value\n";
        let err = read_quality_blocks(text.as_bytes(), offset!(+05:30)).unwrap_err();
        assert!(matches!(err, AnalyticsError::InputShape(_)));
    }

    #[test]
    fn safe_range_parsing() {
        assert_eq!(parse_safe_range("6.5 to 8.5"), Some((6.5, 8.5)));
        assert_eq!(parse_safe_range("0 to 1,000"), Some((0.0, 1000.0)));
        assert_eq!(parse_safe_range("7"), None);
    }
}
