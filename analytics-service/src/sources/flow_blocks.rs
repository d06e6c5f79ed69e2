use std::{io::Read, path::Path};

use time::UtcOffset;
use water_client::FlowSeries;

use super::{csv_reader, parse_local, parse_number};
use crate::error::AnalyticsError;

/// A block header row: `Date | Time | Totalizer`.
fn is_flow_header(date: &str, clock: &str, totalizer: &str) -> bool {
    date.eq_ignore_ascii_case("date")
        && clock.eq_ignore_ascii_case("time")
        && totalizer.to_ascii_lowercase().contains("totalizer")
}

/// Parse a flow export made of repeating `Date | Time | Totalizer` blocks.
///
/// Rows before the first header and rows missing any of the three fields are
/// skipped. Inside a block, an unparseable timestamp or totalizer is an
/// `InputShape` error naming the line. Blocks are concatenated, duplicate
/// timestamps keep their first sample, and consumption is derived across the
/// whole series.
pub fn read_flow_blocks<R: Read>(
    reader: R,
    offset: UtcOffset,
) -> Result<FlowSeries, AnalyticsError> {
    let mut rdr = csv_reader(reader);
    let mut samples = Vec::new();
    let mut blocks = 0usize;
    let mut in_block = false;

    for result in rdr.records() {
        let record = result.map_err(|e| {
            AnalyticsError::Source(format!("failed to read flow CSV record: {e}"))
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let date = record.get(0).unwrap_or("");
        let clock = record.get(1).unwrap_or("");
        let totalizer = record.get(2).unwrap_or("");

        if is_flow_header(date, clock, totalizer) {
            in_block = true;
            blocks += 1;
            continue;
        }
        if !in_block || date.is_empty() || clock.is_empty() || totalizer.is_empty() {
            continue;
        }

        let ts = parse_local(date, clock, offset)
            .map_err(|e| AnalyticsError::InputShape(format!("flow line {line}: {e}")))?;
        let value = parse_number(totalizer).ok_or_else(|| {
            AnalyticsError::InputShape(format!("flow line {line}: invalid totalizer '{totalizer}'"))
        })?;
        samples.push((ts, value));
    }

    metrics::counter!("source_flow_rows_total").increment(samples.len() as u64);
    tracing::info!(blocks, rows = samples.len(), "flow blocks parsed");

    Ok(FlowSeries::from_totalizer(samples)?)
}

pub fn load_flow_csv<P: AsRef<Path>>(
    path: P,
    offset: UtcOffset,
) -> Result<FlowSeries, AnalyticsError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        AnalyticsError::Source(format!("failed to open flow file {}: {e}", path.display()))
    })?;
    read_flow_blocks(bytes.as_slice(), offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    const EXPORT: &str = "\
Water Flow Report,,
Date,Time,Totalizer
01/03/2024,00:00,\"1,000\"
01/03/2024,00:05,\"1,005\"
,,
Date,Time,Totalizer (KL)
01/03/2024,00:10,1003
01/03/2024,00:05,1005
01/03/2024,00:15,1010
01/03/2024,,
";

    #[test]
    fn blocks_are_concatenated_and_deduplicated() {
        let flow = read_flow_blocks(EXPORT.as_bytes(), offset!(+05:30)).unwrap();

        assert_eq!(flow.len(), 4);
        assert_eq!(flow.first_timestamp(), Some(datetime!(2024-03-01 00:00:00 +05:30)));
        let consumption: Vec<Option<f64>> = flow.iter().map(|r| r.consumption).collect();
        assert_eq!(consumption, vec![None, Some(5.0), Some(0.0), Some(7.0)]);
    }

    #[test]
    fn rows_before_any_header_are_ignored() {
        let text = "01/03/2024,00:00,5\nDate,Time,Totalizer\n01/03/2024,00:05,6\n";
        let flow = read_flow_blocks(text.as_bytes(), offset!(+05:30)).unwrap();
        assert_eq!(flow.len(), 1);
    }

    #[test]
    fn unparseable_timestamp_is_an_input_shape_error() {
        let text = "Date,Time,Totalizer\n01/03/2024,00:00,5\n99/99/2024,00:05,6\n";
        let err = read_flow_blocks(text.as_bytes(), offset!(+05:30)).unwrap_err();
        match err {
            AnalyticsError::InputShape(msg) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_totalizer_is_an_input_shape_error() {
        let text = "Date,Time,Totalizer\n01/03/2024,00:00,abc\n";
        let err = read_flow_blocks(text.as_bytes(), offset!(+05:30)).unwrap_err();
        assert!(matches!(err, AnalyticsError::InputShape(_)));
    }

    #[test]
    fn file_without_blocks_is_empty() {
        let flow = read_flow_blocks("nothing,here\n".as_bytes(), offset!(+05:30)).unwrap();
        assert!(flow.is_empty());
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let err = load_flow_csv("/nonexistent/flow.csv", offset!(+05:30)).unwrap_err();
        assert!(matches!(err, AnalyticsError::Source(_)));
    }
}
