pub mod flow_blocks;
pub mod quality_blocks;
mod timestamp;

pub use flow_blocks::{load_flow_csv, read_flow_blocks};
pub use quality_blocks::{load_quality_csv, read_quality_blocks};
pub use timestamp::parse_local;

/// Parse a numeric cell, tolerating thousands separators.
fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn csv_reader<R: std::io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}
