use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    analytics::{HourDowHeatmap, Table, TableRow},
    error::AnalyticsError,
};

/// Writes result tables as CSV files under one output directory.
///
/// Every file starts with the table's column header, so an empty table still
/// produces a schema-carrying artifact.
pub struct CsvArtifactSink {
    dir: PathBuf,
}

fn sink_err(context: &str, e: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::Sink(format!("{context}: {e}"))
}

impl CsvArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AnalyticsError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| sink_err(&format!("failed to create {}", dir.display()), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create(&self, name: &str) -> Result<(PathBuf, File), AnalyticsError> {
        let path = self.dir.join(format!("{name}.csv"));
        let file = File::create(&path)
            .map_err(|e| sink_err(&format!("failed to create {}", path.display()), e))?;
        Ok((path, file))
    }

    pub fn write_table<R: TableRow>(
        &self,
        name: &str,
        table: &Table<R>,
    ) -> Result<PathBuf, AnalyticsError> {
        let (path, file) = self.create(name)?;
        write_table_to(file, table)?;

        metrics::counter!("artifact_rows_written_total").increment(table.len() as u64);
        tracing::info!(
            artifact = name,
            rows = table.len(),
            path = %path.display(),
            "artifact written"
        );
        Ok(path)
    }

    /// The heatmap as a 7x24 grid: one row per weekday, Monday first.
    pub fn write_heatmap(
        &self,
        name: &str,
        heatmap: &HourDowHeatmap,
    ) -> Result<PathBuf, AnalyticsError> {
        let (path, file) = self.create(name)?;
        write_heatmap_to(file, heatmap)?;

        metrics::counter!("artifact_rows_written_total").increment(7);
        tracing::info!(
            artifact = name,
            cells = heatmap.populated_cells(),
            path = %path.display(),
            "artifact written"
        );
        Ok(path)
    }
}

pub fn write_table_to<W: Write, R: TableRow>(
    writer: W,
    table: &Table<R>,
) -> Result<(), AnalyticsError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(R::COLUMNS).map_err(|e| sink_err("failed to write header", e))?;
    for row in table.iter() {
        wtr.serialize(row).map_err(|e| sink_err("failed to write row", e))?;
    }
    wtr.flush().map_err(|e| sink_err("failed to flush", e))
}

pub fn write_heatmap_to<W: Write>(
    writer: W,
    heatmap: &HourDowHeatmap,
) -> Result<(), AnalyticsError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["dow".to_string()];
    header.extend((0..24).map(|h| format!("h{h:02}")));
    wtr.write_record(&header).map_err(|e| sink_err("failed to write header", e))?;

    for (weekday, cells) in heatmap.rows() {
        let mut record = vec![weekday.to_string()];
        record.extend(cells.iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()));
        wtr.write_record(&record).map_err(|e| sink_err("failed to write row", e))?;
    }
    wtr.flush().map_err(|e| sink_err("failed to flush", e))
}
