pub mod csv_artifacts;

pub use csv_artifacts::CsvArtifactSink;
