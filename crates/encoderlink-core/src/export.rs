//! Series export
//!
//! Writes derived series (or the raw capture) to disk for plotting tools.
//! CSV rows follow the sample index; the velocity columns of row `i` hold the
//! interval from sample `i` to `i + 1` and are blank on the last row. JSON
//! export is the serde form of [`DerivedSeries`], where non-finite velocities
//! become `null`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::kinematics::DerivedSeries;
use crate::protocol::RawSample;

/// Errors writing an export file
#[derive(Error, Debug)]
pub enum ExportError {
    /// Creating or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is neither `.csv` nor `.json`
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values
    Csv,
    /// Pretty-printed JSON
    Json,
}

impl ExportFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

fn optional(value: Option<&f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

/// Write derived series as CSV
pub fn write_series_csv<W: Write>(mut writer: W, series: &DerivedSeries) -> std::io::Result<()> {
    writeln!(
        writer,
        "time_s,position_a_deg,position_b_deg,velocity_a_deg_s,velocity_b_deg_s"
    )?;

    let a = &series.channel_a;
    let b = &series.channel_b;
    for (i, t) in series.time_seconds.iter().enumerate() {
        writeln!(
            writer,
            "{:.6},{:.6},{:.6},{},{}",
            t,
            a.position_degrees[i],
            b.position_degrees[i],
            optional(a.velocity_degrees_per_second.get(i)),
            optional(b.velocity_degrees_per_second.get(i)),
        )?;
    }

    writer.flush()
}

/// Write raw samples as CSV
pub fn write_samples_csv<W: Write>(mut writer: W, samples: &[RawSample]) -> std::io::Result<()> {
    writeln!(writer, "position_a,position_b,timestamp_us")?;
    for s in samples {
        writeln!(writer, "{},{},{}", s.position_a, s.position_b, s.timestamp)?;
    }
    writer.flush()
}

/// Export derived series, picking the format from the file extension
pub fn export_series<P: AsRef<Path>>(path: P, series: &DerivedSeries) -> Result<(), ExportError> {
    let path = path.as_ref();
    let format = ExportFormat::from_extension(path)
        .ok_or_else(|| ExportError::UnsupportedFormat(path.display().to_string()))?;

    let writer = BufWriter::new(File::create(path)?);
    match format {
        ExportFormat::Csv => write_series_csv(writer, series)?,
        ExportFormat::Json => serde_json::to_writer_pretty(writer, series)?,
    }
    Ok(())
}

/// Export raw samples to a CSV file
pub fn export_samples<P: AsRef<Path>>(path: P, samples: &[RawSample]) -> Result<(), ExportError> {
    let writer = BufWriter::new(File::create(path)?);
    write_samples_csv(writer, samples)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::derive;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ExportFormat::from_extension(Path::new("run.CSV")),
            Some(ExportFormat::Csv)
        );
        assert_eq!(
            ExportFormat::from_extension(Path::new("run.json")),
            Some(ExportFormat::Json)
        );
        assert_eq!(ExportFormat::from_extension(Path::new("run.txt")), None);
    }

    #[test]
    fn test_series_csv_rows() {
        let samples = [RawSample::new(0, 0, 0), RawSample::new(2000, 1000, 500_000)];
        let series = derive(&samples, 8000).unwrap();

        let mut out = Vec::new();
        write_series_csv(&mut out, &series).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "0.000000,0.000000,0.000000,180.000000,90.000000"
        );
        assert_eq!(lines[2], "0.500000,90.000000,45.000000,,");
    }

    #[test]
    fn test_samples_csv() {
        let mut out = Vec::new();
        write_samples_csv(&mut out, &[RawSample::new(1, 2, 3)]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "position_a,position_b,timestamp_us\n1,2,3\n"
        );
    }
}
