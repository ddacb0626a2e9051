//! Fixed-width record log.
//!
//! One header line, then one line per detection in session order:
//! the class name in a 20-column field followed by the timestamp.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::record::DetectionRecord;

pub const CLASS_COLUMN_WIDTH: usize = 20;

/// Class name padded with spaces (or cut) to exactly `CLASS_COLUMN_WIDTH` characters.
pub fn class_column(class_name: &str) -> String {
    let cut: String = class_name.chars().take(CLASS_COLUMN_WIDTH).collect();
    format!("{:<width$}", cut, width = CLASS_COLUMN_WIDTH)
}

pub fn header_line() -> String {
    format!("{}timestamp", class_column("class_name"))
}

pub fn record_line(record: &DetectionRecord) -> String {
    format!("{}{}", class_column(&record.class_name), record.timestamp)
}

pub fn write_records<W: Write>(mut writer: W, records: &[DetectionRecord]) -> Result<()> {
    writeln!(writer, "{}", header_line())?;
    for record in records {
        writeln!(writer, "{}", record_line(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the log to `path`, replacing any previous file.
pub fn export_records(path: &Path, records: &[DetectionRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create record log {}", path.display()))?;
    write_records(BufWriter::new(file), records)
        .with_context(|| format!("failed to write record log {}", path.display()))?;
    log::info!("record log: {} rows written to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BoundingBox, Timestamp};
    use chrono::NaiveDate;

    fn record(class_name: &str, second: u32) -> DetectionRecord {
        let at = NaiveDate::from_ymd_opt(2025, 2, 1)
            .unwrap()
            .and_hms_opt(9, 30, second)
            .unwrap();
        DetectionRecord::new(
            class_name,
            Timestamp::new(at),
            BoundingBox::new(0, 0, 1, 1),
            None,
            0,
        )
    }

    #[test]
    fn writes_header_and_fixed_width_rows() -> Result<()> {
        let mut out = Vec::new();
        write_records(&mut out, &[record("car", 1), record("traffic light", 2)])?;
        let text = String::from_utf8(out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "class_name          timestamp",
                "car                 2025-02-01 09:30:01",
                "traffic light       2025-02-01 09:30:02",
            ]
        );
        Ok(())
    }

    #[test]
    fn long_class_names_are_cut_to_the_column() {
        let line = record_line(&record("an-extremely-long-class-name", 0));
        assert_eq!(line, "an-extremely-long-cl2025-02-01 09:30:00");
        assert_eq!(class_column("bus").len(), CLASS_COLUMN_WIDTH);
    }

    #[test]
    fn empty_session_still_has_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("detections.csv");
        export_records(&path, &[])?;
        assert_eq!(std::fs::read_to_string(&path)?, "class_name          timestamp\n");
        Ok(())
    }
}
