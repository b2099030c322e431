//! CSV report adapter: one `date,metric,value,lower,upper` row per record.

use crate::domain::error::MinecastError;
use crate::domain::table::TableRecord;
use crate::ports::report_port::ReportPort;
use std::path::Path;

pub struct CsvReportAdapter;

impl ReportPort for CsvReportAdapter {
    fn write(&self, records: &[TableRecord], output_path: &Path) -> Result<(), MinecastError> {
        let io_error = |e: csv::Error| MinecastError::Data {
            reason: format!("failed to write {}: {}", output_path.display(), e),
        };

        let mut writer = csv::Writer::from_path(output_path).map_err(io_error)?;
        for record in records {
            writer.serialize(record).map_err(io_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}
