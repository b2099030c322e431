//! Report output port trait.

use crate::domain::error::MinecastError;
use crate::domain::table::TableRecord;
use std::path::Path;

pub trait ReportPort {
    fn write(&self, records: &[TableRecord], output_path: &Path) -> Result<(), MinecastError>;
}
