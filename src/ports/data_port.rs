//! Data access port trait.

use crate::domain::error::MinecastError;
use crate::domain::hhi::PoolShareRecord;
use crate::domain::revenue::FeeDenomination;
use crate::domain::series::RawRecord;

/// Chain-level records read from one source, with the cells that did not
/// become records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestBatch {
    pub records: Vec<RawRecord>,
    /// Cells present but not parseable as a finite number.
    pub rejected: usize,
    /// Empty cells in recognised metric columns.
    pub blank: usize,
    /// Unit of the `fees` records, when the source has a fee column.
    pub fee_denomination: Option<FeeDenomination>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolShareBatch {
    pub records: Vec<PoolShareRecord>,
    pub rejected: usize,
}

pub trait DataPort {
    fn fetch_chain_records(&self, source: &str) -> Result<IngestBatch, MinecastError>;

    fn fetch_pool_shares(&self) -> Result<PoolShareBatch, MinecastError>;

    /// Names of the chain sources available to `fetch_chain_records`.
    fn list_sources(&self) -> Result<Vec<String>, MinecastError>;
}
