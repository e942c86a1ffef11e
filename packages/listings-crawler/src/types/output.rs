//! Records written to the output sink.

use serde::{Deserialize, Serialize};

use super::listing::ListingRecord;
use super::work::FailedWorkRecord;

/// Everything the sink receives. Consumers filter on `recordType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recordType", rename_all = "camelCase")]
pub enum OutputRecord {
    Listing(Box<ListingRecord>),
    FailedWork(Box<FailedWorkRecord>),
}

impl OutputRecord {
    pub fn as_listing(&self) -> Option<&ListingRecord> {
        match self {
            OutputRecord::Listing(listing) => Some(listing),
            OutputRecord::FailedWork(_) => None,
        }
    }

    pub fn as_failed(&self) -> Option<&FailedWorkRecord> {
        match self {
            OutputRecord::FailedWork(failed) => Some(failed),
            OutputRecord::Listing(_) => None,
        }
    }
}

impl From<ListingRecord> for OutputRecord {
    fn from(record: ListingRecord) -> Self {
        OutputRecord::Listing(Box::new(record))
    }
}

impl From<FailedWorkRecord> for OutputRecord {
    fn from(record: FailedWorkRecord) -> Self {
        OutputRecord::FailedWork(Box::new(record))
    }
}
