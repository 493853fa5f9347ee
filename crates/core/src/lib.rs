pub mod codes;
pub mod identity;
pub mod names;
pub mod period;
pub mod record;
pub mod splits;

pub use codes::{Classification, Direction, TransactionKind};
pub use identity::{OrgIdentity, OrgRegistry};
pub use names::{NameTables, SectorTable, TableError};
pub use period::{date_with_fallback, parse_date_loose, DateRange, Month};
pub use record::{ActivityRecord, CodedItem, Narrative, OrgRef, TransactionRecord};
pub use splits::{country_or_region_splits, sector_splits, SplitMap};
