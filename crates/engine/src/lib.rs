pub mod attribute;
pub mod currency;
pub mod errors;
pub mod factor;
pub mod filter;
pub mod pipeline;
pub mod theme;

pub use attribute::{FlowKey, FlowRecord, TransactionRow};
pub use currency::{CurrencyError, RateTable, UsdConverter};
pub use errors::{EngineError, ErrorsOnExit};
pub use factor::{CategorizedTotals, NetFactors};
pub use filter::{ActivityScreen, InclusionFilter, SkipRules, ValuedTransaction};
pub use pipeline::{FallbackCodes, Pipeline, ReportingOrgRow, RunOutput};
pub use theme::Theme;
