//! Data ingestion, reshaping and external series.

pub mod aggregate;
pub mod align;
pub mod cache;
pub mod circuit_breaker;
pub mod codes;
pub mod comtrade;
pub mod decode;
pub mod error;
pub mod external;
pub mod frame;
pub mod frankfurter;
pub mod fred;
pub mod http;
pub mod indicators;
pub mod provider;
pub mod schema;

pub use aggregate::{aggregate_records, aggregate_trade_file, Aggregated, RowIssues, DEFAULT_MIN_PRODUCTS};
pub use align::{align_series, resample_month_end, MonthlySeries, MonthlyTable};
pub use cache::{Coverage, SeriesCache, SeriesCacheMeta};
pub use circuit_breaker::CircuitBreaker;
pub use codes::ProductNames;
pub use comtrade::{discover_groups, merge_group, normalize_file, ComtradeGroup, MergedGroup};
pub use decode::{read_table, DecodedTable, TextEncoding};
pub use error::DataError;
pub use external::{fetch_monthly, merge_external, ExternalFetch};
pub use frankfurter::FrankfurterSource;
pub use fred::{default_commodity_series, FredSeries, FredSource};
pub use http::JsonClient;
pub use indicators::{IndicatorFilter, IndicatorFrames};
pub use provider::{SeriesFailure, SeriesSource, SourceFetch};
pub use schema::TradeSchema;
