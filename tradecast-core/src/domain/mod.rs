//! Domain types shared by every pipeline stage.

pub mod flow;
pub mod period;
pub mod record;

pub use flow::{TradeFlow, UnknownFlow};
pub use period::{MonthRange, Period, PeriodError};
pub use record::{coarse_product_code, TradeRecord, COARSE_CODE_LEN};
