use crate::domain::TradeRecord;
use polars::prelude::*;

pub const PERIOD: &str = "period";
pub const TRADE_FLOW: &str = "trade_flow";
pub const REPORTER_ID: &str = "reporter_id";
pub const COUNTRY_ID: &str = "country_id";
pub const COUNTRY_NAME: &str = "country_name";
pub const PRODUCT_CODE: &str = "product_code";
pub const TRADE_VALUE: &str = "trade_value";
pub const QUANTITY: &str = "quantity";
pub const DISTINCT_PRODUCT_COUNT: &str = "distinct_product_count";
pub const PRODUCT_NAME: &str = "product_name";

/// Keys that identify one aggregated trade row.
pub const ROW_KEY: [&str; 5] = [PERIOD, TRADE_FLOW, REPORTER_ID, COUNTRY_ID, PRODUCT_CODE];

/// Group over which distinct products are counted for qualification.
pub const QUALIFICATION_KEY: [&str; 3] = [REPORTER_ID, PERIOD, COUNTRY_ID];

/// Canonical schema shared by aggregated trade tables and normalized
/// comtrade tables.
pub struct TradeSchema;

impl TradeSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(PERIOD.into(), DataType::Int64),
            Field::new(TRADE_FLOW.into(), DataType::String),
            Field::new(REPORTER_ID.into(), DataType::String),
            Field::new(COUNTRY_ID.into(), DataType::String),
            Field::new(COUNTRY_NAME.into(), DataType::String),
            Field::new(PRODUCT_CODE.into(), DataType::String),
            Field::new(TRADE_VALUE.into(), DataType::Float64),
            Field::new(QUANTITY.into(), DataType::Float64),
            Field::new(DISTINCT_PRODUCT_COUNT.into(), DataType::UInt32),
            Field::new(PRODUCT_NAME.into(), DataType::String),
        ])
    }

    /// Column names in output order.
    pub fn columns() -> Vec<&'static str> {
        vec![
            PERIOD,
            TRADE_FLOW,
            REPORTER_ID,
            COUNTRY_ID,
            COUNTRY_NAME,
            PRODUCT_CODE,
            TRADE_VALUE,
            QUANTITY,
            DISTINCT_PRODUCT_COUNT,
            PRODUCT_NAME,
        ]
    }

    /// Validate a DataFrame against the canonical schema. Extra columns
    /// (joined external series, indicators) are allowed.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }

    /// Build the pre-aggregation frame (no count column) from typed records.
    pub fn records_to_frame(records: &[TradeRecord]) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Column::new(
                PERIOD.into(),
                records.iter().map(|r| r.period.month_id()).collect::<Vec<i64>>(),
            ),
            Column::new(
                TRADE_FLOW.into(),
                records.iter().map(|r| r.flow.as_str()).collect::<Vec<&str>>(),
            ),
            Column::new(
                REPORTER_ID.into(),
                records.iter().map(|r| r.reporter_id.as_str()).collect::<Vec<&str>>(),
            ),
            Column::new(
                COUNTRY_ID.into(),
                records.iter().map(|r| r.country_id.as_str()).collect::<Vec<&str>>(),
            ),
            Column::new(
                COUNTRY_NAME.into(),
                records
                    .iter()
                    .map(|r| r.country_name.as_deref())
                    .collect::<Vec<Option<&str>>>(),
            ),
            Column::new(
                PRODUCT_CODE.into(),
                records.iter().map(|r| r.product_code.as_str()).collect::<Vec<&str>>(),
            ),
            Column::new(
                TRADE_VALUE.into(),
                records.iter().map(|r| r.trade_value).collect::<Vec<f64>>(),
            ),
            Column::new(
                QUANTITY.into(),
                records.iter().map(|r| r.quantity).collect::<Vec<Option<f64>>>(),
            ),
        ])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
