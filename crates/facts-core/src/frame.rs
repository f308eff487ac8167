//! Conversion of fact records into `polars` frames.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::{
    error::{FactsError, Result},
    types::{CanonicalField, QuarterlyFactRecord},
};

/// Builds a frame with `ticker`, `period_end` and one nullable `f64` column
/// per requested field, one row per record in input order.
///
/// # Errors
///
/// Returns [`FactsError::Other`] if polars rejects the columns.
pub fn records_to_frame(
    records: &[QuarterlyFactRecord],
    fields: &[CanonicalField],
) -> Result<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| FactsError::Other("invalid epoch".to_string()))?;

    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let days: Vec<i32> = records
        .iter()
        .map(|r| (r.period_end - epoch).num_days() as i32)
        .collect();

    let period_col = Column::new("period_end".into(), days)
        .cast(&DataType::Date)
        .map_err(|e| FactsError::Other(e.to_string()))?;

    let mut columns = Vec::with_capacity(fields.len() + 2);
    columns.push(Column::new("ticker".into(), tickers));
    columns.push(period_col);
    for field in fields {
        let values: Vec<Option<f64>> = records.iter().map(|r| r.get(*field)).collect();
        columns.push(Column::new(field.as_str().into(), values));
    }

    DataFrame::new(columns).map_err(|e| FactsError::Other(e.to_string()))
}
