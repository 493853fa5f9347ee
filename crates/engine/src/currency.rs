use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use aidflow_core::parse_date_loose;

#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("no exchange rate for currency {0}")]
    UnknownCurrency(String),
    #[error("failed to read rates file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rates file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("failed to parse fallback rates {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("bad rate row in {path}: {detail}")]
    BadRow { path: String, detail: String },
}

/// Converts an amount in a source currency on a given date to USD.
pub trait UsdConverter {
    fn to_usd(&self, amount: f64, currency: &str, date: NaiveDate) -> Result<f64, CurrencyError>;
}

#[derive(Debug, Deserialize)]
struct RateRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "Rate")]
    rate: f64,
}

#[derive(Debug, Deserialize)]
struct FallbackRates {
    rates: BTreeMap<String, f64>,
}

/// Historic exchange rates with a static fallback table.
///
/// Rates are expressed as units of the currency per USD. Historic lookup
/// picks the rate whose date is closest to the requested date; a currency
/// absent from the historic series falls back to the static table, and a
/// currency absent from both is a conversion error.
#[derive(Debug, Default)]
pub struct RateTable {
    historic: BTreeMap<String, Vec<(NaiveDate, f64)>>,
    fallback: BTreeMap<String, f64>,
}

impl RateTable {
    pub fn new(
        mut historic: BTreeMap<String, Vec<(NaiveDate, f64)>>,
        fallback: BTreeMap<String, f64>,
    ) -> Self {
        for series in historic.values_mut() {
            series.sort_by_key(|(date, _)| *date);
        }
        RateTable { historic, fallback }
    }

    /// Static rates only; used for tests and as a degraded mode when no
    /// historic series is available.
    pub fn with_static(fallback: BTreeMap<String, f64>) -> Self {
        RateTable {
            historic: BTreeMap::new(),
            fallback,
        }
    }

    /// Load the historic series from a CSV file (`Date,Currency,Rate`) and
    /// the static table from a JSON file (`{"rates": {"EUR": 0.9, ...}}`).
    pub fn from_files(rates_path: &Path, fallback_path: &Path) -> Result<Self, CurrencyError> {
        let mut historic: BTreeMap<String, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        let mut reader =
            csv::Reader::from_path(rates_path).map_err(|source| CurrencyError::Csv {
                path: rates_path.display().to_string(),
                source,
            })?;
        for result in reader.deserialize() {
            let row: RateRow = result.map_err(|source| CurrencyError::Csv {
                path: rates_path.display().to_string(),
                source,
            })?;
            let date = parse_date_loose(&row.date).ok_or_else(|| CurrencyError::BadRow {
                path: rates_path.display().to_string(),
                detail: format!("unparseable date {}", row.date),
            })?;
            historic
                .entry(row.currency.trim().to_uppercase())
                .or_default()
                .push((date, row.rate));
        }

        let text =
            std::fs::read_to_string(fallback_path).map_err(|source| CurrencyError::Io {
                path: fallback_path.display().to_string(),
                source,
            })?;
        let fallback: FallbackRates =
            serde_json::from_str(&text).map_err(|source| CurrencyError::Json {
                path: fallback_path.display().to_string(),
                source,
            })?;

        Ok(RateTable::new(historic, fallback.rates))
    }

    fn closest_rate(&self, currency: &str, date: NaiveDate) -> Option<f64> {
        let series = self.historic.get(currency)?;
        let idx = series.partition_point(|(d, _)| *d <= date);
        let before = idx.checked_sub(1).map(|i| series[i]);
        let after = series.get(idx).copied();
        match (before, after) {
            (Some((d1, r1)), Some((d2, r2))) => {
                if (date - d1) <= (d2 - date) {
                    Some(r1)
                } else {
                    Some(r2)
                }
            }
            (Some((_, rate)), None) | (None, Some((_, rate))) => Some(rate),
            (None, None) => None,
        }
    }
}

impl UsdConverter for RateTable {
    fn to_usd(&self, amount: f64, currency: &str, date: NaiveDate) -> Result<f64, CurrencyError> {
        let currency = currency.trim().to_uppercase();
        if amount == 0.0 || currency == "USD" {
            return Ok(amount);
        }
        let rate = self
            .closest_rate(&currency, date)
            .or_else(|| self.fallback.get(&currency).copied())
            .ok_or_else(|| CurrencyError::UnknownCurrency(currency.clone()))?;
        Ok(amount / rate)
    }
}
