use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use aidflow_core::{parse_date_loose, DateRange};
use aidflow_engine::SkipRules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("unparseable date in config: {0}")]
    BadDate(String),
}

/// Paths to the lookup tables and exchange-rate files.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub sectors: PathBuf,
    pub countries: PathBuf,
    pub regions: PathBuf,
    pub rates: PathBuf,
    pub fallback_rates: PathBuf,
}

/// One output artifact: file name plus its header and HXL-tag rows.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSpec {
    pub filename: String,
    pub headers: Vec<String>,
    pub hxl_tags: Vec<String>,
}

fn default_transactions_spec() -> OutputSpec {
    OutputSpec {
        filename: "transactions.csv".to_string(),
        headers: [
            "Month",
            "Reporting org id",
            "Reporting org",
            "Reporting org type",
            "Sector",
            "Country",
            "Is humanitarian",
            "Is strict",
            "Transaction type",
            "Activity id",
            "Net money",
            "Total money",
        ]
        .map(String::from)
        .to_vec(),
        hxl_tags: [
            "#date+month",
            "#org+id+reporting",
            "#org+name+reporting",
            "#org+type+reporting",
            "#sector",
            "#country",
            "#indicator+humanitarian",
            "#indicator+strict",
            "#x_transaction_type",
            "#activity+code",
            "#value+net",
            "#value+total",
        ]
        .map(String::from)
        .to_vec(),
    }
}

fn default_flows_spec() -> OutputSpec {
    OutputSpec {
        filename: "flows.csv".to_string(),
        headers: [
            "Reporting org id",
            "Reporting org",
            "Reporting org type",
            "Provider org id",
            "Provider org",
            "Provider org type",
            "Receiver org id",
            "Receiver org",
            "Receiver org type",
            "Is humanitarian",
            "Is strict",
            "Direction",
            "Total money",
        ]
        .map(String::from)
        .to_vec(),
        hxl_tags: [
            "#org+id+reporting",
            "#org+name+reporting",
            "#org+type+reporting",
            "#org+id+provider",
            "#org+name+provider",
            "#org+type+provider",
            "#org+id+receiver",
            "#org+name+receiver",
            "#org+type+receiver",
            "#indicator+humanitarian",
            "#indicator+strict",
            "#x_direction",
            "#value+total",
        ]
        .map(String::from)
        .to_vec(),
    }
}

fn default_reporting_orgs_spec() -> OutputSpec {
    OutputSpec {
        filename: "reporting_orgs.csv".to_string(),
        headers: ["Org id", "Org name"].map(String::from).to_vec(),
        hxl_tags: ["#org+id", "#org+name"].map(String::from).to_vec(),
    }
}

fn default_json_filename() -> String {
    "aidflow.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outputs {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_transactions_spec")]
    pub transactions: OutputSpec,
    #[serde(default = "default_flows_spec")]
    pub flows: OutputSpec,
    #[serde(default = "default_reporting_orgs_spec")]
    pub reporting_orgs: OutputSpec,
    #[serde(default = "default_json_filename")]
    pub json: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for Outputs {
    fn default() -> Self {
        Outputs {
            dir: default_output_dir(),
            transactions: default_transactions_spec(),
            flows: default_flows_spec(),
            reporting_orgs: default_reporting_orgs_spec(),
            json: default_json_filename(),
        }
    }
}

fn default_org() -> String {
    "(Unspecified org)".to_string()
}

fn default_sector() -> String {
    "(Unspecified sector)".to_string()
}

fn default_country() -> String {
    "(Unspecified country)".to_string()
}

fn default_fallback_country_code() -> String {
    "XX".to_string()
}

fn default_fallback_sector_code() -> String {
    "99999".to_string()
}

fn default_usd_error_threshold() -> f64 {
    3_000_000_000.0
}

/// Theme relevance overrides, for themes tuned via configuration rather
/// than built-in predicates (food security in particular).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeOverrides {
    pub excluded_aid_types: Option<BTreeSet<String>>,
    pub relevant_countries: Option<BTreeSet<String>>,
    pub relevant_sectors: Option<BTreeMap<String, BTreeSet<String>>>,
    pub relevant_words: Option<Vec<String>>,
}

/// The full run configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub theme: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_org")]
    pub default_org: String,
    #[serde(default = "default_sector")]
    pub default_sector: String,
    #[serde(default = "default_country")]
    pub default_country: String,
    #[serde(default = "default_fallback_country_code")]
    pub fallback_country_code: String,
    #[serde(default = "default_fallback_sector_code")]
    pub fallback_sector_code: String,
    #[serde(default = "default_usd_error_threshold")]
    pub usd_error_threshold: f64,
    /// Org refs known to be misreported, trusted only for reporting orgs.
    #[serde(default)]
    pub spurious_refs: Vec<String>,
    #[serde(default)]
    pub skip_activity_ids: Vec<String>,
    #[serde(default)]
    pub skip_reporting_org_refs: Vec<String>,
    #[serde(default)]
    pub skip_reporting_org_children: BTreeMap<String, i32>,
    #[serde(default)]
    pub allow_activity_ids: Vec<String>,
    #[serde(default)]
    pub theme_overrides: ThemeOverrides,
    pub paths: DataPaths,
    #[serde(default)]
    pub output: Outputs,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<RunConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The analysis window. An absent start date leaves the window open at
    /// the beginning; an absent end date closes it at today.
    pub fn date_range(&self, today: NaiveDate) -> Result<DateRange, ConfigError> {
        let start = match &self.start_date {
            Some(s) => Some(parse_date_loose(s).ok_or_else(|| ConfigError::BadDate(s.clone()))?),
            None => None,
        };
        let end = match &self.end_date {
            Some(s) => parse_date_loose(s).ok_or_else(|| ConfigError::BadDate(s.clone()))?,
            None => today,
        };
        Ok(DateRange::new(start, end))
    }

    pub fn blocklist(&self) -> BTreeSet<String> {
        self.spurious_refs
            .iter()
            .map(|r| r.trim().to_lowercase())
            .collect()
    }

    pub fn skip_rules(&self) -> SkipRules {
        SkipRules {
            activity_ids: self.skip_activity_ids.iter().cloned().collect(),
            reporting_org_refs: self
                .skip_reporting_org_refs
                .iter()
                .map(|r| r.trim().to_lowercase())
                .collect(),
            reporting_org_children: self
                .skip_reporting_org_children
                .iter()
                .map(|(r, depth)| (r.trim().to_lowercase(), *depth))
                .collect(),
            allow_activity_ids: self.allow_activity_ids.iter().cloned().collect(),
        }
    }
}
