use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read lookup table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse lookup table {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// How sector codes map to display names.
#[derive(Debug, Clone)]
pub enum SectorTable {
    /// Group name keyed by the 3-digit DAC prefix of a 3- or 5-digit code.
    Grouped(BTreeMap<String, String>),
    /// Direct name keyed by the full 5-digit code (food-security themes).
    Flat(BTreeMap<String, String>),
}

/// Display-name lookup tables, loaded once per run. An explicit context
/// object rather than process-wide state so registration and lookup order
/// stay testable.
#[derive(Debug, Clone)]
pub struct NameTables {
    sectors: SectorTable,
    countries: BTreeMap<String, String>,
    regions: BTreeMap<String, String>,
    default_sector: String,
    default_country: String,
}

fn load_map(path: &Path) -> Result<BTreeMap<String, String>, TableError> {
    let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| TableError::Parse {
        path: path.display().to_string(),
        source,
    })
}

impl NameTables {
    pub fn new(
        sectors: SectorTable,
        countries: BTreeMap<String, String>,
        regions: BTreeMap<String, String>,
        default_sector: &str,
        default_country: &str,
    ) -> Self {
        NameTables {
            sectors,
            countries,
            regions,
            default_sector: default_sector.to_string(),
            default_country: default_country.to_string(),
        }
    }

    /// Load all three tables from JSON files (`{"code": "name", ...}`).
    /// Missing or malformed files are fatal configuration errors.
    pub fn from_files(
        sector_path: &Path,
        country_path: &Path,
        region_path: &Path,
        flat_sectors: bool,
        default_sector: &str,
        default_country: &str,
    ) -> Result<Self, TableError> {
        let sector_map = load_map(sector_path)?;
        let sectors = if flat_sectors {
            SectorTable::Flat(sector_map)
        } else {
            SectorTable::Grouped(sector_map)
        };
        Ok(NameTables::new(
            sectors,
            load_map(country_path)?,
            load_map(region_path)?,
            default_sector,
            default_country,
        ))
    }

    /// Group name for a 3- or 5-digit sector code.
    pub fn sector_group_name(&self, code: &str) -> String {
        match &self.sectors {
            SectorTable::Grouped(groups) => {
                // Byte slicing would panic on a multibyte code; such codes
                // simply fail the lookup.
                let prefix = code.get(..3).unwrap_or(code);
                groups
                    .get(prefix)
                    .cloned()
                    .unwrap_or_else(|| self.default_sector.clone())
            }
            SectorTable::Flat(names) => names
                .get(code)
                .cloned()
                .unwrap_or_else(|| self.default_sector.clone()),
        }
    }

    /// Display name for an ISO2 country code or, failing that, a region
    /// code (countries and regions share the split-map namespace).
    pub fn country_or_region_name(&self, code: &str) -> String {
        self.countries
            .get(code)
            .or_else(|| self.regions.get(code))
            .cloned()
            .unwrap_or_else(|| self.default_country.clone())
    }
}
