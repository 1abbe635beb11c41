//! Project configuration: resources, field mapping and country names.
//!
//! ```yaml
//! latest_year: 2023
//! annual_report: true
//! countries: countries.csv        # iso3,name; relative to this file
//! resources:
//!   end_year_population_totals:
//!     file: HDX_EndYearPopulationTotals.csv
//!     originating:
//!       title: End-year stock population figures originating from {countryname}
//!       description: ...
//!     residing:
//!       title: End-year stock population figures residing in {countryname}
//!       description: ...
//! fields:
//!   ISO3CoO:
//!     name: Country of Origin Code
//!     tags: '#country+code+origin'
//! ```

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{aggregate::Direction, country::CountryTable, fields::FieldSchema, quickchart};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceText {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating: Option<ResourceText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residing: Option<ResourceText>,
}

impl ResourceConfig {
    pub fn text(&self, direction: Direction) -> Option<&ResourceText> {
        match direction {
            Direction::Originating => self.originating.as_ref(),
            Direction::Residing => self.residing.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub resources: IndexMap<String, ResourceConfig>,
    #[serde(default)]
    pub fields: FieldSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub country_names: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_year: Option<i32>,
    #[serde(default = "Configuration::default_annual_report")]
    pub annual_report: bool,
    #[serde(default = "Configuration::default_quick_chart_years")]
    pub quick_chart_years: usize,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Configuration {
    pub const fn default_annual_report() -> bool {
        true
    }

    pub const fn default_quick_chart_years() -> usize {
        quickchart::DEFAULT_YEARS
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context("Parsing configuration YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening configuration {path:?}"))?;
        let reader = BufReader::new(file);
        let mut config: Configuration = serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing configuration {path:?}"))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn field_schema(&self) -> Arc<FieldSchema> {
        Arc::new(self.fields.clone())
    }

    /// Country table from the `countries` file, overlaid with `country_names`.
    pub fn country_table(&self) -> Result<CountryTable> {
        let mut table = match &self.countries {
            Some(path) => {
                let resolved = if path.is_absolute() {
                    path.clone()
                } else {
                    self.base_dir.join(path)
                };
                CountryTable::load(&resolved)
                    .with_context(|| format!("Loading country names from {resolved:?}"))?
            }
            None => CountryTable::default(),
        };
        for (code, name) in &self.country_names {
            table.insert(code, name);
        }
        Ok(table)
    }
}
