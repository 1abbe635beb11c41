//! Per-country bucketing of raw resource rows.
//!
//! Every row is filed under each country it concerns: by its country of
//! origin (`<resource>_originating`) and by its country of asylum
//! (`<resource>_residing`), and always under the synthetic [`WORLD`]
//! bucket. Both directions are kept for the world aggregate; choosing one
//! to avoid double counting is up to the exporter.
//!
//! At the same time one quick-chart row per `(year, origin, asylum)` is
//! accumulated, merging the directional population figures of every
//! resource that mentions the combination.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    country::{CountryLookup, resolve_country_name},
    data::{Row, Value, cell_display},
    stream::ListStream,
};

pub const WORLD: &str = "world";
pub const WORLD_NAME: &str = "World";

pub const YEAR_COLUMN: &str = "Year";
pub const ORIGIN_COLUMN: &str = "ISO3CoO";
pub const ASYLUM_COLUMN: &str = "ISO3CoA";
pub const ORIGIN_NAME_COLUMN: &str = "CoO_name";
pub const ASYLUM_NAME_COLUMN: &str = "CoA_name";

/// Population figures copied into quick-chart rows.
pub const QUICK_CHART_FIELDS: &[&str] = &[
    "Applications",
    "REF",
    "ASY",
    "OIP",
    "IDP",
    "STA",
    "OOC",
    "HST",
];

const NAME_COLUMN_POSITION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Originating,
    Residing,
}

impl Direction {
    pub fn for_column(column: &str) -> Option<Self> {
        match column {
            ORIGIN_COLUMN => Some(Direction::Originating),
            ASYLUM_COLUMN => Some(Direction::Residing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Originating => "originating",
            Direction::Residing => "residing",
        }
    }

    pub fn name_column(self) -> &'static str {
        match self {
            Direction::Originating => ORIGIN_NAME_COLUMN,
            Direction::Residing => ASYLUM_NAME_COLUMN,
        }
    }

    /// Splits `<resource-id>_<direction>` back into its parts.
    pub fn split_resource_name(resource_name: &str) -> Option<(&str, Self)> {
        let (id, direction) = resource_name.rsplit_once('_')?;
        match direction {
            "originating" => Some((id, Direction::Originating)),
            "residing" => Some((id, Direction::Residing)),
            _ => None,
        }
    }
}

pub fn resource_name(resource_id: &str, direction: Direction) -> String {
    format!("{resource_id}_{}", direction.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Country {
    pub iso3: String,
    #[serde(rename = "countryname")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuickChartKey {
    pub year: String,
    pub origin: String,
    pub asylum: String,
}

/// Country code -> resource name -> rows, in source order.
pub type CountryBuckets = IndexMap<String, IndexMap<String, Vec<Row>>>;

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    countries: BTreeSet<Country>,
    buckets: CountryBuckets,
    headers: IndexMap<String, Vec<String>>,
    quick_chart: IndexMap<QuickChartKey, Row>,
}

impl Aggregation {
    /// The world pseudo-country first, then every country seen, by code.
    pub fn countries(&self) -> Vec<Country> {
        let mut countries = Vec::with_capacity(self.countries.len() + 1);
        countries.push(Country {
            iso3: WORLD.to_string(),
            name: WORLD_NAME.to_string(),
        });
        countries.extend(self.countries.iter().cloned());
        countries
    }

    pub fn buckets(&self) -> &CountryBuckets {
        &self.buckets
    }

    pub fn country_data(&self, iso3: &str) -> Option<&IndexMap<String, Vec<Row>>> {
        self.buckets.get(iso3)
    }

    pub fn resource_headers(&self, resource_name: &str) -> Option<&[String]> {
        self.headers.get(resource_name).map(Vec::as_slice)
    }

    /// One bucket wrapped as a restartable stream.
    pub fn resource_stream(&self, iso3: &str, resource_name: &str) -> Option<ListStream> {
        let rows = self.buckets.get(iso3)?.get(resource_name)?;
        let headers = self.headers.get(resource_name)?;
        Some(ListStream::new(rows.clone(), headers.clone()))
    }

    pub fn quick_chart_rows(&self) -> impl Iterator<Item = (&QuickChartKey, &Row)> {
        self.quick_chart.iter()
    }

    pub fn quick_chart_len(&self) -> usize {
        self.quick_chart.len()
    }

    /// Quick-chart rows touching `iso3` as origin or asylum; all of them
    /// for the world pseudo-country.
    pub fn subset_quick_chart(&self, iso3: &str) -> Vec<Row> {
        let subset: Vec<Row> = self
            .quick_chart
            .iter()
            .filter(|(key, _)| iso3 == WORLD || key.origin == iso3 || key.asylum == iso3)
            .map(|(_, row)| row.clone())
            .collect();
        debug!("Quick chart subset for {iso3}: {} row(s)", subset.len());
        subset
    }

    #[cfg(test)]
    pub(crate) fn with_bucket(
        mut self,
        iso3: &str,
        resource_name: &str,
        headers: Vec<String>,
        rows: Vec<Row>,
    ) -> Self {
        self.buckets
            .entry(iso3.to_string())
            .or_default()
            .insert(resource_name.to_string(), rows);
        self.headers.insert(resource_name.to_string(), headers);
        self
    }
}

pub struct Aggregator<'a, L: CountryLookup + ?Sized> {
    lookup: &'a L,
    names: HashMap<String, String>,
    aggregation: Aggregation,
}

impl<'a, L: CountryLookup + ?Sized> Aggregator<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        let mut aggregation = Aggregation::default();
        aggregation
            .buckets
            .insert(WORLD.to_string(), IndexMap::new());
        Self {
            lookup,
            names: HashMap::new(),
            aggregation,
        }
    }

    fn country_name(&mut self, code: &str) -> String {
        if let Some(name) = self.names.get(code) {
            return name.clone();
        }
        let name = resolve_country_name(self.lookup, code);
        self.names.insert(code.to_string(), name.clone());
        name
    }

    /// Buckets the rows of one resource file. Returns the resource names
    /// (one per country column present) the rows were filed under.
    pub fn add_resource<I>(&mut self, resource_id: &str, headers: &[String], rows: I) -> Vec<String>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut country_columns: Vec<&str> = headers
            .iter()
            .map(String::as_str)
            .filter(|column| Direction::for_column(column).is_some())
            .collect();
        country_columns.sort_unstable();
        country_columns.dedup();
        if country_columns.is_empty() {
            warn!("Resource '{resource_id}' has no country columns; skipping");
            return Vec::new();
        }
        let directions: Vec<Direction> = country_columns
            .iter()
            .filter_map(|column| Direction::for_column(column))
            .collect();
        let resource_names: Vec<String> = directions
            .iter()
            .map(|direction| resource_name(resource_id, *direction))
            .collect();

        let mut row_count = 0usize;
        for mut row in rows {
            row_count += 1;
            let codes: Vec<String> = country_columns
                .iter()
                .map(|column| row.get(*column).map(cell_display).unwrap_or_default())
                .collect();
            for (direction, code) in directions.iter().zip(&codes) {
                let name = self.country_name(code);
                if !code.is_empty() {
                    self.aggregation.countries.insert(Country {
                        iso3: code.clone(),
                        name: name.clone(),
                    });
                }
                row.insert(direction.name_column().to_string(), Some(Value::String(name)));
            }
            for (code, resource_name) in codes.iter().zip(&resource_names) {
                debug!("Processing {code}, resource {resource_name}");
                if code.is_empty() {
                    warn!("Row {row_count} of '{resource_id}' has no country code for {resource_name}");
                } else {
                    self.aggregation
                        .buckets
                        .entry(code.clone())
                        .or_default()
                        .entry(resource_name.clone())
                        .or_default()
                        .push(row.clone());
                }
                self.aggregation
                    .buckets
                    .entry(WORLD.to_string())
                    .or_default()
                    .entry(resource_name.clone())
                    .or_default()
                    .push(row.clone());
                self.accumulate_quick_chart(&row, code);
            }
        }

        let mut resource_headers = headers.to_vec();
        for direction in &directions {
            let position = NAME_COLUMN_POSITION.min(resource_headers.len());
            resource_headers.insert(position, direction.name_column().to_string());
        }
        for name in &resource_names {
            self.aggregation
                .headers
                .insert(name.clone(), resource_headers.clone());
        }
        info!(
            "Aggregated {row_count} row(s) of '{resource_id}' into {}",
            resource_names.join(", ")
        );
        resource_names
    }

    fn accumulate_quick_chart(&mut self, row: &Row, country_iso: &str) {
        let field = |name: &str| row.get(name).map(cell_display).unwrap_or_default();
        let key = QuickChartKey {
            year: field(YEAR_COLUMN),
            origin: field(ORIGIN_COLUMN),
            asylum: field(ASYLUM_COLUMN),
        };
        if key.year.is_empty() || key.origin.is_empty() || key.asylum.is_empty() {
            return;
        }
        let mut attributes = Vec::with_capacity(2);
        if country_iso == key.origin {
            attributes.push("outgoing");
        }
        if country_iso == key.asylum {
            attributes.push("incoming");
        }
        let origin_name = self.country_name(&key.origin);
        let asylum_name = self.country_name(&key.asylum);

        let qc_row = self.aggregation.quick_chart.entry(key.clone()).or_default();
        qc_row.insert(YEAR_COLUMN.to_string(), Some(Value::from(key.year.as_str())));
        qc_row.insert(ORIGIN_COLUMN.to_string(), Some(Value::from(key.origin.as_str())));
        qc_row.insert(ASYLUM_COLUMN.to_string(), Some(Value::from(key.asylum.as_str())));
        qc_row.insert(ORIGIN_NAME_COLUMN.to_string(), Some(Value::String(origin_name)));
        qc_row.insert(ASYLUM_NAME_COLUMN.to_string(), Some(Value::String(asylum_name)));
        for attribute in attributes {
            for name in QUICK_CHART_FIELDS {
                let Some(Some(value)) = row.get(*name) else {
                    continue;
                };
                qc_row.insert(format!("{name}_{attribute}"), Some(value.clone()));
            }
        }
    }

    pub fn finish(self) -> Aggregation {
        self.aggregation
    }
}
