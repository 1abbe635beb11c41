//! Per-country export of aggregated tables.
//!
//! For every country each resource bucket is passed through the field
//! schema and written as a tagged CSV, `qc_data.csv` carries the quick-chart
//! table, and `dataset.json` describes the lot. The world aggregate only
//! writes the `residing` direction so that no row is counted twice.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use heck::ToKebabCase;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    aggregate::{Aggregation, Aggregator, Country, Direction, WORLD, YEAR_COLUMN},
    config::Configuration,
    country::CountryLookup,
    data::{Row, cell_display},
    fields::FieldSchema,
    io_utils,
    quickchart::build_quick_chart,
    serialize::write_tagged,
    stream::RowStream,
};

pub const QUICK_CHART_FILE: &str = "qc_data.csv";
pub const MANIFEST_FILE: &str = "dataset.json";

const TITLE_TEXT: &str = "Data on forcibly displaced populations and stateless persons";

/// How a data year maps onto a calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPeriod {
    pub annual_report: bool,
    pub latest_year: Option<i32>,
}

impl ReportingPeriod {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            annual_report: config.annual_report,
            latest_year: config.latest_year,
        }
    }

    /// 1 January to 31 December; mid-year reports end the latest year on 30 June.
    pub fn period_for_year(&self, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = if !self.annual_report && self.latest_year == Some(year) {
            NaiveDate::from_ymd_opt(year, 6, 30)?
        } else {
            NaiveDate::from_ymd_opt(year, 12, 31)?
        };
        Some((start, end))
    }

    pub fn period_for_rows<'a, I>(&self, rows: I, year_field: &str) -> Option<(NaiveDate, NaiveDate)>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        rows.into_iter()
            .filter_map(|row| row.get(year_field).map(cell_display))
            .filter_map(|year| year.trim().parse::<i32>().ok())
            .filter_map(|year| self.period_for_year(year))
            .reduce(|(start, end), (s, e)| (start.min(s), end.max(e)))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceManifest {
    pub file: String,
    pub name: String,
    pub description: String,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetManifest {
    pub name: String,
    pub title: String,
    pub country: Country,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub resources: Vec<ResourceManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bites_disabled: Option<[bool; 3]>,
}

pub fn dataset_name(iso3: &str) -> String {
    format!("UNHCR Population Data for {iso3}")
        .to_kebab_case()
        .to_lowercase()
}

pub fn dataset_title(country: &Country) -> String {
    if country.iso3 == WORLD {
        format!("{TITLE_TEXT} (Global)")
    } else {
        format!("{} - {TITLE_TEXT}", country.name)
    }
}

fn format_template(template: &str, country: &Country) -> String {
    template
        .replace("{countryiso}", &country.iso3.to_lowercase())
        .replace("{countryname}", &country.name)
}

/// Reads every configured resource from `data_dir` and aggregates it.
pub fn aggregate_resources<L>(
    config: &Configuration,
    data_dir: &Path,
    lookup: &L,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Aggregation>
where
    L: CountryLookup + ?Sized,
{
    let mut aggregator = Aggregator::new(lookup);
    for (resource_id, resource) in &config.resources {
        let path = data_dir.join(&resource.file);
        let delimiter = io_utils::resolve_input_delimiter(&path, None);
        let (headers, rows) = io_utils::read_table(&path, delimiter, encoding)
            .with_context(|| format!("Loading resource '{resource_id}' from {path:?}"))?;
        aggregator.add_resource(resource_id, &headers, rows);
    }
    Ok(aggregator.finish())
}

pub struct Exporter<'a> {
    config: &'a Configuration,
    fields: Arc<FieldSchema>,
    period: ReportingPeriod,
    out_dir: PathBuf,
}

impl<'a> Exporter<'a> {
    pub fn new(config: &'a Configuration, out_dir: &Path) -> Self {
        Self {
            config,
            fields: config.field_schema(),
            period: ReportingPeriod::from_config(config),
            out_dir: out_dir.to_path_buf(),
        }
    }

    /// Exports every country (or just `only`). Returns the manifests written.
    pub fn export_all(
        &self,
        aggregation: &Aggregation,
        only: Option<&str>,
    ) -> Result<Vec<DatasetManifest>> {
        let mut manifests = Vec::new();
        for country in aggregation.countries() {
            if only.is_some_and(|code| !code.eq_ignore_ascii_case(&country.iso3)) {
                continue;
            }
            if let Some(manifest) = self.export_country(aggregation, &country)? {
                manifests.push(manifest);
            }
        }
        info!("Exported {} dataset(s) to {:?}", manifests.len(), self.out_dir);
        Ok(manifests)
    }

    pub fn export_country(
        &self,
        aggregation: &Aggregation,
        country: &Country,
    ) -> Result<Option<DatasetManifest>> {
        let Some(country_data) = aggregation.country_data(&country.iso3) else {
            warn!("{} ({}) has no data", country.name, country.iso3);
            return Ok(None);
        };
        let folder = self.out_dir.join(&country.iso3);
        fs::create_dir_all(&folder).with_context(|| format!("Creating folder {folder:?}"))?;
        info!("Creating dataset: {}", dataset_title(country));

        let mut resources = Vec::new();
        for (resource_name, rows) in country_data {
            let Some((resource_id, direction)) = Direction::split_resource_name(resource_name)
            else {
                continue;
            };
            if country.iso3 == WORLD && direction == Direction::Originating {
                continue;
            }
            if rows.is_empty() {
                warn!("{} - {resource_name} has no data", country.name);
                continue;
            }
            let Some(stream) = aggregation.resource_stream(&country.iso3, resource_name) else {
                continue;
            };
            let file_name = format!("{resource_name}_{}.csv", country.iso3);
            let mut stream = stream.with_fields(&self.fields)?;
            let written = self.write_stream(&mut stream, &folder.join(&file_name))?;
            let text = self
                .config
                .resources
                .get(resource_id)
                .and_then(|resource| resource.text(direction))
                .cloned()
                .unwrap_or_default();
            let name = if text.title.is_empty() {
                resource_name.clone()
            } else {
                format_template(&text.title, country).replace("residing in World", "(Global)")
            };
            let period = self.period.period_for_rows(rows, YEAR_COLUMN);
            resources.push(ResourceManifest {
                file: file_name,
                name,
                description: format_template(&text.description, country),
                rows: written,
                start_date: period.map(|(start, _)| start),
                end_date: period.map(|(_, end)| end),
            });
        }

        let start_date = resources.iter().filter_map(|r| r.start_date).min();
        let end_date = resources.iter().filter_map(|r| r.end_date).max();
        let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
            warn!("{} ({}) has no data", country.name, country.iso3);
            return Ok(None);
        };

        let bites_disabled = if country.iso3 == WORLD {
            None
        } else {
            let rows = aggregation.subset_quick_chart(&country.iso3);
            let mut chart = build_quick_chart(
                &country.iso3,
                rows,
                &self.fields,
                self.config.quick_chart_years,
            )?;
            let written = self.write_stream(chart.stream.as_mut(), &folder.join(QUICK_CHART_FILE))?;
            if written == 0 {
                warn!("QuickCharts {} - {QUICK_CHART_FILE} has no data", country.name);
            }
            resources.push(ResourceManifest {
                file: QUICK_CHART_FILE.to_string(),
                name: QUICK_CHART_FILE.to_string(),
                description: format!("QuickCharts data for {}", country.name),
                rows: written,
                start_date: None,
                end_date: None,
            });
            Some(chart.bites_disabled)
        };

        let manifest = DatasetManifest {
            name: dataset_name(&country.iso3),
            title: dataset_title(country),
            country: country.clone(),
            start_date,
            end_date,
            resources,
            bites_disabled,
        };
        let manifest_path = folder.join(MANIFEST_FILE);
        let file = File::create(&manifest_path)
            .with_context(|| format!("Creating manifest {manifest_path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest)
            .with_context(|| format!("Writing manifest {manifest_path:?}"))?;
        debug!("Manifest written to {manifest_path:?}");
        Ok(Some(manifest))
    }

    fn write_stream(&self, stream: &mut dyn RowStream, path: &Path) -> Result<usize> {
        let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
        let written = write_tagged(stream, BufWriter::new(file), b',')
            .with_context(|| format!("Writing {path:?}"))?;
        debug!("Wrote {written} row(s) to {path:?}");
        Ok(written)
    }
}
