//! Quick-chart summary table for one country.
//!
//! The accumulated quick-chart rows of a country are restricted to the most
//! recent years, extended with three displacement totals and then passed
//! through the field schema. The finished stream is walked once to decide
//! which chart "bites" have data, rewound, and handed to the exporter.

use std::{collections::BTreeSet, sync::Arc};

use itertools::Itertools;
use log::debug;

use crate::{
    aggregate::{
        ASYLUM_COLUMN, ASYLUM_NAME_COLUMN, ORIGIN_COLUMN, ORIGIN_NAME_COLUMN, YEAR_COLUMN,
    },
    data::{Row, Value, cell_display},
    fields::FieldSchema,
    stream::{ListStream, Result, RowStream},
};

pub const DISPLACED_FROM: &str = "Displaced From";
pub const DISPLACED_STATELESS_WITHIN: &str = "Displaced Stateless Within";
pub const DISPLACED_STATELESS_FROM: &str = "Displaced Stateless From";

pub const DEFAULT_YEARS: usize = 10;

pub const QUICK_CHART_HEADERS: [&str; 8] = [
    YEAR_COLUMN,
    ORIGIN_COLUMN,
    ORIGIN_NAME_COLUMN,
    ASYLUM_COLUMN,
    ASYLUM_NAME_COLUMN,
    DISPLACED_FROM,
    DISPLACED_STATELESS_WITHIN,
    DISPLACED_STATELESS_FROM,
];

struct SumSpec {
    name: &'static str,
    tag: &'static str,
    prefixes: &'static [&'static str],
    suffix: &'static str,
}

const SUMS: [SumSpec; 3] = [
    SumSpec {
        name: DISPLACED_FROM,
        tag: "#affected+displaced+outgoing",
        prefixes: &["REF", "ASY", "OIP"],
        suffix: "_outgoing",
    },
    SumSpec {
        name: DISPLACED_STATELESS_WITHIN,
        tag: "#affected+displaced+stateless+incoming",
        prefixes: &["REF", "ASY", "IDP", "OIP", "STA"],
        suffix: "_incoming",
    },
    SumSpec {
        name: DISPLACED_STATELESS_FROM,
        tag: "#affected+displaced+stateless+outgoing",
        prefixes: &["REF", "ASY", "IDP", "OIP", "STA"],
        suffix: "_outgoing",
    },
];

impl SumSpec {
    fn fields<'a>(&self, headers: &'a [String]) -> Vec<&'a str> {
        headers
            .iter()
            .map(String::as_str)
            .filter(|h| self.prefixes.iter().any(|p| h.starts_with(p)) && h.ends_with(self.suffix))
            .collect()
    }
}

pub struct QuickChart {
    pub stream: Box<dyn RowStream>,
    pub years: Vec<String>,
    /// Displaced-from, displaced-within (latest year), displaced-from
    /// including stateless (latest year). `true` means no data.
    pub bites_disabled: [bool; 3],
}

/// Distinct years of `column`, ascending, keeping only the last `keep`.
pub fn recent_years(stream: &ListStream, column: &str, keep: usize) -> Vec<String> {
    let years: BTreeSet<String> = stream
        .column(column)
        .iter()
        .map(cell_display)
        .filter(|year| !year.is_empty())
        .collect();
    let skip = years.len().saturating_sub(keep);
    years.into_iter().skip(skip).collect()
}

pub fn build_quick_chart(
    iso3: &str,
    rows: Vec<Row>,
    fields: &Arc<FieldSchema>,
    keep_years: usize,
) -> Result<QuickChart> {
    let base = ListStream::new(
        rows,
        QUICK_CHART_HEADERS.iter().map(|h| h.to_string()).collect(),
    )
    .auto_headers(true);
    let years = recent_years(&base, YEAR_COLUMN, keep_years);
    let headers = base.headers();
    debug!(
        "Quick chart for {iso3}: years {}, columns {}",
        years.iter().join(","),
        headers.len()
    );

    let [from, within, stateless_from] = &SUMS;
    let selected = base.select(|row| {
        row.get(YEAR_COLUMN)
            .map(cell_display)
            .is_some_and(|year| years.contains(&year))
    })?;
    let stream = selected
        .with_sum_field(from.name, from.tag, &from.fields(&headers))
        .with_sum_field(within.name, within.tag, &within.fields(&headers))
        .with_sum_field(stateless_from.name, stateless_from.tag, &stateless_from.fields(&headers))
        .with_fields(fields)?;
    let mut stream: Box<dyn RowStream> = Box::new(stream);

    let bites_disabled = compute_bites(stream.as_mut(), iso3, years.last(), fields)?;
    stream.reset()?;

    Ok(QuickChart {
        stream,
        years,
        bites_disabled,
    })
}

fn positive(row: &Row, field: &str) -> bool {
    row.get(field)
        .and_then(Option::as_ref)
        .and_then(Value::as_f64)
        .is_some_and(|v| v > 0.0)
}

fn compute_bites(
    stream: &mut dyn RowStream,
    iso3: &str,
    latest_year: Option<&String>,
    fields: &FieldSchema,
) -> Result<[bool; 3]> {
    let origin = fields.rename(ORIGIN_COLUMN);
    let asylum = fields.rename(ASYLUM_COLUMN);
    let year = fields.rename(YEAR_COLUMN);
    let displaced_from = fields.rename(DISPLACED_FROM);
    let within = fields.rename(DISPLACED_STATELESS_WITHIN);
    let stateless_from = fields.rename(DISPLACED_STATELESS_FROM);
    let is = |row: &Row, column: &str| row.get(column).map(cell_display).as_deref() == Some(iso3);

    let mut disabled = [true; 3];
    while let Some(row) = stream.next_row()? {
        if is(&row, origin) && positive(&row, displaced_from) {
            disabled[0] = false;
        }
        let row_year = row.get(year).map(cell_display);
        if row_year.as_ref() != latest_year {
            continue;
        }
        if is(&row, asylum) && positive(&row, within) {
            disabled[1] = false;
        }
        if is(&row, origin) && positive(&row, stateless_from) {
            disabled[2] = false;
        }
    }
    Ok(disabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(Value::from(*v))))
            .collect()
    }

    fn fields() -> Arc<FieldSchema> {
        Arc::new(
            FieldSchema::from_yaml_str(
                r##"
Year:
  tags: "#date+year"
ISO3CoO:
  name: Country of Origin Code
  tags: "#country+code+origin"
ISO3CoA:
  name: Country of Asylum Code
  tags: "#country+code+asylum"
"##,
            )
            .unwrap(),
        )
    }

    fn qc_rows() -> Vec<Row> {
        vec![
            row(&[("Year", "2020"), ("ISO3CoO", "SYR"), ("ISO3CoA", "TUR"), ("REF_outgoing", "10"), ("ASY_outgoing", "2")]),
            row(&[("Year", "2021"), ("ISO3CoO", "SYR"), ("ISO3CoA", "LBN"), ("REF_outgoing", "7"), ("STA_outgoing", "x")]),
            row(&[("Year", "2021"), ("ISO3CoO", "SYR"), ("ISO3CoA", "SYR"), ("IDP_incoming", "100"), ("IDP_outgoing", "100")]),
        ]
    }

    #[test]
    fn recent_years_keeps_the_tail() {
        let stream = ListStream::new(
            (2010..2024)
                .map(|y| {
                    let year = y.to_string();
                    row(&[("Year", year.as_str())])
                })
                .collect(),
            vec!["Year".into()],
        );
        let years = recent_years(&stream, "Year", 10);
        assert_eq!(years.len(), 10);
        assert_eq!(years.first().map(String::as_str), Some("2014"));
        assert_eq!(years.last().map(String::as_str), Some("2023"));
    }

    #[test]
    fn builds_sums_renames_and_bites() {
        let mut chart = build_quick_chart("SYR", qc_rows(), &fields(), 10).unwrap();
        assert_eq!(chart.years, vec!["2020", "2021"]);
        assert_eq!(chart.bites_disabled, [false, false, false]);

        let headers = chart.stream.headers();
        assert_eq!(&headers[..3], &["Year", "Country of Origin Code", "CoO_name"]);
        assert!(headers.contains(&"IDP_incoming".to_string()));
        let tags = chart.stream.tag_mapping();
        assert_eq!(tags[DISPLACED_FROM], "#affected+displaced+outgoing");
        assert_eq!(tags["Country of Origin Code"], "#country+code+origin");

        let rows = chart.stream.collect_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][DISPLACED_FROM], Some(Value::Integer(12)));
        assert_eq!(rows[1][DISPLACED_FROM], Some(Value::Integer(7)));
        assert_eq!(rows[1][DISPLACED_STATELESS_FROM], Some(Value::Integer(7)));
        assert_eq!(rows[2][DISPLACED_STATELESS_WITHIN], Some(Value::Integer(100)));
    }

    #[test]
    fn year_window_and_disabled_bites() {
        let mut chart = build_quick_chart("TUR", qc_rows(), &fields(), 1).unwrap();
        assert_eq!(chart.years, vec!["2021"]);
        assert_eq!(chart.bites_disabled, [true, true, true]);
        assert_eq!(chart.stream.collect_rows().unwrap().len(), 2);
    }

    #[test]
    fn empty_input_disables_everything() {
        let mut chart = build_quick_chart("AFG", Vec::new(), &fields(), 10).unwrap();
        assert!(chart.years.is_empty());
        assert_eq!(chart.bites_disabled, [true; 3]);
        assert_eq!(chart.stream.headers().len(), QUICK_CHART_HEADERS.len());
        assert!(chart.stream.next_row().unwrap().is_none());
    }
}
