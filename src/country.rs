//! ISO3 country-name resolution.
//!
//! The name lookup itself is an external capability behind
//! [`CountryLookup`]. [`resolve_country_name`] layers the fallback table for
//! non-standard codes on top and always returns a usable label.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use log::warn;

use crate::io_utils;

pub const UNKNOWN_COUNTRY_NAME: &str = "Various / unknown";

const NON_STANDARD_CODES: &[(&str, &str)] = &[
    ("UKN", UNKNOWN_COUNTRY_NAME),
    ("STA", "Stateless"),
    ("TIB", "Tibetan"),
];

pub trait CountryLookup {
    /// Name for an ISO3 code, `None` when the code is not recognised.
    fn name_for_iso3(&self, code: &str) -> Option<String>;
}

impl<F> CountryLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn name_for_iso3(&self, code: &str) -> Option<String> {
        self(code)
    }
}

/// Table-backed lookup, case-insensitive on the code.
#[derive(Debug, Clone, Default)]
pub struct CountryTable {
    names: HashMap<String, String>,
}

impl CountryTable {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let names = entries
            .into_iter()
            .map(|(code, name)| (code.as_ref().trim().to_ascii_uppercase(), name.into()))
            .collect();
        Self { names }
    }

    /// Loads an `iso3,name` CSV with a header line.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, b',')?;
        let mut table = Self::default();
        for (ordinal, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("Reading country row {} of {path:?}", ordinal + 2))?;
            let (Some(code), Some(name)) = (record.get(0), record.get(1)) else {
                continue;
            };
            table.insert(code, name);
        }
        Ok(table)
    }

    pub fn insert(&mut self, code: &str, name: &str) {
        self.names
            .insert(code.trim().to_ascii_uppercase(), name.trim().to_string());
    }

    pub fn extend(&mut self, other: CountryTable) {
        self.names.extend(other.names);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl CountryLookup for CountryTable {
    fn name_for_iso3(&self, code: &str) -> Option<String> {
        self.names.get(&code.trim().to_ascii_uppercase()).cloned()
    }
}

pub fn resolve_country_name<L: CountryLookup + ?Sized>(lookup: &L, code: &str) -> String {
    if let Some(name) = lookup.name_for_iso3(code).filter(|name| !name.is_empty()) {
        return name;
    }
    let upper = code.trim().to_ascii_uppercase();
    if let Some((_, name)) = NON_STANDARD_CODES.iter().find(|(known, _)| *known == upper) {
        return name.to_string();
    }
    warn!("Unknown ISO3 code '{code}', labelling it '{UNKNOWN_COUNTRY_NAME}'");
    UNKNOWN_COUNTRY_NAME.to_string()
}
