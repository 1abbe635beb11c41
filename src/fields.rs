//! Declarative field mapping: renames, HXL tags and value decoding tables.
//!
//! A [`FieldSchema`] is keyed by *original* field name and preserves the
//! order in which fields were declared:
//!
//! ```yaml
//! field1:
//!   name: New name for field1
//!   tags: '#meta+tags+for+field1'
//! field2:
//!   name: New name for field2
//!   tags: '#indicator+code'
//!   encoding:
//!     name: Field2 names      # column added next to field2
//!     tags: '#indicator+name'
//!     map:
//!       f2val1: field2 value 1 mapped
//! ```
//!
//! Missing entries are never errors: unknown fields keep their name and get
//! an empty tag, unknown raw values decode to `None`.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, rename = "tags", skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EncodingSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingSpec {
    #[serde(default = "EncodingSpec::default_expand")]
    pub expand: bool,
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, rename = "tags", skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, rename = "map", skip_serializing_if = "IndexMap::is_empty")]
    pub value_map: IndexMap<String, String>,
}

impl EncodingSpec {
    pub const fn default_expand() -> bool {
        true
    }
}

impl FieldSpec {
    pub fn expanding_encoding(&self) -> Option<&EncodingSpec> {
        self.encoding.as_ref().filter(|encoding| encoding.expand)
    }
}

/// A column added by decoding a source field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedColumn {
    pub source: String,
    pub name: String,
    pub tag: String,
}

/// Value maps and derived column names of all expanding encodings, keyed by
/// either original or display field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingMaps {
    pub value_maps: IndexMap<String, IndexMap<String, String>>,
    pub derived_names: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: IndexMap<String, FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: IndexMap<String, FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context("Parsing fields YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Opening fields file {path:?}"))?;
        Self::from_yaml_str(&raw)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, original_name: &str) -> Option<&FieldSpec> {
        self.fields.get(original_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn rename<'a>(&'a self, original_name: &'a str) -> &'a str {
        self.fields
            .get(original_name)
            .and_then(|spec| spec.display_name.as_deref())
            .unwrap_or(original_name)
    }

    fn key<'a>(original_name: &'a str, spec: &'a FieldSpec, use_original_names: bool) -> &'a str {
        if use_original_names {
            original_name
        } else {
            spec.display_name.as_deref().unwrap_or(original_name)
        }
    }

    fn derived_name(key: &str, encoding: &EncodingSpec) -> String {
        encoding
            .display_name
            .clone()
            .unwrap_or_else(|| format!("{key}_"))
    }

    pub fn encoding_maps(&self, use_original_names: bool) -> EncodingMaps {
        let mut maps = EncodingMaps::default();
        for (original, spec) in &self.fields {
            let Some(encoding) = spec.expanding_encoding() else {
                continue;
            };
            let key = Self::key(original, spec, use_original_names);
            maps.derived_names
                .insert(key.to_string(), Self::derived_name(key, encoding));
            maps.value_maps
                .insert(key.to_string(), encoding.value_map.clone());
        }
        maps
    }

    /// Header to tag mapping for every declared field and decoded column.
    pub fn tag_mapping(&self, use_original_names: bool) -> IndexMap<String, String> {
        let mut tags = IndexMap::with_capacity(self.fields.len());
        for (original, spec) in &self.fields {
            let key = Self::key(original, spec, use_original_names);
            tags.insert(key.to_string(), spec.tag.clone().unwrap_or_default());
            if let Some(encoding) = spec.expanding_encoding() {
                tags.insert(
                    Self::derived_name(key, encoding),
                    encoding.tag.clone().unwrap_or_default(),
                );
            }
        }
        tags
    }

    /// Tag of a display (renamed or decoded) column; empty when unknown.
    pub fn tag_for(&self, display_name: &str) -> String {
        self.lookup_tag(display_name, false)
    }

    /// Tag of a field addressed by its original name.
    pub fn tag_for_original(&self, original_name: &str) -> String {
        self.lookup_tag(original_name, true)
    }

    fn lookup_tag(&self, name: &str, use_original_names: bool) -> String {
        let mut found = None;
        for (original, spec) in &self.fields {
            let key = Self::key(original, spec, use_original_names);
            if key == name {
                found = Some(spec.tag.clone().unwrap_or_default());
            } else if let Some(encoding) = spec.expanding_encoding()
                && Self::derived_name(key, encoding) == name
            {
                found = Some(encoding.tag.clone().unwrap_or_default());
            }
        }
        found.unwrap_or_default()
    }

    pub fn derived_columns(&self) -> Vec<DecodedColumn> {
        self.fields
            .iter()
            .filter_map(|(original, spec)| {
                let encoding = spec.expanding_encoding()?;
                let source = Self::key(original, spec, false);
                Some(DecodedColumn {
                    source: source.to_string(),
                    name: Self::derived_name(source, encoding),
                    tag: encoding.tag.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Name of the column decoded from `original_name`. An unnamed encoding
    /// derives it from the display name. `None` unless the encoding expands.
    pub fn decoded_column_name(&self, original_name: &str) -> Option<String> {
        let spec = self.fields.get(original_name)?;
        let encoding = spec.expanding_encoding()?;
        Some(Self::derived_name(
            Self::key(original_name, spec, false),
            encoding,
        ))
    }

    /// Decodes `raw` through the value map of the field named either by its
    /// original or its display name. A missing mapping yields `None`.
    ///
    /// Original names take precedence: when a display name equals another
    /// field's original name, that other field's map is used.
    pub fn decode(&self, name: &str, raw: &str) -> Option<&str> {
        let spec = self.fields.get(name).or_else(|| {
            self.fields
                .values()
                .find(|spec| spec.display_name.as_deref() == Some(name))
        })?;
        spec.encoding
            .as_ref()?
            .value_map
            .get(raw)
            .map(String::as_str)
    }

    /// Renamed headers with every decoded column placed right after its source.
    pub fn convert_headers(&self, headers: &[String]) -> Vec<String> {
        let mut converted = Vec::with_capacity(headers.len());
        for header in headers {
            converted.push(self.rename(header).to_string());
            if let Some(decoded) = self.decoded_column_name(header) {
                converted.push(decoded);
            }
        }
        converted
    }

    /// True when `headers` still carry original names this schema knows
    /// about, i.e. the schema has not been applied to them yet.
    pub fn expects_originals(&self, headers: &[String]) -> bool {
        if self.fields.is_empty() || headers.is_empty() {
            return true;
        }
        let renames_anything = self
            .fields
            .iter()
            .any(|(original, spec)| spec.display_name.as_deref().is_some_and(|n| n != original));
        if !renames_anything {
            return true;
        }
        headers.iter().any(|header| self.fields.contains_key(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldSchema {
        FieldSchema::from_yaml_str(
            r##"
field1:
  name: field1 renamed
field2:
  name: field2 renamed
  tags: "#indicator+code"
  encoding:
    name: field2e
    tags: "#indicator+name"
    map:
      f2val1: f2val1 mapped
"##,
        )
        .expect("parse fields")
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rename_defaults_to_original_name() {
        let schema = sample();
        assert_eq!(schema.rename("field1"), "field1 renamed");
        assert_eq!(schema.rename("unspecified_field"), "unspecified_field");
    }

    #[test]
    fn encoding_maps_by_display_name() {
        let maps = sample().encoding_maps(false);
        assert_eq!(
            maps.derived_names.get("field2 renamed").map(String::as_str),
            Some("field2e")
        );
        assert_eq!(
            maps.value_maps["field2 renamed"].get("f2val1").map(String::as_str),
            Some("f2val1 mapped")
        );
        assert_eq!(maps.value_maps.len(), 1);
    }

    #[test]
    fn encoding_maps_by_original_name() {
        let maps = sample().encoding_maps(true);
        assert_eq!(
            maps.derived_names.get("field2").map(String::as_str),
            Some("field2e")
        );
    }

    #[test]
    fn tag_mapping_covers_decoded_columns() {
        let tags = sample().tag_mapping(false);
        let expected: IndexMap<String, String> = [
            ("field1 renamed", ""),
            ("field2 renamed", "#indicator+code"),
            ("field2e", "#indicator+name"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(tags, expected);

        let original = sample().tag_mapping(true);
        assert_eq!(original.get("field1").map(String::as_str), Some(""));
        assert_eq!(
            original.get("field2").map(String::as_str),
            Some("#indicator+code")
        );
    }

    #[test]
    fn tag_for_looks_up_display_and_original_names() {
        let schema = sample();
        assert_eq!(schema.tag_for("field2 renamed"), "#indicator+code");
        assert_eq!(schema.tag_for("field2e"), "#indicator+name");
        assert_eq!(schema.tag_for("field2"), "");
        assert_eq!(schema.tag_for_original("field2"), "#indicator+code");
        assert_eq!(schema.tag_for("nothing"), "");
    }

    #[test]
    fn decode_without_mapping_is_none() {
        let schema = sample();
        assert_eq!(schema.decode("field2", "f2val1"), Some("f2val1 mapped"));
        assert_eq!(schema.decode("field2 renamed", "f2val1"), Some("f2val1 mapped"));
        assert_eq!(schema.decode("field2", "f2val2"), None);
        assert_eq!(schema.decode("field1", "f1val1"), None);
    }

    #[test]
    fn convert_headers_interleaves_decoded_columns() {
        let converted = sample().convert_headers(&headers(&["field1", "field2", "unspecified_field"]));
        assert_eq!(
            converted,
            headers(&["field1 renamed", "field2 renamed", "field2e", "unspecified_field"])
        );
    }

    #[test]
    fn non_expanding_encoding_adds_no_column_but_still_decodes() {
        let schema = FieldSchema::from_yaml_str(
            r#"
code:
  name: Code
  encoding:
    expand: false
    name: Code name
    map:
      A: Alpha
"#,
        )
        .unwrap();
        assert_eq!(schema.convert_headers(&headers(&["code"])), headers(&["Code"]));
        assert!(schema.derived_columns().is_empty());
        assert!(!schema.tag_mapping(false).contains_key("Code name"));
        assert_eq!(schema.decode("code", "A"), Some("Alpha"));
    }

    #[test]
    fn unnamed_encoding_gets_trailing_underscore_name() {
        let schema = FieldSchema::from_yaml_str(
            r#"
status:
  encoding:
    map:
      1: active
"#,
        )
        .unwrap();
        let derived = schema.derived_columns();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].name, "status_");
        assert_eq!(schema.decode("status", "1"), Some("active"));
    }

    #[test]
    fn unnamed_encoding_on_renamed_field_follows_display_name() {
        let schema = FieldSchema::from_yaml_str(
            r##"
status:
  name: Status
  tags: "#status"
  encoding:
    map:
      1: active
"##,
        )
        .unwrap();
        assert_eq!(
            schema.convert_headers(&headers(&["status"])),
            headers(&["Status", "Status_"])
        );
        assert_eq!(schema.decoded_column_name("status").as_deref(), Some("Status_"));
        assert_eq!(schema.derived_columns()[0].name, "Status_");
        assert!(schema.tag_mapping(false).contains_key("Status_"));
        assert_eq!(schema.decoded_column_name("Status"), None);
    }

    #[test]
    fn decode_prefers_original_names_over_display_names() {
        let schema = FieldSchema::from_yaml_str(
            r#"
a:
  name: b
  encoding:
    map:
      x: from a
b:
  name: c
  encoding:
    map:
      x: from b
"#,
        )
        .unwrap();
        assert_eq!(schema.decode("b", "x"), Some("from b"));
        assert_eq!(schema.decode("a", "x"), Some("from a"));
        assert_eq!(schema.decode("c", "x"), Some("from b"));
    }

    #[test]
    fn expects_originals_detects_renamed_headers() {
        let schema = sample();
        assert!(schema.expects_originals(&headers(&["field1", "field2"])));
        assert!(!schema.expects_originals(&headers(&["field1 renamed", "field2 renamed"])));
        assert!(FieldSchema::default().expects_originals(&headers(&["x"])));
    }
}
