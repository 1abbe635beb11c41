//! The [`RowStream`] contract and its two source-level implementations.
//!
//! A stream exposes its effective headers, a header to HXL tag mapping and
//! a forward cursor over [`Row`]s. Transformation stages wrap an upstream
//! stream, own it, and satisfy the same contract, so they chain:
//!
//! ```
//! use hxl_population::data::{Row, Value};
//! use hxl_population::stream::{ListStream, RowStream};
//!
//! let rows = vec![
//!     Row::from([("a".to_string(), Some(Value::Integer(1))), ("b".to_string(), Some(Value::Integer(10)))]),
//!     Row::from([("a".to_string(), Some(Value::Integer(2))), ("b".to_string(), Some(Value::Integer(20)))]),
//! ];
//! let mut stream = ListStream::new(rows, vec!["a".into(), "b".into()])
//!     .with_sum_field("c", "", &["a", "b"]);
//! assert_eq!(stream.headers(), vec!["a", "b", "c"]);
//! let first = stream.next_row().unwrap().unwrap();
//! assert_eq!(first["c"], Some(Value::Integer(11)));
//! ```
//!
//! Streams are single-consumer, single-cursor and pull based. Only
//! list-backed streams can always be rewound; a [`SourceStream`] over an
//! external iterator reports [`StreamError::NotRestartable`].

use std::{collections::BTreeSet, sync::Arc};

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::{
    convert::FieldsStage,
    data::{Cell, ComparableValue, Row},
    derive::SumFieldStage,
    fields::FieldSchema,
};

pub type Result<T> = std::result::Result<T, StreamError>;

pub type TagMapping = IndexMap<String, String>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream '{source_name}' is single-pass and cannot be reset; materialize it first")]
    NotRestartable { source_name: String },
    #[error("field mapping has already been applied to this stream")]
    FieldsAlreadyApplied,
    #[error("none of the original field names ({expected}) are present in the stream headers")]
    MissingOriginalFields { expected: String },
    #[error("row {row}: {message}")]
    Decode { row: usize, message: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait RowStream {
    /// Effective header names, in output column order.
    fn headers(&self) -> Vec<String>;

    /// Effective tag per header. Headers without an entry are untagged.
    fn tag_mapping(&self) -> TagMapping {
        TagMapping::new()
    }

    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Rewinds to the first row.
    fn reset(&mut self) -> Result<()>;

    /// Whether a field schema has been applied somewhere up the chain.
    fn fields_applied(&self) -> bool {
        false
    }

    /// One tag per header, empty for untagged headers.
    fn tag_row(&self) -> Vec<String> {
        let mapping = self.tag_mapping();
        self.headers()
            .iter()
            .map(|header| mapping.get(header).cloned().unwrap_or_default())
            .collect()
    }

    /// Drains the remaining rows.
    fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Renames and decodes fields. Must be applied once per pipeline, to
    /// headers that still carry the original field names.
    fn with_fields(self, fields: &Arc<FieldSchema>) -> Result<FieldsStage<Self>>
    where
        Self: Sized,
    {
        FieldsStage::new(self, Arc::clone(fields))
    }

    fn with_sum_field(self, field_name: &str, tag: &str, sum_fields: &[&str]) -> SumFieldStage<Self>
    where
        Self: Sized,
    {
        SumFieldStage::new(
            self,
            field_name,
            tag,
            sum_fields.iter().map(|f| f.to_string()).collect(),
        )
    }

    /// Eagerly keeps the rows matching `predicate`.
    fn select<P>(mut self, mut predicate: P) -> Result<ListStream>
    where
        Self: Sized,
        P: FnMut(&Row) -> bool,
    {
        let headers = self.headers();
        let tags = self.tag_mapping();
        let fields_applied = self.fields_applied();
        let mut kept = Vec::new();
        let mut seen = 0usize;
        while let Some(row) = self.next_row()? {
            seen += 1;
            if predicate(&row) {
                kept.push(row);
            }
        }
        debug!("select kept {} of {} row(s)", kept.len(), seen);
        let mut list = ListStream::new(kept, headers).with_tags(tags);
        list.fields_applied = fields_applied;
        Ok(list)
    }

    /// Eager stable sort on one field; ties keep their relative order.
    fn sort_by(mut self, field: &str, descending: bool) -> Result<ListStream>
    where
        Self: Sized,
    {
        let headers = self.headers();
        let tags = self.tag_mapping();
        let fields_applied = self.fields_applied();
        let mut rows = self.collect_rows()?;
        rows.sort_by(|a, b| {
            let left = ComparableValue(a.get(field).and_then(Option::as_ref));
            let right = ComparableValue(b.get(field).and_then(Option::as_ref));
            if descending {
                right.cmp(&left)
            } else {
                left.cmp(&right)
            }
        });
        let mut list = ListStream::new(rows, headers).with_tags(tags);
        list.fields_applied = fields_applied;
        Ok(list)
    }

    /// Forces iteration into a restartable list-backed stream.
    fn materialize(mut self) -> Result<ListStream>
    where
        Self: Sized,
    {
        let headers = self.headers();
        let tags = self.tag_mapping();
        let fields_applied = self.fields_applied();
        let rows = self.collect_rows()?;
        let mut list = ListStream::new(rows, headers).with_tags(tags);
        list.fields_applied = fields_applied;
        Ok(list)
    }
}

impl<S: RowStream + ?Sized> RowStream for Box<S> {
    fn headers(&self) -> Vec<String> {
        (**self).headers()
    }

    fn tag_mapping(&self) -> TagMapping {
        (**self).tag_mapping()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn fields_applied(&self) -> bool {
        (**self).fields_applied()
    }
}

/// In-memory, always restartable stream.
#[derive(Debug, Clone, Default)]
pub struct ListStream {
    rows: Vec<Row>,
    headers: Vec<String>,
    tags: TagMapping,
    position: usize,
    fields_applied: bool,
}

impl ListStream {
    pub fn new(rows: Vec<Row>, headers: Vec<String>) -> Self {
        Self {
            rows,
            headers,
            tags: TagMapping::new(),
            position: 0,
            fields_applied: false,
        }
    }

    pub fn with_tags(mut self, tags: TagMapping) -> Self {
        self.tags = tags;
        self
    }

    /// Appends, sorted, the fields found in the data but missing from the
    /// headers. Only the first row is scanned unless `scan_all_rows` is set.
    pub fn auto_headers(mut self, scan_all_rows: bool) -> Self {
        let take = if scan_all_rows { self.rows.len() } else { 1 };
        let extra: BTreeSet<&String> = self
            .rows
            .iter()
            .take(take)
            .flat_map(|row| row.keys())
            .filter(|field| !self.headers.contains(field))
            .collect();
        let extra: Vec<String> = extra.into_iter().cloned().collect();
        self.headers.extend(extra);
        self
    }

    /// Values of `field` across every row, null where the field is missing.
    pub fn column(&self, field: &str) -> Vec<Cell> {
        self.rows
            .iter()
            .map(|row| row.get(field).cloned().flatten())
            .collect()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl RowStream for ListStream {
    fn headers(&self) -> Vec<String> {
        self.headers.clone()
    }

    fn tag_mapping(&self) -> TagMapping {
        self.tags.clone()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn fields_applied(&self) -> bool {
        self.fields_applied
    }
}

type RowIter = Box<dyn Iterator<Item = Result<Row>>>;

/// Single-pass stream over an external iterator.
pub struct SourceStream {
    name: String,
    headers: Vec<String>,
    rows: RowIter,
}

impl SourceStream {
    pub fn new<I>(name: &str, headers: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Result<Row>>,
        I::IntoIter: 'static,
    {
        Self {
            name: name.to_string(),
            headers,
            rows: Box::new(rows.into_iter()),
        }
    }

    pub fn from_rows<I>(name: &str, headers: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: 'static,
    {
        Self::new(name, headers, rows.into_iter().map(Ok))
    }
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("name", &self.name)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RowStream for SourceStream {
    fn headers(&self) -> Vec<String> {
        self.headers.clone()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        self.rows.next().transpose()
    }

    fn reset(&mut self) -> Result<()> {
        Err(StreamError::NotRestartable {
            source_name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(Value::from(*v))))
            .collect()
    }

    fn sample() -> ListStream {
        ListStream::new(
            vec![
                row(&[("Year", "2019"), ("n", "3")]),
                row(&[("Year", "2021"), ("n", "1")]),
                row(&[("Year", "2020"), ("n", "3")]),
            ],
            vec!["Year".into(), "n".into()],
        )
    }

    #[test]
    fn list_stream_restarts_with_identical_rows() {
        let mut stream = sample();
        let first = stream.collect_rows().unwrap();
        stream.reset().unwrap();
        let second = stream.collect_rows().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn source_stream_is_not_restartable() {
        let mut stream = SourceStream::from_rows("raw", vec!["Year".into()], vec![row(&[("Year", "2020")])]);
        assert!(stream.next_row().unwrap().is_some());
        assert!(stream.next_row().unwrap().is_none());
        let err = stream.reset().expect_err("single pass");
        assert!(matches!(err, StreamError::NotRestartable { .. }));
    }

    #[test]
    fn materialized_source_stream_restarts() {
        let stream = SourceStream::from_rows("raw", vec!["Year".into()], vec![row(&[("Year", "2020")])]);
        let mut list = stream.materialize().unwrap();
        assert_eq!(list.collect_rows().unwrap().len(), 1);
        list.reset().unwrap();
        assert_eq!(list.collect_rows().unwrap().len(), 1);
    }

    #[test]
    fn select_keeps_matching_rows_in_order() {
        let mut selected = sample()
            .with_tags(TagMapping::from([("Year".to_string(), "#date+year".to_string())]))
            .select(|row| row.get("n") == Some(&Some(Value::from("3"))))
            .unwrap();
        assert_eq!(selected.headers(), vec!["Year", "n"]);
        assert_eq!(selected.tag_row(), vec!["#date+year", ""]);
        let years: Vec<_> = selected.collect_rows().unwrap().into_iter().map(|r| r["Year"].clone()).collect();
        assert_eq!(years, vec![Some(Value::from("2019")), Some(Value::from("2020"))]);
    }

    #[test]
    fn sort_by_is_stable() {
        let sorted = sample().sort_by("n", true).unwrap();
        let years = sorted.column("Year");
        assert_eq!(
            years,
            vec![Some(Value::from("2019")), Some(Value::from("2020")), Some(Value::from("2021"))]
        );
        let ascending = sample().sort_by("Year", false).unwrap();
        assert_eq!(ascending.column("n")[2], Some(Value::from("1")));
    }

    #[test]
    fn auto_headers_appends_sorted_unknown_fields() {
        let stream = ListStream::new(
            vec![row(&[("b", "1"), ("z", "2"), ("a", "3")]), row(&[("late", "4")])],
            vec!["b".into()],
        );
        assert_eq!(stream.clone().auto_headers(false).headers(), vec!["b", "a", "z"]);
        assert_eq!(stream.auto_headers(true).headers(), vec!["b", "a", "late", "z"]);
    }

    #[test]
    fn boxed_streams_chain() {
        let boxed: Box<dyn RowStream> = Box::new(sample());
        let mut summed = boxed.with_sum_field("total", "#total", &["n"]);
        assert_eq!(summed.headers(), vec!["Year", "n", "total"]);
        let first = summed.next_row().unwrap().unwrap();
        assert_eq!(first["total"], Some(Value::Integer(3)));
    }
}
