//! Schema application stage: renames fields and adds decoded columns.
//!
//! The stage works in terms of *original* field names, so it may be applied
//! only once per pipeline. [`FieldsStage::new`] refuses upstreams that
//! already went through a schema, and upstreams whose headers no longer
//! contain any of the schema's original names.

use std::sync::Arc;

use log::warn;

use crate::{
    data::{Row, Value},
    fields::{EncodingMaps, FieldSchema},
    stream::{Result, RowStream, StreamError, TagMapping},
};

pub struct FieldsStage<S> {
    upstream: S,
    fields: Arc<FieldSchema>,
    encodings: EncodingMaps,
}

impl<S: RowStream> FieldsStage<S> {
    pub fn new(upstream: S, fields: Arc<FieldSchema>) -> Result<Self> {
        if upstream.fields_applied() {
            return Err(StreamError::FieldsAlreadyApplied);
        }
        let headers = upstream.headers();
        if !fields.expects_originals(&headers) {
            let expected = fields
                .iter()
                .map(|(name, _)| name)
                .take(5)
                .collect::<Vec<_>>()
                .join(", ");
            warn!("Refusing to apply field mapping to headers {headers:?}");
            return Err(StreamError::MissingOriginalFields { expected });
        }
        let encodings = fields.encoding_maps(false);
        Ok(Self {
            upstream,
            fields,
            encodings,
        })
    }

    pub fn fields(&self) -> &FieldSchema {
        &self.fields
    }

    fn convert_row(&self, row: Row) -> Row {
        let mut converted = Row::with_capacity(row.len() + self.encodings.derived_names.len());
        for (key, value) in row {
            let decoded = self.fields.decoded_column_name(&key).map(|name| {
                let cell = value
                    .as_ref()
                    .map(Value::as_display)
                    .and_then(|raw| self.fields.decode(&key, &raw).map(Value::from));
                (name, cell)
            });
            converted.insert(self.fields.rename(&key).to_string(), value);
            if let Some((name, cell)) = decoded {
                converted.insert(name, cell);
            }
        }
        // Decoded columns exist even when their source field is absent.
        for derived_name in self.encodings.derived_names.values() {
            if !converted.contains_key(derived_name) {
                converted.insert(derived_name.clone(), None);
            }
        }
        converted
    }
}

impl<S: RowStream> RowStream for FieldsStage<S> {
    fn headers(&self) -> Vec<String> {
        self.fields.convert_headers(&self.upstream.headers())
    }

    fn tag_mapping(&self) -> TagMapping {
        let mut mapping = self.upstream.tag_mapping();
        mapping.extend(self.fields.tag_mapping(false));
        mapping
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.upstream.next_row()?.map(|row| self.convert_row(row)))
    }

    fn reset(&mut self) -> Result<()> {
        self.upstream.reset()
    }

    fn fields_applied(&self) -> bool {
        true
    }
}
