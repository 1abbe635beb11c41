use anyhow::{Result as AnyResult, anyhow};

use crate::{
    data::{Row, Value},
    stream::{Result, RowStream, TagMapping},
};

/// Adds (or overwrites) a column holding the sum of other columns.
///
/// Values that do not parse as numbers, and missing fields, contribute
/// nothing. Whole sums are stored as integers.
pub struct SumFieldStage<S> {
    upstream: S,
    field_name: String,
    tag: String,
    sum_fields: Vec<String>,
}

impl<S: RowStream> SumFieldStage<S> {
    pub fn new(upstream: S, field_name: &str, tag: &str, sum_fields: Vec<String>) -> Self {
        Self {
            upstream,
            field_name: field_name.to_string(),
            tag: tag.to_string(),
            sum_fields,
        }
    }

    pub fn sum_fields(&self) -> &[String] {
        &self.sum_fields
    }
}

pub fn sum_row(row: &Row, fields: &[String]) -> Value {
    let total: f64 = fields
        .iter()
        .filter_map(|field| row.get(field).and_then(Option::as_ref))
        .filter_map(Value::as_f64)
        .sum();
    Value::from_number(total)
}

impl<S: RowStream> RowStream for SumFieldStage<S> {
    fn headers(&self) -> Vec<String> {
        let mut headers = self.upstream.headers();
        if !headers.contains(&self.field_name) {
            headers.push(self.field_name.clone());
        }
        headers
    }

    fn tag_mapping(&self) -> TagMapping {
        let mut mapping = self.upstream.tag_mapping();
        mapping.insert(self.field_name.clone(), self.tag.clone());
        mapping
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(mut row) = self.upstream.next_row()? else {
            return Ok(None);
        };
        let value = sum_row(&row, &self.sum_fields);
        row.insert(self.field_name.clone(), Some(value));
        Ok(Some(row))
    }

    fn reset(&mut self) -> Result<()> {
        self.upstream.reset()
    }

    fn fields_applied(&self) -> bool {
        self.upstream.fields_applied()
    }
}

/// A sum column requested on the command line as `name=tag:field1,field2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumColumn {
    pub name: String,
    pub tag: String,
    pub fields: Vec<String>,
}

impl SumColumn {
    pub fn parse(spec: &str) -> AnyResult<Self> {
        let (name, rest) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("Sum column '{spec}' must look like name=tag:field1,field2"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Sum column is missing a name"));
        }
        let (tag, fields) = rest.split_once(':').unwrap_or(("", rest));
        let fields = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if fields.is_empty() {
            return Err(anyhow!("Sum column '{name}' does not list any fields"));
        }
        Ok(SumColumn {
            name: name.to_string(),
            tag: tag.trim().to_string(),
            fields,
        })
    }
}

pub fn parse_sum_columns(specs: &[String]) -> AnyResult<Vec<SumColumn>> {
    specs.iter().map(|spec| SumColumn::parse(spec)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ListStream;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.clone())))
            .collect()
    }

    #[test]
    fn sums_into_integer_column() {
        let data = vec![
            row(&[("a", Value::Integer(1)), ("b", Value::Integer(10))]),
            row(&[("a", Value::Integer(2)), ("b", Value::Integer(20))]),
        ];
        let mut stream = ListStream::new(data, vec!["a".into(), "b".into()])
            .with_sum_field("c", "", &["a", "b"]);
        assert_eq!(stream.headers(), vec!["a", "b", "c"]);
        let rows = stream.collect_rows().unwrap();
        assert_eq!(
            rows,
            vec![
                row(&[("a", Value::Integer(1)), ("b", Value::Integer(10)), ("c", Value::Integer(11))]),
                row(&[("a", Value::Integer(2)), ("b", Value::Integer(20)), ("c", Value::Integer(22))]),
            ]
        );
    }

    #[test]
    fn non_numeric_values_are_skipped() {
        let data = vec![
            row(&[("a", Value::Integer(1)), ("b", Value::Integer(10))]),
            row(&[("a", Value::Integer(2)), ("b", Value::from("x"))]),
        ];
        let mut stream = ListStream::new(data, vec!["a".into(), "b".into()])
            .with_sum_field("c", "#total", &["a", "b", "missing"]);
        let rows = stream.collect_rows().unwrap();
        assert_eq!(rows[0]["c"], Some(Value::Integer(11)));
        assert_eq!(rows[1]["c"], Some(Value::Integer(2)));
        assert_eq!(stream.tag_mapping()["c"], "#total");
    }

    #[test]
    fn string_numbers_and_fractions() {
        let data = vec![row(&[("a", Value::from("1.5")), ("b", Value::from("2"))])];
        let mut stream = ListStream::new(data, vec!["a".into(), "b".into()])
            .with_sum_field("c", "", &["a", "b"]);
        let rows = stream.collect_rows().unwrap();
        assert_eq!(rows[0]["c"], Some(Value::Float(3.5)));
    }

    #[test]
    fn existing_header_is_not_duplicated() {
        let data = vec![row(&[("a", Value::Integer(4)), ("b", Value::Integer(0))])];
        let mut stream = ListStream::new(data, vec!["a".into(), "b".into()])
            .with_sum_field("b", "", &["a"]);
        assert_eq!(stream.headers(), vec!["a", "b"]);
        assert_eq!(stream.collect_rows().unwrap()[0]["b"], Some(Value::Integer(4)));
    }

    #[test]
    fn parse_sum_column_spec() {
        let parsed = SumColumn::parse("total=#affected+total:REF, ASY").unwrap();
        assert_eq!(parsed.name, "total");
        assert_eq!(parsed.tag, "#affected+total");
        assert_eq!(parsed.fields, vec!["REF", "ASY"]);

        let untagged = SumColumn::parse("total=a,b").unwrap();
        assert_eq!(untagged.tag, "");
        assert!(SumColumn::parse("total").is_err());
        assert!(SumColumn::parse("total=#t:").is_err());
    }
}
