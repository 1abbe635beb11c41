use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};

use crate::{
    cli::ConvertArgs,
    config::Configuration,
    data::cell_display,
    derive::parse_sum_columns,
    fields::FieldSchema,
    filter::{evaluate_conditions, parse_filters},
    io_utils,
    serialize::write_tagged,
    stream::RowStream,
    table,
};

/// Field mapping from `--fields`, or from the `fields` section of `--config`.
pub fn load_field_schema(fields: Option<&Path>, config: Option<&Path>) -> Result<Arc<FieldSchema>> {
    match (fields, config) {
        (Some(path), _) => Ok(Arc::new(
            FieldSchema::load(path).with_context(|| format!("Loading field mapping {path:?}"))?,
        )),
        (None, Some(path)) => Ok(Configuration::load(path)?.field_schema()),
        (None, None) => {
            warn!("No field mapping given; headers are passed through untagged");
            Ok(Arc::new(FieldSchema::default()))
        }
    }
}

pub fn execute(args: &ConvertArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let output_delimiter = args
        .output_delimiter
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let output_path = args.output.as_deref();
    let writing_to_stdout = output_path.is_none_or(io_utils::is_dash);
    info!(
        "Converting '{}' -> {:?} (delimiter '{}', output '{}')",
        args.input.display(),
        output_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into()),
        crate::printable_delimiter(delimiter),
        crate::printable_delimiter(output_delimiter)
    );

    let fields = load_field_schema(args.fields.as_deref(), args.config.as_deref())?;
    let sums = parse_sum_columns(&args.sums)?;
    let filters = parse_filters(&args.filters)?;
    let sorts = args
        .sort
        .iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(SortDirective::parse)
        .collect::<Result<Vec<_>>>()?;

    let source = io_utils::csv_source_stream(&args.input, delimiter, encoding)?;
    let mut stream: Box<dyn RowStream> = Box::new(source);
    for sum in &sums {
        debug!("Sum column '{}' over {:?}", sum.name, sum.fields);
        let summed: Vec<&str> = sum.fields.iter().map(String::as_str).collect();
        stream = Box::new(stream.with_sum_field(&sum.name, &sum.tag, &summed));
    }
    stream = Box::new(
        stream
            .with_fields(&fields)
            .with_context(|| format!("Applying field mapping to {:?}", args.input))?,
    );

    let headers = stream.headers();
    for condition in &filters {
        if !headers.contains(&condition.column) {
            warn!("Filter column '{}' is not among the output headers", condition.column);
        }
    }
    if !filters.is_empty() {
        stream = Box::new(stream.select(|row| evaluate_conditions(&filters, row))?);
    }
    for directive in sorts.iter().rev() {
        if !headers.contains(&directive.column) {
            return Err(anyhow!("Sort column '{}' not found", directive.column));
        }
        stream = Box::new(stream.sort_by(&directive.column, !directive.ascending)?);
    }
    if let Some(limit) = args.limit {
        let mut seen = 0usize;
        stream = Box::new(stream.select(|_| {
            seen += 1;
            seen <= limit
        })?);
    }

    if args.table {
        if !writing_to_stdout {
            debug!("--table requested but output will remain CSV because a file path was provided");
        } else {
            let mut lines = vec![stream.tag_row()];
            while let Some(row) = stream.next_row()? {
                lines.push(
                    headers
                        .iter()
                        .map(|header| row.get(header).map(cell_display).unwrap_or_default())
                        .collect(),
                );
            }
            table::print_table(&headers, &lines);
            info!("Rendered {} row(s) as a table", lines.len() - 1);
            return Ok(());
        }
    }

    let writer = io_utils::open_output(output_path)?;
    let written = write_tagged(stream.as_mut(), writer, output_delimiter)
        .with_context(|| format!("Writing converted rows from {:?}", args.input))?;
    info!("Converted {written} row(s)");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    pub column: String,
    pub ascending: bool,
}

impl SortDirective {
    pub fn parse(spec: &str) -> Result<Self> {
        let (column, direction) = match spec.rsplit_once(':') {
            Some((column, direction)) => (column, direction),
            None => (spec, "asc"),
        };
        let column = Some(column.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Sort directive is missing a column"))?;
        let ascending = match direction.trim().to_ascii_lowercase().as_str() {
            "asc" => true,
            "desc" => false,
            other => {
                return Err(anyhow!("Unknown sort direction '{other}'"));
            }
        };
        Ok(SortDirective {
            column: column.to_string(),
            ascending,
        })
    }
}
