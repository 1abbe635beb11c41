//! Tagged delimited output.
//!
//! The layout is fixed: the header line, then the HXL tag line (one entry
//! per header, empty when untagged), then one line per row. Text cells are
//! quoted, numeric-looking cells are written bare and nulls are empty.

use std::io::Write;

use csv::QuoteStyle;

use crate::{
    data::cell_display,
    stream::{Result, RowStream},
};

pub fn tagged_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::NonNumeric)
        .double_quote(true)
        .from_writer(writer)
}

/// Drains `stream` into `writer`, returning the number of data rows written.
pub fn write_tagged<S, W>(stream: &mut S, writer: W, delimiter: u8) -> Result<usize>
where
    S: RowStream + ?Sized,
    W: Write,
{
    let headers = stream.headers();
    let mut out = tagged_writer(writer, delimiter);
    out.write_record(&headers)?;
    out.write_record(stream.tag_row())?;
    let mut written = 0usize;
    while let Some(row) = stream.next_row()? {
        out.write_record(
            headers
                .iter()
                .map(|header| row.get(header).map(cell_display).unwrap_or_default()),
        )?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

pub fn to_csv_string<S: RowStream + ?Sized>(stream: &mut S) -> Result<String> {
    let mut buffer = Vec::new();
    write_tagged(stream, &mut buffer, b',')?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
