//! Delimited-file I/O: readers, writers, encodings and delimiter resolution.
//!
//! Sources are read through `csv` byte records and decoded with
//! `encoding_rs` (UTF-8 by default, BOMs are sniffed and dropped). A file
//! can be opened either as a lazy single-pass [`SourceStream`] or loaded
//! fully as header + rows for aggregation. The `-` path stands for
//! stdin/stdout.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::{
    data::{Row, row_from_record},
    stream::{SourceStream, StreamError},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    })
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, String> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding).map_err(|message| anyhow!("Decoding headers: {message}"))
}

/// Opens `path` as a lazy, single-pass stream of string-valued rows.
pub fn csv_source_stream(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<SourceStream> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    let headers = reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;
    let row_headers = headers.clone();
    let rows = reader
        .into_byte_records()
        .enumerate()
        .map(move |(ordinal, result)| {
            let record = result.map_err(StreamError::from)?;
            let values = decode_record(&record, encoding).map_err(|message| {
                StreamError::Decode {
                    row: ordinal + 2,
                    message,
                }
            })?;
            Ok(row_from_record(&row_headers, values.iter().map(String::as_str)))
        });
    Ok(SourceStream::new(
        &path.display().to_string(),
        headers,
        rows,
    ))
}

/// Loads a whole delimited file into memory.
pub fn read_table(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<(Vec<String>, Vec<Row>)> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    let headers = reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;
    let mut rows = Vec::new();
    for (ordinal, result) in reader.into_byte_records().enumerate() {
        let record = result.with_context(|| format!("Reading row {} of {path:?}", ordinal + 2))?;
        let values = decode_record(&record, encoding)
            .map_err(|message| anyhow!("Row {} of {path:?}: {message}", ordinal + 2))?;
        rows.push(row_from_record(&headers, values.iter().map(String::as_str)));
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, stream::RowStream};
    use std::path::PathBuf;

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.tsv"), Some(b';')), b';');
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(resolve_encoding(Some("not-an-encoding")).is_err());
        assert_eq!(resolve_encoding(Some("latin1")).unwrap().name(), "windows-1252");
    }

    #[test]
    fn bom_is_stripped_from_first_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        std::fs::write(&path, "\u{feff}Year,REF\n2020,5\n").unwrap();
        let (headers, rows) = read_table(&path, b',', UTF_8).unwrap();
        assert_eq!(headers, vec!["Year", "REF"]);
        assert_eq!(rows[0]["REF"], Some(Value::from("5")));
    }

    #[test]
    fn csv_source_stream_is_single_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        let mut stream = csv_source_stream(&path, b',', UTF_8).unwrap();
        assert_eq!(stream.headers(), vec!["a", "b"]);
        assert_eq!(stream.collect_rows().unwrap().len(), 2);
        assert!(stream.reset().is_err());
    }
}
