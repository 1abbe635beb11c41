use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Map, tag and export population statistics tables",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rename, decode and tag a CSV file using a field mapping
    Convert(ConvertArgs),
    /// Show how a field mapping renames and tags the headers of a CSV file
    Headers(HeadersArgs),
    /// Aggregate the configured resources and list the countries found
    Countries(CountriesArgs),
    /// Write per-country tagged tables, quick-chart data and dataset manifests
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input CSV file to convert (use '-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// YAML field mapping keyed by original field name
    #[arg(short = 'f', long = "fields", conflicts_with = "config")]
    pub fields: Option<PathBuf>,
    /// Project configuration whose `fields` section is used as the mapping
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Sum columns of the form `name=#tag:field1,field2` (original field names)
    #[arg(long = "sum", action = clap::ArgAction::Append)]
    pub sums: Vec<String>,
    /// Row-level filters such as `Year>=2020` or `ISO3CoO = AFG` (display names)
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Sort directives of the form `column[:asc|desc]` (display names)
    #[arg(long = "sort", action = clap::ArgAction::Append)]
    pub sort: Vec<String>,
    /// Limit number of rows emitted
    #[arg(long)]
    pub limit: Option<usize>,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to ',')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Render output as an elastic table to stdout instead of CSV
    #[arg(long = "table")]
    pub table: bool,
}

#[derive(Debug, Args)]
pub struct HeadersArgs {
    /// Input CSV file whose header line is inspected
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML field mapping keyed by original field name
    #[arg(short = 'f', long = "fields", conflicts_with = "config")]
    pub fields: Option<PathBuf>,
    /// Project configuration whose `fields` section is used as the mapping
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// CSV delimiter character
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct CountriesArgs {
    /// Project configuration listing resources and country names
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
    /// Folder holding the resource files (defaults to the configuration's folder)
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,
    /// Character encoding of the resource files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Project configuration listing resources, field mapping and country names
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
    /// Folder holding the resource files (defaults to the configuration's folder)
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,
    /// Folder receiving one sub-folder per country
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    /// Export a single country (ISO3 code, or 'world')
    #[arg(long = "country")]
    pub country: Option<String>,
    /// Character encoding of the resource files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
