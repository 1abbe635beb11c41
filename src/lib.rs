pub mod aggregate;
pub mod cli;
pub mod config;
pub mod convert;
pub mod country;
pub mod data;
pub mod derive;
pub mod export;
pub mod fields;
pub mod filter;
pub mod io_utils;
pub mod process;
pub mod quickchart;
pub mod serialize;
pub mod stream;
pub mod table;

use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    aggregate::Aggregation,
    cli::{Cli, Commands},
    config::Configuration,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("hxl_population", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(args) => process::execute(&args),
        Commands::Headers(args) => handle_headers(&args),
        Commands::Countries(args) => handle_countries(&args),
        Commands::Export(args) => handle_export(&args),
    }
}

fn handle_headers(args: &cli::HeadersArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Reading headers of '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let fields = process::load_field_schema(args.fields.as_deref(), args.config.as_deref())?;
    let mut reader = io_utils::open_csv_reader_from_path(&args.input, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {:?}", args.input))?;
    if !fields.expects_originals(&headers) {
        info!("Headers of {:?} already carry mapped names", args.input);
    }

    let converted = fields.convert_headers(&headers);
    let tags = fields.tag_mapping(false);
    let rows: Vec<Vec<String>> = converted
        .iter()
        .map(|name| {
            let source = headers
                .iter()
                .find(|original| fields.rename(original.as_str()) == name.as_str())
                .cloned()
                .unwrap_or_default();
            let tag = tags.get(name).cloned().unwrap_or_default();
            vec![source, name.clone(), tag]
        })
        .collect();
    table::print_table(
        &["original".to_string(), "name".to_string(), "tag".to_string()],
        &rows,
    );
    Ok(())
}

fn load_aggregation(
    config_path: &Path,
    data_dir: Option<&Path>,
    input_encoding: Option<&str>,
) -> Result<(Configuration, Aggregation)> {
    let config = Configuration::load(config_path)?;
    let encoding = io_utils::resolve_encoding(input_encoding)?;
    let data_dir: PathBuf = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let countries = config.country_table()?;
    debug!("{} country name(s) loaded", countries.len());
    let aggregation = export::aggregate_resources(&config, &data_dir, &countries, encoding)
        .with_context(|| format!("Aggregating resources listed in {config_path:?}"))?;
    Ok((config, aggregation))
}

fn handle_countries(args: &cli::CountriesArgs) -> Result<()> {
    let (_, aggregation) = load_aggregation(
        &args.config,
        args.data_dir.as_deref(),
        args.input_encoding.as_deref(),
    )?;
    let rows: Vec<Vec<String>> = aggregation
        .countries()
        .into_iter()
        .map(|country| {
            let (resources, row_count) = aggregation
                .country_data(&country.iso3)
                .map(|data| (data.len(), data.values().map(Vec::len).sum::<usize>()))
                .unwrap_or_default();
            vec![
                country.iso3,
                country.name,
                resources.to_string(),
                row_count.to_string(),
            ]
        })
        .collect();
    table::print_table(
        &[
            "iso3".to_string(),
            "name".to_string(),
            "resources".to_string(),
            "rows".to_string(),
        ],
        &rows,
    );
    info!("{} countries (including world)", rows.len());
    Ok(())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let (config, aggregation) = load_aggregation(
        &args.config,
        args.data_dir.as_deref(),
        args.input_encoding.as_deref(),
    )?;
    let exporter = export::Exporter::new(&config, &args.output_dir);
    let manifests = exporter.export_all(&aggregation, args.country.as_deref())?;
    if let Some(code) = &args.country
        && manifests.is_empty()
    {
        return Err(anyhow::anyhow!("No data exported for country '{code}'"));
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
