//! metaflat-flatten: Flatten nested JSON into key-path rows or registry tables
//!
//! Usage:
//!   # Flatten each object of a JSON array, NDJSON to stdout
//!   metaflat-flatten tables.json
//!
//!   # Read NDJSON from stdin
//!   echo '{"id": 1, "bucket": {"id": "in.c-main"}}' | metaflat-flatten --ndjson
//!
//!   # Project onto a registry table, CSV to stdout
//!   metaflat-flatten tables.json --table tables --context region=keboola.com --context project_id=7
//!
//!   # Write the table and its manifest into a directory
//!   metaflat-flatten tables.json --table tables --output-dir ./out

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use metaflat::flatten::{FlattenConfig, JsonFlattener, ParentContext};
use metaflat::flatten_json_lines;
use metaflat::table::{registry, TableDefinition, TableWriter};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "metaflat-flatten")]
#[command(about = "Flatten nested JSON into key-path rows or registry tables", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Process newline-delimited JSON (one JSON object per line)
    #[arg(long)]
    ndjson: bool,

    /// Don't treat top-level arrays as object streams
    #[arg(long)]
    no_ignore_array: bool,

    /// Registry table to project rows onto; without it rows are printed as NDJSON
    #[arg(long, short = 't')]
    table: Option<String>,

    /// Write <table>.csv and its manifest here instead of stdout
    #[arg(long, short = 'o', requires = "table")]
    output_dir: Option<PathBuf>,

    /// Separator between key-path segments (default: "_")
    #[arg(long)]
    separator: Option<String>,

    /// Expand lists by index instead of keeping them as JSON text
    #[arg(long)]
    flatten_lists: bool,

    /// Comma-separated keys whose values are kept whole
    #[arg(long)]
    preserve_keys: Option<String>,

    /// Parent context entry, KEY=VALUE; VALUE is parsed as JSON when it can be
    #[arg(long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build config
    let mut config = FlattenConfig::default();
    if let Some(sep) = args.separator.clone() {
        config.separator = sep;
    }
    config.flatten_lists = args.flatten_lists;
    if let Some(keys) = &args.preserve_keys {
        config.preserve_keys = keys
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let parent = parse_context(&args.context)?;
    let reader = open_input(args.input.as_ref())?;
    let split_arrays = !args.no_ignore_array;

    match &args.table {
        None => {
            let records = if args.ndjson {
                read_json_lines(reader)?
            } else {
                read_document(reader, split_arrays)?
            };
            write_flat_rows(records, config)
        }
        Some(table) => {
            let schema = registry::lookup(table)?;
            let definition = Arc::new(TableDefinition::from_schema(schema, false));

            if let Some(dir) = &args.output_dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let mut writer = TableWriter::create(dir, definition, config)?;
                write_table(reader, &mut writer, &parent, args.ndjson, split_arrays)?;
                eprintln!("{} rows written to {}", writer.rows_written(), dir.display());
            } else {
                let stdout = std::io::stdout();
                let mut writer = TableWriter::from_writer(definition, config, stdout.lock());
                write_table(reader, &mut writer, &parent, args.ndjson, split_arrays)?;
            }
            Ok(())
        }
    }
}

/// Project the input onto a table; NDJSON is streamed line by line
fn write_table<W: Write>(
    reader: Box<dyn BufRead>,
    writer: &mut TableWriter<W>,
    parent: &ParentContext,
    ndjson: bool,
    split_arrays: bool,
) -> Result<()> {
    if ndjson {
        flatten_json_lines(reader, writer, parent)?;
    } else {
        writer.write_rows(read_document(reader, split_arrays)?, parent)?;
        writer.flush()?;
    }
    Ok(())
}

/// Parse repeated KEY=VALUE options into a parent context
fn parse_context(entries: &[String]) -> Result<ParentContext> {
    let mut parent = ParentContext::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("context entry `{}` is not KEY=VALUE", entry);
        };
        let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
        parent.insert(key.trim(), value);
    }
    Ok(parent)
}

fn open_input(input: Option<&PathBuf>) -> Result<Box<dyn BufRead>> {
    Ok(if let Some(path) = input {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Box::new(BufReader::new(file)) as Box<dyn BufRead>
    } else {
        Box::new(BufReader::new(std::io::stdin())) as Box<dyn BufRead>
    })
}

/// Read a stream of concatenated JSON values
fn read_json_lines(reader: Box<dyn BufRead>) -> Result<Vec<Value>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<Value>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to parse JSON lines")
}

/// Read a whole document with simd-json; a top-level array is a record stream
fn read_document(mut reader: Box<dyn BufRead>, split_arrays: bool) -> Result<Vec<Value>> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![]);
    }
    let document: Value =
        simd_json::serde::from_slice(&mut content).context("Failed to parse JSON")?;

    Ok(match document {
        Value::Array(items) if split_arrays => items,
        other => vec![other],
    })
}

/// Print flattened rows as NDJSON
fn write_flat_rows(records: Vec<Value>, config: FlattenConfig) -> Result<()> {
    let flattener = JsonFlattener::new(config);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for record in records {
        let row = flattener.flatten(record);
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
    }

    out.flush()?;
    Ok(())
}
