//! Offline reader for penumbra insert logs.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use penumbra::db::record::decode_record;
use penumbra::db::WalOp;
use penumbra::{init_logging, FileWal, Schema, SchemaRegistry};

#[derive(Parser, Debug)]
#[command(
    name = "penumbra-inspect",
    version,
    about = "Decode and summarize a penumbra insert log",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(value_name = "WAL", help = "Log file to read")]
    wal: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        env = "PENUMBRA_SCHEMA",
        help = "TOML schema the log was written against"
    )]
    schema: PathBuf,

    #[arg(long, default_value = "warn", help = "Tracing filter directive")]
    log: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Print every record with its operations (default).
    Records {
        #[arg(long, help = "Also dump each record as hex")]
        hex: bool,
    },
    /// Print record and operation totals.
    Stats,
}

#[derive(Default)]
struct Totals {
    records: u64,
    bytes: u64,
    vertices: u64,
    edges: u64,
    first_timestamp: Option<u64>,
    last_timestamp: u64,
}

fn label_name(name: Result<&str, penumbra::PenumbraError>, raw: u8) -> String {
    name.map_or_else(|_| format!("#{raw}"), str::to_owned)
}

fn describe(op: &WalOp, schema: &Schema) -> String {
    match op {
        WalOp::InsertVertex {
            label,
            id,
            properties,
        } => {
            let names = schema.vertex_property_names(*label).unwrap_or(&[]);
            let props = properties
                .iter()
                .enumerate()
                .map(|(i, value)| match names.get(i) {
                    Some(name) => format!("{name}={value}"),
                    None => value.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "vertex {}[{id}] {{{props}}}",
                label_name(schema.vertex_label_name(*label), label.0)
            )
        }
        WalOp::InsertEdge {
            src_label,
            src,
            dst_label,
            dst,
            label,
            property,
        } => format!(
            "edge {}[{src}] -[{}]-> {}[{dst}] {property}",
            label_name(schema.vertex_label_name(*src_label), src_label.0),
            label_name(schema.edge_label_name(*label), label.0),
            label_name(schema.vertex_label_name(*dst_label), dst_label.0),
        ),
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let schema = Schema::load(&cli.schema)?;
    let command = cli.command.unwrap_or(Command::Records { hex: false });
    let mut totals = Totals::default();
    for (index, record) in FileWal::read_path(&cli.wal)?.enumerate() {
        let record = record?;
        let decoded = decode_record(&record, &schema)?;
        totals.records += 1;
        totals.bytes += record.len() as u64;
        totals.first_timestamp.get_or_insert(decoded.header.timestamp);
        totals.last_timestamp = totals.last_timestamp.max(decoded.header.timestamp);
        for op in &decoded.ops {
            match op {
                WalOp::InsertVertex { .. } => totals.vertices += 1,
                WalOp::InsertEdge { .. } => totals.edges += 1,
            }
        }
        if let Command::Records { hex } = command {
            println!(
                "#{index} ts={} len={} ops={}",
                decoded.header.timestamp,
                decoded.header.length,
                decoded.ops.len()
            );
            for op in &decoded.ops {
                println!("  {}", describe(op, &schema));
            }
            if hex {
                println!("  {}", hex::encode(&record));
            }
        }
    }
    if let Command::Stats = command {
        println!("records: {}", totals.records);
        println!("bytes: {}", totals.bytes);
        println!("vertices: {}", totals.vertices);
        println!("edges: {}", totals.edges);
        match totals.first_timestamp {
            Some(first) => println!("timestamps: {first}..={}", totals.last_timestamp),
            None => println!("timestamps: none"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
