use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use datawin::reader::find_embedded_form;
use datawin::{ChainTarget, DataWin, FormatVersion, FunctionClassification, Options, StringResolver};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datawin", about = "Inspect and rewrite GameMaker data.win files")]
struct Cli {
    /// JSON file with read/write options.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Format version to assume instead of the one GEN8 reports (e.g. "2.3").
    #[arg(long, global = true)]
    assume_version: Option<FormatVersion>,
    /// Increase log verbosity (-v, -vv, -vvv). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show header fields, chunk layout and object counts.
    Info {
        file: PathBuf,
    },
    /// List FUNC entries with their occurrence counts.
    Functions {
        file: PathBuf,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print local variable tables.
    Locals {
        file: PathBuf,
        /// Only the table of this code entry.
        #[arg(long)]
        code: Option<String>,
    },
    /// List the string pool, optionally only entries containing a substring.
    Strings {
        file: PathBuf,
        #[arg(long)]
        filter: Option<String>,
    },
    /// List every call site of a function.
    Refs {
        file: PathBuf,
        function: String,
    },
    /// Load a file and write it back out.
    Rewrite {
        input: PathBuf,
        output: PathBuf,
    },
    /// Load and re-save in memory, then compare with the original bytes.
    Verify {
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct FunctionRow<'a> {
    id: u32,
    name: &'a str,
    occurrences: u32,
    classification: FunctionClassification,
    autogenerated: bool,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("datawin={level},datawin_cli={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_options(cli: &Cli) -> Result<Options> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => Options::default(),
    };
    if let Some(version) = cli.assume_version {
        options.read.version_override = Some(version);
    }
    Ok(options)
}

fn load(path: &Path, options: &Options) -> Result<(Vec<u8>, DataWin)> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let dw = DataWin::parse_with(&data, &options.read)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = data.len(), "loaded");
    Ok((data, dw))
}

fn name<'a>(dw: &'a DataWin, s: datawin::StringRef) -> &'a str {
    dw.resolve(s).unwrap_or("<?>")
}

fn cmd_info(dw: &DataWin) {
    let gen8 = &dw.gen8;
    println!("name:              {}", name(dw, gen8.name));
    println!("display name:      {}", name(dw, gen8.display_name));
    println!("bytecode version:  {}", gen8.bytecode_version);
    println!("GEN8 version:      {}", gen8.version);
    println!("effective version: {}", dw.version);
    let layout: Vec<String> = dw
        .layout
        .iter()
        .map(|s| String::from_utf8_lossy(&s.magic()).into_owned())
        .collect();
    println!("chunks:            {}", layout.join(" "));
    println!("strings:           {}", dw.strings.len());
    println!("code entries:      {}", dw.code.entries.len());
    println!("functions:         {}", dw.func.functions.len());
    println!("variables:         {}", dw.vari.variables.len());
    println!("code locals:       {}", dw.func.code_locals.len());
}

fn cmd_functions(dw: &DataWin, json: bool) -> Result<()> {
    let rows: Vec<FunctionRow<'_>> = dw
        .func
        .functions
        .iter()
        .enumerate()
        .map(|(i, f)| FunctionRow {
            id: i as u32,
            name: name(dw, f.name),
            occurrences: f.occurrences,
            classification: f.classification,
            autogenerated: f.autogenerated,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in &rows {
        let auto = if row.autogenerated { " (auto)" } else { "" };
        println!(
            "{:>5}  {:<40} {:>6}  {:?}{auto}",
            row.id, row.name, row.occurrences, row.classification
        );
    }
    Ok(())
}

fn cmd_locals(dw: &DataWin, code: Option<&str>) -> Result<()> {
    let tables: Vec<_> = match code {
        Some(code) => match dw.func.locals_for(code, dw) {
            Some(table) => vec![table],
            None => bail!("no locals table for code entry {code:?}"),
        },
        None => dw.func.code_locals.iter().collect(),
    };
    for table in tables {
        println!("{}", name(dw, table.name));
        for local in &table.locals {
            println!("  {:>3}  {}", local.index, name(dw, local.name));
        }
    }
    Ok(())
}

fn cmd_strings(dw: &DataWin, filter: Option<&str>) {
    for (s, text) in dw.strings.iter() {
        if filter.map_or(true, |f| text.contains(f)) {
            println!("{:>6}  {text:?}", s.0);
        }
    }
}

fn cmd_refs(dw: &DataWin, function: &str) -> Result<()> {
    let Some((id, _)) = dw.function_by_name(function) else {
        bail!("no function named {function:?}");
    };
    for site in dw.references_to(ChainTarget::Function(id)) {
        let entry = &dw.code.entries[site.entry as usize];
        println!("{} #{}", name(dw, entry.name), site.index);
    }
    Ok(())
}

fn cmd_rewrite(input: &Path, output: &Path, options: &Options) -> Result<()> {
    let (_, dw) = load(input, options)?;
    let bytes = dw
        .to_bytes_with(&options.write)
        .with_context(|| format!("failed to serialize {}", input.display()))?;
    fs::write(output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;
    println!("wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

fn cmd_verify(path: &Path, options: &Options) -> Result<()> {
    let (data, dw) = load(path, options)?;
    let original = match data.starts_with(b"MZ").then(|| find_embedded_form(&data)).flatten() {
        Some(offset) => &data[offset..],
        None => &data[..],
    };
    let bytes = dw
        .to_bytes_with(&options.write)
        .with_context(|| format!("failed to serialize {}", path.display()))?;

    if bytes == original {
        println!("{}: identical ({} bytes)", path.display(), bytes.len());
        return Ok(());
    }
    let first_diff = bytes
        .iter()
        .zip(original)
        .position(|(a, b)| a != b)
        .unwrap_or(bytes.len().min(original.len()));
    bail!(
        "{}: re-encoded file differs at offset {first_diff:#x} ({} bytes vs {} original)",
        path.display(),
        bytes.len(),
        original.len()
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let options = load_options(&cli)?;

    match &cli.command {
        Command::Info { file } => {
            let (_, dw) = load(file, &options)?;
            cmd_info(&dw);
        }
        Command::Functions { file, json } => {
            let (_, dw) = load(file, &options)?;
            cmd_functions(&dw, *json)?;
        }
        Command::Locals { file, code } => {
            let (_, dw) = load(file, &options)?;
            cmd_locals(&dw, code.as_deref())?;
        }
        Command::Strings { file, filter } => {
            let (_, dw) = load(file, &options)?;
            cmd_strings(&dw, filter.as_deref());
        }
        Command::Refs { file, function } => {
            let (_, dw) = load(file, &options)?;
            cmd_refs(&dw, function)?;
        }
        Command::Rewrite { input, output } => cmd_rewrite(input, output, &options)?,
        Command::Verify { file } => cmd_verify(file, &options)?,
    }
    Ok(())
}
