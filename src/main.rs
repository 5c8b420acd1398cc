use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use tabconv::{
    ConversionSession, ConvertOptions, Converter, CsvOptions, DelimiterMode, IntakePolicy,
    JsonLayout, JsonOptions, StateKind, TabularFormat, XlsxOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabconv")]
#[command(about = "Convert tabular files between CSV, Excel and JSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file and save the result next to it (or in --out-dir)
    Convert {
        /// Source file
        input: PathBuf,

        /// Target format
        #[arg(long, value_enum)]
        to: FormatArg,

        /// Directory to save the result in
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Maximum input size in bytes
        #[arg(long, default_value_t = tabconv::intake::DEFAULT_MAX_BYTES)]
        max_size: u64,

        /// CSV input delimiter
        #[arg(long, value_enum, default_value_t = DelimiterArg::Auto)]
        delimiter: DelimiterArg,

        /// Keep every CSV field as text
        #[arg(long)]
        no_infer_numbers: bool,

        /// Shape of JSON output
        #[arg(long, value_enum, default_value_t = LayoutArg::Records)]
        json_layout: LayoutArg,

        /// Sheet name for Excel output
        #[arg(long)]
        sheet_name: Option<String>,

        /// Print a JSON summary of the result on stdout
        #[arg(long)]
        summary_json: bool,
    },

    /// Decode a file and print its extent and first rows
    Inspect {
        input: PathBuf,

        /// Number of rows to print
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Xlsx,
    Json,
}

impl From<FormatArg> for TabularFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => TabularFormat::Csv,
            FormatArg::Xlsx => TabularFormat::Xlsx,
            FormatArg::Json => TabularFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DelimiterArg {
    Auto,
    Comma,
    Semicolon,
    Tab,
}

impl From<DelimiterArg> for DelimiterMode {
    fn from(arg: DelimiterArg) -> Self {
        match arg {
            DelimiterArg::Auto => DelimiterMode::Auto,
            DelimiterArg::Comma => DelimiterMode::Fixed(b','),
            DelimiterArg::Semicolon => DelimiterMode::Fixed(b';'),
            DelimiterArg::Tab => DelimiterMode::Fixed(b'\t'),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Records,
    Rows,
}

impl From<LayoutArg> for JsonLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Records => JsonLayout::Records,
            LayoutArg::Rows => JsonLayout::Rows,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            input,
            to,
            out_dir,
            max_size,
            delimiter,
            no_infer_numbers,
            json_layout,
            sheet_name,
            summary_json,
        } => {
            let mut xlsx = XlsxOptions::new();
            if let Some(name) = sheet_name {
                xlsx = xlsx.with_sheet_name(&name);
            }
            let options = ConvertOptions::new()
                .with_csv(
                    CsvOptions::new()
                        .with_delimiter(delimiter.into())
                        .with_infer_numbers(!no_infer_numbers),
                )
                .with_xlsx(xlsx)
                .with_json(JsonOptions::new().with_layout(json_layout.into()));

            let converter = Converter::new(to.into()).with_options(options);
            let policy = converter.policy().clone().with_max_bytes(max_size);
            let converter = converter.with_policy(policy);

            convert(converter, input, out_dir, summary_json)
        }
        Commands::Inspect { input, rows } => inspect(input, rows),
    }
}

fn convert(
    converter: Converter,
    input: PathBuf,
    out_dir: Option<PathBuf>,
    summary_json: bool,
) -> anyhow::Result<()> {
    let file = converter
        .policy()
        .open(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let mut session = ConversionSession::new(converter);
    session
        .select_file(file)
        .with_context(|| format!("cannot convert {}", input.display()))?;

    if session.convert()? == StateKind::Failed {
        if let Some(err) = session.error() {
            bail!("{}: {}", input.display(), err);
        }
    }
    let Some(result) = session.result() else {
        bail!("{}: conversion produced no result", input.display());
    };

    let dir = match out_dir {
        Some(dir) => dir,
        None => input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let path = result
        .save_in(&dir)
        .with_context(|| format!("failed to save into {}", dir.display()))?;

    if summary_json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!(
            "{} -> {} ({} rows x {} columns, {} bytes)",
            input.display(),
            path.display(),
            result.rows(),
            result.columns(),
            result.byte_size()
        );
    }
    Ok(())
}

fn inspect(input: PathBuf, rows: usize) -> anyhow::Result<()> {
    let policy = IntakePolicy::new();
    let file = policy
        .open(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let converter = Converter::new(TabularFormat::Csv).with_policy(policy);
    let doc = converter
        .inspect(&file)
        .with_context(|| format!("cannot decode {}", input.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "{}: {} rows x {} columns",
        file.name,
        doc.row_count(),
        doc.column_count()
    )?;
    for row in doc.rows().iter().take(rows) {
        let fields: Vec<String> = row.iter().map(|cell| cell.as_string()).collect();
        writeln!(out, "{}", fields.join(" | "))?;
    }
    Ok(())
}
