use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use country_snapshot::error::{Operation, RenderError, ServiceError};
use country_snapshot::storage;
use country_snapshot::{CountryService, ListQuery, Settings};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "countries",
    version,
    about = "Refresh, query & summarize a local snapshot of country economics"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch both sources and replace the snapshot.
    Refresh,
    /// List countries (optionally filtered and sorted).
    List(ListArgs),
    /// Show one country by exact name.
    Get { name: String },
    /// Delete one country by exact name.
    Delete { name: String },
    /// Print the country count and last refresh time.
    Status,
    /// Copy the published summary image to a file.
    Summary {
        #[arg(long)]
        out: PathBuf,
    },
    /// Export the snapshot (format inferred by --format or extension).
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Exact region (e.g., Europe)
    #[arg(long)]
    region: Option<String>,
    /// Exact currency code (e.g., EUR)
    #[arg(long)]
    currency: Option<String>,
    /// gdp_asc or gdp_desc
    #[arg(long)]
    sort: Option<String>,
}

#[derive(ValueEnum, Clone, Debug)]
enum OutFormat {
    Csv,
    Json,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
    /// Output format (csv or json). If omitted, inferred from --out extension.
    #[arg(long, value_enum)]
    format: Option<OutFormat>,
}

/// What a successful command leaves for stdout.
enum Reply {
    Json(serde_json::Value),
    Done,
}

fn json<T: Serialize>(res: Result<T, ServiceError>) -> Result<Result<Reply, ServiceError>> {
    Ok(match res {
        Ok(v) => Ok(Reply::Json(serde_json::to_value(&v)?)),
        Err(e) => Err(e),
    })
}

/// Print a reply; a failed write is an error, not a silent success.
fn write_reply<W: Write>(out: &mut W, reply: &Reply) -> Result<()> {
    if let Reply::Json(v) = reply {
        writeln!(out, "{}", serde_json::to_string_pretty(v)?)?;
        out.flush()?;
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    // Refresh replaces the snapshot file wholesale, so a corrupt one must not block it.
    let service = match cli.cmd {
        Command::Refresh => CountryService::for_refresh(&cli.settings)?,
        _ => CountryService::from_settings(&cli.settings)?,
    };
    let (op, outcome) = run(&service, cli.cmd)?;
    service.close();

    match outcome {
        Ok(reply) => {
            write_reply(&mut io::stdout().lock(), &reply)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&e.body(op))?);
            // Exit code carries the boundary class: 4 for client errors, 1 otherwise.
            Ok(if e.status_code() < 500 {
                ExitCode::from(4)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn run(service: &CountryService, cmd: Command) -> Result<(Operation, Result<Reply, ServiceError>)> {
    Ok(match cmd {
        Command::Refresh => (Operation::Refresh, json(service.refresh())?),
        Command::List(args) => {
            let query = ListQuery {
                region: args.region,
                currency: args.currency,
                sort: args.sort,
            };
            (Operation::List, json(service.list(&query))?)
        }
        Command::Get { name } => (Operation::Get, json(service.get(&name))?),
        Command::Delete { name } => (Operation::Delete, json(service.delete(&name))?),
        Command::Status => (Operation::Status, json(service.status())?),
        Command::Summary { out } => {
            let res = service.summary_image().and_then(|a| {
                std::fs::write(&out, &a.bytes).map_err(|source| {
                    ServiceError::Render(RenderError::Publish {
                        path: out.clone(),
                        source,
                    })
                })?;
                eprintln!("Wrote {} ({}) to {}", a.content_type, a.bytes.len(), out.display());
                Ok(Reply::Done)
            });
            (Operation::Summary, res)
        }
        Command::Export(args) => (
            Operation::Export,
            cmd_export(service, args).map(|()| Reply::Done),
        ),
    })
}

fn cmd_export(service: &CountryService, args: ExportArgs) -> Result<(), ServiceError> {
    let records = service.list(&ListQuery::default())?;
    let path = &args.out;
    let fmt = match args.format {
        Some(OutFormat::Csv) => "csv",
        Some(OutFormat::Json) => "json",
        None => path.extension().and_then(|e| e.to_str()).unwrap_or("csv"),
    }
    .to_ascii_lowercase();
    match fmt.as_str() {
        "csv" => storage::export_csv(&records, path)?,
        "json" => storage::export_json(&records, path)?,
        other => {
            return Err(ServiceError::InvalidQuery(format!(
                "unsupported format: {other}"
            )));
        }
    }
    eprintln!("Saved {} rows to {}", records.len(), path.display());
    Ok(())
}
