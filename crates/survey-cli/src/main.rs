mod serve;

use std::env;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use survey_engine::{FileStore, LoadedSurvey, SurveyEngine, load_survey};
use survey_spec::{RespondentDocument, SurveyDocument, render_page};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const OUTPUT_DIR_ENV: &str = "SURVEY_OUTPUT_DIR";
const URL_BASE_ENV: &str = "SURVEY_URL_BASE";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Multi-page survey server",
    long_about = "Serves a declarative multi-page survey one page at a time and stores every respondent's answers as JSON"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the survey over HTTP.
    Serve {
        /// Path to the survey specification JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Folder receiving one `<token>.json` per respondent (defaults to SURVEY_OUTPUT_DIR).
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Address to listen on.
        #[arg(short = 'a', long, default_value = "127.0.0.1")]
        addr: String,
        /// Port to listen on.
        #[arg(short = 'p', long, default_value_t = 8080)]
        port: u16,
        /// URL prefix the survey is served under (overrides the document's `urlbase`, defaults to SURVEY_URL_BASE).
        #[arg(long, value_name = "PREFIX")]
        base_url: Option<String>,
    },
    /// Load and dry-run a specification, listing its pages.
    Check {
        /// Path to the survey specification JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
    },
    /// Print the markup of a single page.
    Preview {
        /// Path to the survey specification JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Zero-based page index.
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Optional respondent document to render against.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Session token exposed to templates.
        #[arg(long, default_value = "preview")]
        token: String,
    },
    /// Print the JSON Schema of the survey document format.
    Schema,
}

fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            spec,
            output,
            addr,
            port,
            base_url,
        } => run_serve(spec, output, addr, port, base_url),
        Command::Check { spec } => run_check(spec),
        Command::Preview {
            spec,
            page,
            answers,
            token,
        } => run_preview(spec, page, answers, token),
        Command::Schema => run_schema(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_serve(
    spec_path: PathBuf,
    output: Option<PathBuf>,
    addr: String,
    port: u16,
    base_url: Option<String>,
) -> CliResult<()> {
    let output = resolve_output_dir(output)?;
    let loaded = load_survey(&spec_path)?;
    let mut engine = SurveyEngine::from_loaded(loaded, Box::new(FileStore::new(output)));
    if let Some(base) = base_url.or_else(|| env::var(URL_BASE_ENV).ok()) {
        engine = engine.with_base_url(&base);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve::run(engine, &addr, port))
}

fn resolve_output_dir(output: Option<PathBuf>) -> CliResult<PathBuf> {
    let candidate = match output {
        Some(path) => path,
        None => env::var_os(OUTPUT_DIR_ENV)
            .map(PathBuf::from)
            .ok_or("no output directory: pass --output or set SURVEY_OUTPUT_DIR")?,
    };
    if candidate.as_os_str().is_empty() {
        return Err("output directory cannot be empty".into());
    }
    Ok(candidate)
}

fn run_check(spec_path: PathBuf) -> CliResult<()> {
    let LoadedSurvey { spec, report, .. } = load_survey(&spec_path)?;
    println!("Survey: {}", spec.title);
    println!("Pages: {}", spec.len());
    let unreachable = report.unreachable();
    for (index, page_id) in report.page_ids.iter().enumerate() {
        let mut entry = format!(" {:>3} {}", index, page_id);
        if index == report.terminal_index {
            entry.push_str(" [end]");
        } else if unreachable.contains(&index) {
            entry.push_str(" [unreachable]");
        }
        println!("{}", entry);
    }
    Ok(())
}

fn run_preview(
    spec_path: PathBuf,
    page: usize,
    answers_path: Option<PathBuf>,
    token: String,
) -> CliResult<()> {
    let LoadedSurvey { spec, assets, .. } = load_survey(&spec_path)?;
    let doc = match answers_path {
        Some(path) => read_document(&path)?,
        None => RespondentDocument::new(),
    };
    let url = format!("?pix={}&token={}", page + 1, token);
    let rendered = render_page(&spec, page, &url, &token, &doc, &assets)?;
    println!("{}", rendered.markup);
    Ok(())
}

fn read_document(path: &std::path::Path) -> CliResult<RespondentDocument> {
    let contents = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&contents)?;
    match value {
        Value::Object(doc) => Ok(doc),
        _ => Err(format!("{} is not a JSON object", path.display()).into()),
    }
}

fn run_schema() -> CliResult<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&SurveyDocument::json_schema())?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_output_dir_wins() {
        let dir = resolve_output_dir(Some(PathBuf::from("answers"))).expect("output");
        assert_eq!(dir, PathBuf::from("answers"));
    }

    #[test]
    fn empty_output_dir_is_rejected() {
        assert!(resolve_output_dir(Some(PathBuf::new())).is_err());
    }

    #[test]
    fn cli_parses_serve_flags() {
        let cli = Cli::try_parse_from([
            "greentic-survey",
            "serve",
            "--spec",
            "survey.json",
            "--output",
            "out",
            "-p",
            "9000",
        ])
        .expect("parse");
        match cli.command {
            Command::Serve {
                spec, port, addr, ..
            } => {
                assert_eq!(spec, PathBuf::from("survey.json"));
                assert_eq!(port, 9000);
                assert_eq!(addr, "127.0.0.1");
            }
            _ => panic!("expected serve"),
        }
    }
}
