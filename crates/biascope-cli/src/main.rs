use anyhow::{bail, Context, Result};
use biascope_core::{aggregate, apply_edits, merge_panel, segment, BiasOracle, DocumentSource, Edit};
use biascope_local::oracle::{builtin_reviewers, ChatOracle, ReviewerPersona};
use biascope_local::{article_request, WikiSource};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "biascope")]
#[command(about = "Bias density analysis and correction for long-form documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a document's sections (json).
    Sections(SectionsCmd),
    /// Sample the bias oracle over sections and aggregate a phrase heatmap (json).
    Analyze(AnalyzeCmd),
    /// Run a reviewer panel over one document and merge its findings (json).
    Panel(PanelCmd),
    /// Apply an edit batch to a document (corrected text out).
    Apply(ApplyCmd),
    /// Print version info (json).
    Version,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Wikipedia article URL to fetch and analyze.
    #[arg(long, conflicts_with = "file")]
    url: Option<String>,
    /// Local text/markdown file to analyze instead of fetching.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Disable the page cache for this run.
    #[arg(long, default_value_t = false)]
    no_cache: bool,
    /// Page cache directory (default: user cache dir).
    #[arg(long, env = "BIASCOPE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct OracleArgs {
    /// Model for the oracle (falls back to BIASCOPE_OPENAI_COMPAT_MODEL).
    #[arg(long)]
    model: Option<String>,
    /// Per-call oracle timeout in milliseconds.
    #[arg(long, default_value_t = 60_000)]
    oracle_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct SectionsCmd {
    #[command(flatten)]
    input: InputArgs,
    /// Output JSON path (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct AnalyzeCmd {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    oracle: OracleArgs,
    /// Analyze only this section (default: every section).
    #[arg(long)]
    section: Option<String>,
    /// Oracle samples per section.
    #[arg(long, default_value_t = 10)]
    runs: u32,
    /// Output JSON path (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct PanelCmd {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    oracle: OracleArgs,
    /// Review only this section (default: the whole document).
    #[arg(long)]
    section: Option<String>,
    /// Reviewer personas file (json list of {tag, system_prompt}); default: built-in panel.
    #[arg(long)]
    personas: Option<PathBuf>,
    /// Output JSON path (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ApplyCmd {
    /// Document file to correct.
    #[arg(long)]
    file: PathBuf,
    /// Edit batch (json list of {rationale, text_removed, text_added}).
    #[arg(long)]
    edits: PathBuf,
    /// Output path for the corrected document (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,
}

struct LoadedDocument {
    source: String,
    title: Option<String>,
    text: String,
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("biascope"))
}

async fn load_document(input: &InputArgs) -> Result<LoadedDocument> {
    if let Some(url) = &input.url {
        let cache_dir = if input.no_cache {
            None
        } else {
            input.cache_dir.clone().or_else(default_cache_dir)
        };
        let source = WikiSource::new(cache_dir)?;
        let mut req = article_request(url);
        if input.no_cache {
            req.cache.read = false;
            req.cache.write = false;
        }
        let doc = source.fetch(&req).await?;
        Ok(LoadedDocument {
            source: url.clone(),
            title: doc.title,
            text: doc.text,
        })
    } else if let Some(path) = &input.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(LoadedDocument {
            source: path.display().to_string(),
            title: None,
            text,
        })
    } else {
        bail!("pass --url or --file");
    }
}

fn emit(value: &serde_json::Value, out: Option<&PathBuf>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct SectionRow {
    name: String,
    chars: usize,
}

async fn run_sections(cmd: SectionsCmd) -> Result<()> {
    let doc = load_document(&cmd.input).await?;
    let sections = segment(&doc.text);
    let rows: Vec<SectionRow> = sections
        .iter()
        .map(|s| SectionRow {
            name: s.name.clone(),
            chars: s.body.chars().count(),
        })
        .collect();
    emit(
        &serde_json::json!({
            "source": doc.source,
            "title": doc.title,
            "sections": rows,
        }),
        cmd.out.as_ref(),
    )
}

async fn run_analyze(cmd: AnalyzeCmd) -> Result<()> {
    let doc = load_document(&cmd.input).await?;
    let mut sections = segment(&doc.text);
    if let Some(wanted) = &cmd.section {
        sections.retain(|s| &s.name == wanted);
        if sections.is_empty() {
            bail!("section not found: {wanted}");
        }
    }

    let client = reqwest::Client::new();
    let oracle = ChatOracle::from_env(client, cmd.oracle.model.clone())?
        .with_timeout_ms(cmd.oracle.oracle_timeout_ms);

    let mut rows = Vec::with_capacity(sections.len());
    for section in &sections {
        tracing::debug!(section = %section.name, runs = cmd.runs, "sampling section");
        let report = aggregate(&section.body, cmd.runs, &oracle).await;
        if report.samples_ok == 0 && cmd.runs > 0 {
            tracing::warn!(section = %section.name, "every oracle sample failed");
        }
        rows.push(serde_json::json!({
            "section": section.name,
            "report": report,
        }));
    }

    emit(
        &serde_json::json!({
            "source": doc.source,
            "title": doc.title,
            "oracle": oracle.name(),
            "runs": cmd.runs,
            "sections": rows,
        }),
        cmd.out.as_ref(),
    )
}

fn load_personas(path: Option<&PathBuf>) -> Result<Vec<ReviewerPersona>> {
    let Some(path) = path else {
        return Ok(builtin_reviewers());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let personas: Vec<ReviewerPersona> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    if personas.is_empty() {
        bail!("personas file is empty: {}", path.display());
    }
    Ok(personas)
}

async fn run_panel(cmd: PanelCmd) -> Result<()> {
    let doc = load_document(&cmd.input).await?;
    let text = match &cmd.section {
        Some(wanted) => segment(&doc.text)
            .into_iter()
            .find(|s| &s.name == wanted)
            .map(|s| s.body)
            .with_context(|| format!("section not found: {wanted}"))?,
        None => doc.text.clone(),
    };

    let personas = load_personas(cmd.personas.as_ref())?;
    let client = reqwest::Client::new();

    let mut panels: Vec<(String, Vec<biascope_core::Finding>)> = Vec::new();
    let mut sources_failed: Vec<String> = Vec::new();
    for persona in &personas {
        let oracle = ChatOracle::from_env(client.clone(), cmd.oracle.model.clone())?
            .with_persona(persona)
            .with_timeout_ms(cmd.oracle.oracle_timeout_ms);
        match oracle.analyze(&text).await {
            Ok(findings) => panels.push((persona.tag.clone(), findings)),
            Err(e) => {
                tracing::warn!(reviewer = %persona.tag, error = %e, "reviewer failed");
                sources_failed.push(persona.tag.clone());
            }
        }
    }

    let report = merge_panel(&text, &panels);
    emit(
        &serde_json::json!({
            "source": doc.source,
            "title": doc.title,
            "section": cmd.section,
            "sources_ok": panels.iter().map(|(tag, _)| tag.clone()).collect::<Vec<_>>(),
            "sources_failed": sources_failed,
            "report": report,
        }),
        cmd.out.as_ref(),
    )
}

fn run_apply(cmd: ApplyCmd) -> Result<()> {
    let document = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("reading {}", cmd.file.display()))?;
    let raw = std::fs::read_to_string(&cmd.edits)
        .with_context(|| format!("reading {}", cmd.edits.display()))?;
    let edits: Vec<Edit> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", cmd.edits.display()))?;

    let corrected = apply_edits(&document, &edits)?;
    match &cmd.out {
        Some(path) => {
            std::fs::write(path, &corrected)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => print!("{corrected}"),
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("BIASCOPE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sections(cmd) => run_sections(cmd).await,
        Commands::Analyze(cmd) => run_analyze(cmd).await,
        Commands::Panel(cmd) => run_panel(cmd).await,
        Commands::Apply(cmd) => run_apply(cmd),
        Commands::Version => emit(
            &serde_json::json!({
                "name": "biascope",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            None,
        ),
    }
}
