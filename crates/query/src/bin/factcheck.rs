use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use query::{AppConfig, Outcome, Pipeline};

const EXIT_NO_TRIPLES: i32 = 2;
const EXIT_NO_EVIDENCE: i32 = 3;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Input text from the path in argv[1], or stdin when no path is given.
async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read input {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

async fn write_output(dir: &Path, name: String, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let input = std::env::args().nth(1).map(PathBuf::from);
    let stem = input
        .as_deref()
        .and_then(Path::file_stem)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".to_string());

    let config = AppConfig::from_env()?;
    info!(mode = ?config.mode, policy = ?config.retrieval.policy, "Starting factcheck");

    let text = read_input(input.as_deref()).await?;
    if text.trim().is_empty() {
        anyhow::bail!("Input text is empty");
    }

    let output_dir = config.paths.output_dir.clone();
    let pipeline = Pipeline::from_config(config)?;

    let report = match pipeline.run(&text).await? {
        Outcome::Judged(report) => report,
        Outcome::NoTriples => {
            error!("Extraction produced no triples");
            std::process::exit(EXIT_NO_TRIPLES);
        }
        Outcome::NoEvidence { triples } => {
            error!(triples = triples.len(), "No KG evidence matched the extracted triples");
            std::process::exit(EXIT_NO_EVIDENCE);
        }
    };

    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let evidence_path = write_output(&output_dir, format!("{}_evidence.txt", stem), &report.block).await?;
    let judgement_path = write_output(&output_dir, format!("{}_judgement.txt", stem), &report.verdict).await?;

    info!(
        triples = report.triples.len(),
        evidence = report.evidence.lines.len(),
        evidence_path = %evidence_path.display(),
        judgement_path = %judgement_path.display(),
        "Factcheck complete"
    );

    println!("{}", report.verdict);
    Ok(())
}
