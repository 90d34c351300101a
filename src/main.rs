#![forbid(unsafe_code)]
//! # Opinion Garden CLI
//!
//! Command-line front end for the `opinion_garden` crate. Reads opinions (one
//! per line) from a file or stdin, folds them into opinion clusters and prints
//! the resulting deliberation map.
//!
//! ## Features
//! - Offline lexicon classifier by default, OpenAI-compatible chat classifier
//!   when an API key is given.
//! - Tunable merge threshold, similarity metric and score view.
//! - Optional seed opinions planted before the first submission.
//! - Summary filtering and sorting (keyword, minimum score or civility,
//!   per-keyword cap).
//! - Export of clusters (txt, csv, tsv, json) and of the projected map (json).
//!
//! ## Example
//! ```bash
//! cargo run --release -- opinions.txt --threshold 0.7 --export-format csv --export-dir out
//! cargo run --release -- opinions.txt --seed-garden --sort score --per-keyword 4 --min-civility 0.4
//! ```
//!
//! See `--help` for all available options.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use opinion_garden::export::render_summary;
use opinion_garden::{
    ChatClassifier, Classifier, ClusterQuery, ClusterStore, Engine, EngineConfig, Error,
    ExportFormat, Lexicon, LexiconClassifier, Metric, ScoreView, SeedOpinion, SharedEngine,
    SortKey, SubmissionOutcome, SubmitError, default_garden, export_clusters, export_map,
    load_seeds, projection,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// File with one opinion per line (reads stdin when omitted or "-")
    input: Option<String>,

    /// JSON engine config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON lexicon for the offline classifier
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Merge threshold for the similarity ratio, in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,

    /// Similarity metric
    #[arg(long, value_enum)]
    metric: Option<Metric>,

    /// Score view (representativeness or polarity)
    #[arg(long, value_enum)]
    view: Option<ScoreView>,

    /// Match against all clusters instead of only those sharing the keyword
    #[arg(long, default_value_t = false)]
    no_keyword_scope: bool,

    /// Output format for the cluster export (txt, csv, tsv, json)
    #[arg(long, default_value = "txt")]
    export_format: ExportFormat,

    /// Directory to write the cluster and map exports to
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// JSON file of seed opinions to plant before the first submission
    #[arg(long, conflicts_with = "seed_garden")]
    seed: Option<PathBuf>,

    /// Plant the built-in seed opinions for the default topic
    #[arg(long, default_value_t = false)]
    seed_garden: bool,

    /// Sort order of the printed summary
    #[arg(long, value_enum, default_value = "support-count")]
    sort: SortKey,

    /// Only show clusters with this keyword
    #[arg(long)]
    keyword: Option<String>,

    /// Only show clusters scoring at least this much
    #[arg(long)]
    min_score: Option<f64>,

    /// Only show clusters whose mean civility is at least this much
    #[arg(long)]
    min_civility: Option<f64>,

    /// Show at most this many clusters per keyword
    #[arg(long)]
    per_keyword: Option<usize>,

    /// Show at most this many clusters
    #[arg(long)]
    limit: Option<usize>,

    /// Classify all opinions in parallel before folding them in input order
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// API key for the chat classifier; the offline classifier is used without one
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model name
    #[arg(long, default_value = ChatClassifier::DEFAULT_MODEL)]
    model: String,

    /// Chat completions endpoint
    #[arg(long, default_value = ChatClassifier::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Chat request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn load_config(cli: &Cli) -> Result<EngineConfig, Error> {
    let mut cfg = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(t) = cli.threshold {
        cfg.matching.threshold = t;
    }
    if let Some(m) = cli.metric {
        cfg.matching.metric = m;
    }
    if let Some(v) = cli.view {
        cfg.scoring.view = v;
        if v == ScoreView::Polarity && cli.config.is_none() {
            cfg.scoring.baseline = 0.0;
        }
    }
    if cli.no_keyword_scope {
        cfg.matching.keyword_scoped = false;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load_seed_opinions(cli: &Cli) -> Result<Vec<SeedOpinion>, Error> {
    if let Some(path) = &cli.seed {
        let seeds = load_seeds(path)?;
        info!("Loaded {} seed opinions from {}", seeds.len(), path.display());
        Ok(seeds)
    } else if cli.seed_garden {
        Ok(default_garden())
    } else {
        Ok(Vec::new())
    }
}

fn summary_query(cli: &Cli) -> ClusterQuery {
    ClusterQuery {
        keyword: cli.keyword.clone(),
        min_score: cli.min_score,
        min_civility: cli.min_civility,
        sort: cli.sort,
        per_keyword: cli.per_keyword,
        limit: cli.limit,
    }
}

fn read_opinions(input: Option<&str>) -> Result<Vec<String>, Error> {
    let raw = match input {
        None | Some("-") => io::read_to_string(io::stdin())?,
        Some(path) => fs::read_to_string(path)?,
    };
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn report(index: usize, result: &Result<SubmissionOutcome, SubmitError>) -> bool {
    match result {
        Ok(outcome) => {
            println!("{:>3}. {outcome}", index + 1);
            true
        }
        Err(e) => {
            error!("Opinion {} failed: {}", index + 1, e);
            println!("{:>3}. failed ({e})", index + 1);
            false
        }
    }
}

/// Returns the final store and whether every submission went through.
fn fold_all<C: Classifier + Sync>(
    classifier: C,
    cfg: EngineConfig,
    seeds: &[SeedOpinion],
    opinions: &[String],
    parallel: bool,
) -> Result<(ClusterStore, bool), Error> {
    let mut all_ok = true;
    if parallel {
        let engine = SharedEngine::new(classifier, cfg)?;
        engine.plant(seeds)?;
        for (i, r) in engine.submit_batch(opinions).iter().enumerate() {
            all_ok &= report(i, r);
        }
        Ok((engine.into_store(), all_ok))
    } else {
        let mut engine = Engine::new(classifier, cfg)?;
        engine.plant(seeds)?;
        for (i, text) in opinions.iter().enumerate() {
            all_ok &= report(i, &engine.submit(text));
        }
        Ok((engine.into_store(), all_ok))
    }
}

fn run(cli: Cli) -> Result<bool, Error> {
    let cfg = load_config(&cli)?;
    let title = cfg.topic.title.clone();
    let seeds = load_seed_opinions(&cli)?;
    let opinions = read_opinions(cli.input.as_deref())?;
    info!("Read {} opinions", opinions.len());

    let (store, all_ok) = match cli.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let clf = ChatClassifier::new(
                key,
                &cli.model,
                &cli.endpoint,
                Duration::from_secs(cli.timeout),
            )
            .map_err(|e| Error::Config(e.to_string()))?;
            fold_all(clf, cfg, &seeds, &opinions, cli.parallel)?
        }
        None => {
            let lexicon = match &cli.lexicon {
                Some(path) => Lexicon::from_json_file(path)?,
                None => Lexicon::default(),
            };
            fold_all(
                LexiconClassifier::new(lexicon),
                cfg,
                &seeds,
                &opinions,
                cli.parallel,
            )?
        }
    };

    println!();
    print!("{}", render_summary(&store, &summary_query(&cli)));
    let consensus = projection::consensus(&store);
    if let Some(keyword) = &consensus.leading_keyword {
        println!(
            "Consensus: {:.0}% of {} accepted opinions fall under '{}' ({} clusters)",
            consensus.leading_share * 100.0,
            consensus.total_support,
            keyword,
            consensus.cluster_count
        );
    }

    if let Some(dir) = &cli.export_dir {
        fs::create_dir_all(dir)?;
        let clusters = export_clusters(&store, dir, cli.export_format)?;
        let map = export_map(&store, dir, &title)?;
        println!("Exported {} and {}", clusters.display(), map.display());
    }
    Ok(all_ok)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
