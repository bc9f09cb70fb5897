use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use query::{EnginePaths, SearchEngine};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Rank documents for queries read from stdin", long_about = None)]
struct Cli {
    /// Body index built by the indexer
    #[arg(long, default_value = "./index.body")]
    index: PathBuf,
    /// Zone index over the lead sections
    #[arg(long, default_value = "./index.zone")]
    zone_index: PathBuf,
    /// Stopword list, one word per line
    #[arg(long)]
    stopwords: PathBuf,
    /// Title metadata written by the indexer
    #[arg(long, default_value = "./titles.tsv")]
    titles: PathBuf,
    /// Authority scores, one float per line (line number = docId)
    #[arg(long)]
    page_rank: PathBuf,
    /// Classification labels: "<docId> <classId>" per line
    #[arg(long)]
    classes: PathBuf,
    /// Optional JSON weights file overriding the default tuning
    #[arg(long)]
    weights: Option<PathBuf>,
    /// Override the number of results per query
    #[arg(long)]
    top_k: Option<usize>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let paths = EnginePaths {
        index: cli.index,
        zone_index: cli.zone_index,
        stopwords: cli.stopwords,
        titles: cli.titles,
        page_rank: cli.page_rank,
        classes: cli.classes,
        weights: cli.weights,
    };
    let mut engine = SearchEngine::open(&paths)?;
    if let Some(k) = cli.top_k {
        engine.set_top_k(k);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    engine.run_session(stdin.lock(), BufWriter::new(stdout.lock()))
}
