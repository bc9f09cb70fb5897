mod collection;

use anyhow::{Context, Result};
use clap::Parser;
use engine::analyze::{read_stopwords, Analyzer};
use engine::build::PostingsBuilder;
use engine::codec::write_index;
use engine::rank::Weights;
use tracing_subscriber::{fmt, EnvFilter};

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use collection::parse_collection;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build body and zone indexes from a tagged page collection", long_about = None)]
struct Cli {
    /// Collection file (<collection><page>... format)
    #[arg(long)]
    collection: PathBuf,
    /// Stopword list, one word per line
    #[arg(long)]
    stopwords: PathBuf,
    /// Output body index
    #[arg(long, default_value = "./index.body")]
    index: PathBuf,
    /// Output zone index over the lead sections
    #[arg(long, default_value = "./index.zone")]
    zone_index: PathBuf,
    /// Output title metadata (docId, stub flags, title)
    #[arg(long, default_value = "./titles.tsv")]
    titles: PathBuf,
    /// Optional JSON weights file; only min_stub_chars matters here
    #[arg(long)]
    weights: Option<PathBuf>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    build(&cli)
}

fn build(cli: &Cli) -> Result<()> {
    let weights = match &cli.weights {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading weights from {}", path.display()))?;
            Weights::from_json(&text).context("parsing weights")?
        }
        None => Weights::default(),
    };

    let stopwords = read_stopwords(BufReader::new(
        File::open(&cli.stopwords)
            .with_context(|| format!("opening stopwords {}", cli.stopwords.display()))?,
    ))?;
    let analyzer = Analyzer::new(stopwords);

    let raw = fs::read_to_string(&cli.collection)
        .with_context(|| format!("reading collection {}", cli.collection.display()))?;
    let pages = parse_collection(&raw);
    tracing::info!(pages = pages.len(), "parsed collection");

    let mut body_builder = PostingsBuilder::new();
    let mut zone_builder = PostingsBuilder::new();
    let mut titles = BufWriter::new(
        File::create(&cli.titles)
            .with_context(|| format!("creating {}", cli.titles.display()))?,
    );

    for page in &pages {
        body_builder.add_document(page.id, &analyzer.terms(&page.body));
        zone_builder.add_document(page.id, &analyzer.terms(&page.zone));

        let zone_stub = page.zone.len() < weights.min_stub_chars;
        let body_stub = page.body.len() < weights.min_stub_chars;
        writeln!(
            titles,
            "{}\t{}\t{}\t{}",
            page.id,
            u8::from(zone_stub),
            u8::from(body_stub),
            page.title
        )?;
    }
    titles.flush()?;

    for (builder, path) in [(body_builder, &cli.index), (zone_builder, &cli.zone_index)] {
        let built = builder.finalize();
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        write_index(&built, &mut out)?;
        out.flush()?;
        tracing::info!(path = %path.display(), "wrote index");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::codec::IndexReader;
    use std::io::BufReader;
    use tempfile::tempdir;

    const COLLECTION: &str = "\
<collection>
<page>
<id>0</id>
<title>Long article</title>
<text>This lead section is comfortably longer than the stub threshold used below.
==Details==
The body also clears the threshold with room to spare, easily.</text>
</page>
<page>
<id>1</id>
<title>Stub</title>
<text>Tiny lead.
==More==
Tiny body.</text>
</page>
</collection>
";

    #[test]
    fn build_writes_indexes_and_stub_flags() {
        let dir = tempdir().unwrap();
        let collection = dir.path().join("collection.txt");
        let stopwords = dir.path().join("stopwords.txt");
        let weights = dir.path().join("weights.json");
        fs::write(&collection, COLLECTION).unwrap();
        fs::write(&stopwords, "the\nis\n").unwrap();
        fs::write(&weights, r#"{"min_stub_chars": 40}"#).unwrap();

        let cli = Cli {
            collection,
            stopwords,
            index: dir.path().join("index.body"),
            zone_index: dir.path().join("index.zone"),
            titles: dir.path().join("titles.tsv"),
            weights: Some(weights),
        };
        build(&cli).unwrap();

        let titles = fs::read_to_string(&cli.titles).unwrap();
        let lines: Vec<&str> = titles.lines().collect();
        assert_eq!(lines[0], "0\t0\t0\tLong article");
        assert_eq!(lines[1], "1\t1\t1\tStub");

        let mut body =
            IndexReader::open(BufReader::new(File::open(&cli.index).unwrap())).unwrap();
        let postings = body.fetch_postings("bodi").unwrap();
        assert!(postings.docs.contains_key(&0));
        assert!(postings.docs.contains_key(&1));

        let mut zone =
            IndexReader::open(BufReader::new(File::open(&cli.zone_index).unwrap())).unwrap();
        let postings = zone.fetch_postings("lead").unwrap();
        assert!(postings.docs.contains_key(&1));
    }
}
