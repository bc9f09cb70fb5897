use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use engine::analyze::{read_stopwords, Analyzer};
use engine::codec::IndexReader;
use engine::meta::CollectionMeta;
use engine::query::{preprocess, Session};
use engine::rank::{ranking_terms, Ranker, Weights};
use engine::{DocId, QueryError};

/// Locations of everything a search engine instance reads at startup.
pub struct EnginePaths {
    pub index: PathBuf,
    pub zone_index: PathBuf,
    pub stopwords: PathBuf,
    pub titles: PathBuf,
    pub page_rank: PathBuf,
    pub classes: PathBuf,
    pub weights: Option<PathBuf>,
}

/// A ready-to-query engine: seekable readers over the body and zone
/// indexes plus the ranking sidecar data. Postings are fetched lazily,
/// so startup cost is the dictionaries and metadata only.
pub struct SearchEngine {
    body: IndexReader<BufReader<File>>,
    zone: IndexReader<BufReader<File>>,
    meta: CollectionMeta,
    analyzer: Analyzer,
    weights: Weights,
}

impl SearchEngine {
    pub fn open(paths: &EnginePaths) -> Result<Self> {
        let weights = match &paths.weights {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading weights from {}", path.display()))?;
                Weights::from_json(&text).context("parsing weights")?
            }
            None => Weights::default(),
        };

        let stopwords = read_stopwords(BufReader::new(
            File::open(&paths.stopwords)
                .with_context(|| format!("opening stopwords {}", paths.stopwords.display()))?,
        ))?;
        let analyzer = Analyzer::new(stopwords);

        let body = IndexReader::open(BufReader::new(
            File::open(&paths.index)
                .with_context(|| format!("opening index {}", paths.index.display()))?,
        ))
        .context("loading body index")?;
        let zone = IndexReader::open(BufReader::new(
            File::open(&paths.zone_index)
                .with_context(|| format!("opening index {}", paths.zone_index.display()))?,
        ))
        .context("loading zone index")?;

        let mut meta = CollectionMeta::default();
        meta.load_titles(
            BufReader::new(
                File::open(&paths.titles)
                    .with_context(|| format!("opening titles {}", paths.titles.display()))?,
            ),
            &analyzer,
        )?;
        meta.load_page_rank(BufReader::new(File::open(&paths.page_rank).with_context(
            || format!("opening page ranks {}", paths.page_rank.display()),
        )?))?;
        meta.load_classes(BufReader::new(File::open(&paths.classes).with_context(
            || format!("opening classes {}", paths.classes.display()),
        )?))?;

        tracing::info!(
            body_docs = body.num_docs(),
            zone_docs = zone.num_docs(),
            "search engine ready"
        );
        Ok(Self {
            body,
            zone,
            meta,
            analyzer,
            weights,
        })
    }

    pub fn set_top_k(&mut self, k: usize) {
        self.weights.top_k = k;
    }

    /// Evaluate one raw query and return the ranked result list. Matching
    /// runs over both indexes; the union of the two hit sets is ranked.
    pub fn search(&mut self, raw: &str) -> Result<Vec<DocId>, QueryError> {
        let prepared = preprocess(raw, &self.analyzer);
        let mut body = Session::new(&mut self.body);
        let mut zone = Session::new(&mut self.zone);

        let mut hits: HashSet<DocId> = body.matches(&prepared)?;
        hits.extend(zone.matches(&prepared)?);
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let terms = ranking_terms(raw, &self.analyzer);
        let ranker = Ranker {
            weights: &self.weights,
            meta: &self.meta,
            analyzer: &self.analyzer,
        };
        ranker.top_k(&terms, &hits, &mut body, &mut zone)
    }

    /// Read queries line by line and print one result line per query:
    /// space-separated document ids, or an empty line when nothing
    /// matches or the query is rejected. Index corruption aborts the
    /// session; a bad query does not.
    pub fn run_session<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            let raw = line.trim();
            if raw.is_empty() {
                continue;
            }
            match self.search(raw) {
                Ok(ids) => {
                    let rendered: Vec<String> = ids.iter().map(|d| d.to_string()).collect();
                    writeln!(output, "{}", rendered.join(" "))?;
                }
                Err(QueryError::Index(err)) => {
                    return Err(err).context("index read failed");
                }
                Err(err) => {
                    tracing::warn!(query = raw, %err, "rejecting query");
                    writeln!(output)?;
                }
            }
        }
        output.flush()?;
        Ok(())
    }
}
