use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::analyze::Analyzer;
use crate::codec::IndexSource;
use crate::error::QueryError;
use crate::meta::CollectionMeta;
use crate::query::Session;
use crate::DocId;

lazy_static! {
    static ref RANK_SPLIT_RE: Regex = Regex::new(r"[^a-z0-9*]+").expect("valid regex");
}

/// Ranking weights and thresholds. The defaults preserve the historical
/// tuning; any field may be overridden from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub term_weight: f64,
    pub page_rank_weight: f64,
    pub zone_weight: f64,
    pub class_weight: f64,
    pub title_boost: f64,
    pub stub_penalty: f64,
    pub idf_cutoff: f64,
    pub min_stub_chars: usize,
    pub page_rank_control: f64,
    pub top_k: usize,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            term_weight: 0.4,
            page_rank_weight: 0.1,
            zone_weight: 0.45,
            class_weight: 0.05,
            title_boost: 1.3,
            stub_penalty: 0.8,
            idf_cutoff: 3.8,
            min_stub_chars: 1000,
            page_rank_control: 0.5,
            top_k: 10,
        }
    }
}

impl Weights {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Lowercased, stopword-filtered, *unstemmed* tokens of the raw query with
/// boolean operators and quoting removed. Wildcard tokens pass through.
/// These are the terms the ranker scores against both indexes.
pub fn ranking_terms(raw: &str, analyzer: &Analyzer) -> Vec<String> {
    let stripped = raw.replace("AND", "").replace("OR", "");
    let stripped = stripped.trim().trim_matches('"').to_lowercase();
    RANK_SPLIT_RE
        .split(&stripped)
        .filter(|t| !t.is_empty() && !analyzer.is_stopword(t))
        .map(|t| t.to_string())
        .collect()
}

/// Blends tf-idf (body and zone), transformed authority, and the class
/// vote into one score per matched document, then extracts the top K.
pub struct Ranker<'a> {
    pub weights: &'a Weights,
    pub meta: &'a CollectionMeta,
    pub analyzer: &'a Analyzer,
}

impl Ranker<'_> {
    /// Rank `hits` for the query's term list. Returns up to `top_k`
    /// document ids in decreasing score order; equal scores order by
    /// ascending docId so results are deterministic.
    pub fn top_k<B: IndexSource, Z: IndexSource>(
        &self,
        terms: &[String],
        hits: &HashSet<DocId>,
        body: &mut Session<B>,
        zone: &mut Session<Z>,
    ) -> Result<Vec<DocId>, QueryError> {
        let doc_scores = self.tf_idf_scores(terms, hits, body)?;
        let zone_scores = self.tf_idf_scores(terms, hits, zone)?;

        // Query generality: mean idf of the query terms across both
        // indexes. Low mean idf means common terms, a "general" query.
        let stemmed: Vec<String> = terms
            .iter()
            .map(|t| {
                if t.contains('*') {
                    t.clone()
                } else {
                    self.analyzer.stem(t)
                }
            })
            .collect();
        let mut idf_sum = 0.0;
        let mut idf_count = 0u32;
        for term in &stemmed {
            if term.contains('*') {
                continue;
            }
            if let Some(idf) = body.cached_idf(term) {
                idf_sum += idf;
                idf_count += 1;
            }
            if let Some(idf) = zone.cached_idf(term) {
                idf_sum += idf;
                idf_count += 1;
            }
        }
        let query_idf = if idf_count > 0 {
            idf_sum / f64::from(idf_count)
        } else {
            10.0
        };
        let general = query_idf <= self.weights.idf_cutoff;
        tracing::debug!(query_idf, general, "query generality");

        // Class vote: fraction of the matched set sharing each label.
        // Unlabeled documents count toward the denominator but vote for
        // nothing.
        let mut class_count: HashMap<i32, usize> = HashMap::new();
        for &doc in hits {
            if let Some(class) = self.meta.class_of(doc) {
                *class_count.entry(class).or_insert(0) += 1;
            }
        }
        let matched_total = hits.len() as f64;

        // Authority transform; page ranks are probabilities in (0, 1),
        // anything outside contributes nothing.
        let mut authority: HashMap<DocId, f64> = HashMap::new();
        for &doc in hits {
            let pr = self.meta.page_rank(doc).unwrap_or(0.0);
            let a = if pr > 0.0 && pr < 1.0 {
                -1.0 / pr.ln()
            } else {
                0.0
            };
            authority.insert(doc, a);
        }

        let max_term = max_value(&doc_scores);
        let max_zone = max_value(&zone_scores);
        let max_auth = max_value(&authority);

        let mut weighted: HashMap<DocId, f64> = HashMap::with_capacity(hits.len());
        let mut term_part: HashMap<DocId, f64> = HashMap::with_capacity(hits.len());
        let mut zone_part: HashMap<DocId, f64> = HashMap::with_capacity(hits.len());
        let mut auth_part: HashMap<DocId, f64> = HashMap::with_capacity(hits.len());

        for &doc in hits {
            let mut w_term = self.weights.term_weight;
            let mut w_auth = self.weights.page_rank_weight;
            let mut w_zone = self.weights.zone_weight;
            let w_class = self.weights.class_weight;

            // general queries lean on authority over term evidence
            if general {
                w_term -= 0.1;
                w_auth += 0.2;
                w_zone -= 0.1;
            }
            if self.meta.is_body_stub(doc) {
                w_term -= 0.3;
                w_auth += 0.15;
                w_zone += 0.15;
            }
            if self.meta.is_zone_stub(doc) {
                w_term += 0.05;
                w_auth += 0.05;
                w_zone -= 0.1;
            }

            let t_term = normalized(&doc_scores, doc, max_term);
            let t_zone = normalized(&zone_scores, doc, max_zone);
            let t_auth = normalized(&authority, doc, max_auth);
            let t_class = self
                .meta
                .class_of(doc)
                .and_then(|c| class_count.get(&c))
                .map(|&n| n as f64 / matched_total)
                .unwrap_or(0.0);

            let score =
                w_term * t_term + w_auth * t_auth + w_zone * t_zone + w_class * t_class;
            weighted.insert(doc, score);
            term_part.insert(doc, w_term * t_term);
            zone_part.insert(doc, w_zone * t_zone);
            auth_part.insert(doc, w_auth * t_auth);
        }

        // title boost, once per query term literally present in the title
        for term in &stemmed {
            for (doc, score) in weighted.iter_mut() {
                if self.meta.title_contains(*doc, term) {
                    *score *= self.weights.title_boost;
                }
            }
        }

        // general queries penalize stubs
        if general {
            for (doc, score) in weighted.iter_mut() {
                if self.meta.is_body_stub(*doc) || self.meta.is_zone_stub(*doc) {
                    *score *= self.weights.stub_penalty;
                }
            }
        }

        // dampen documents whose score is mostly authority
        for (doc, score) in weighted.iter_mut() {
            let auth = auth_part[doc];
            if term_part[doc] > 0.0 && auth / term_part[doc] > 10.0 {
                *score *= self.weights.page_rank_control;
            }
            if zone_part[doc] > 0.0 && auth / zone_part[doc] > 10.0 {
                *score *= self.weights.page_rank_control;
            }
        }

        let mut scored: Vec<(DocId, f64)> = weighted.into_iter().collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(scored
            .into_iter()
            .take(self.weights.top_k)
            .map(|(doc, _)| doc)
            .collect())
    }

    /// Accumulate `sum(tf * idf) / norm` per document over the query
    /// terms. Wildcard terms score with the maximum tf and maximum idf
    /// across their expansion, normalized once.
    fn tf_idf_scores<S: IndexSource>(
        &self,
        terms: &[String],
        hits: &HashSet<DocId>,
        session: &mut Session<S>,
    ) -> Result<HashMap<DocId, f64>, QueryError> {
        let mut scores: HashMap<DocId, f64> = HashMap::new();
        for term in terms {
            if term.contains('*') {
                let expansion = session.expand_wildcard(term)?;
                let mut best_tf: HashMap<DocId, f64> = HashMap::new();
                let mut idf = 0.0f64;
                for t in expansion {
                    let (term_idf, tfs) = session.term_stats(&t)?;
                    if term_idf > idf {
                        idf = term_idf;
                    }
                    for (doc, tf) in tfs {
                        if !hits.contains(&doc) {
                            continue;
                        }
                        let entry = best_tf.entry(doc).or_insert(0.0);
                        if tf as f64 > *entry {
                            *entry = tf as f64;
                        }
                    }
                }
                for (doc, tf) in best_tf {
                    if let Some(norm) = session.norm(doc).filter(|n| *n > 0.0) {
                        *scores.entry(doc).or_insert(0.0) += tf * idf / norm;
                    }
                }
            } else {
                let stemmed = self.analyzer.stem(term);
                let (idf, tfs) = session.term_stats(&stemmed)?;
                for (doc, tf) in tfs {
                    if !hits.contains(&doc) {
                        continue;
                    }
                    if let Some(norm) = session.norm(doc).filter(|n| *n > 0.0) {
                        *scores.entry(doc).or_insert(0.0) += tf as f64 * idf / norm;
                    }
                }
            }
        }
        Ok(scores)
    }
}

fn max_value(map: &HashMap<DocId, f64>) -> f64 {
    map.values().copied().fold(0.0, f64::max)
}

fn normalized(map: &HashMap<DocId, f64>, doc: DocId, max: f64) -> f64 {
    if max > 0.0 {
        map.get(&doc).copied().unwrap_or(0.0) / max
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_match_historical_tuning() {
        let w = Weights::default();
        assert_eq!(w.term_weight, 0.4);
        assert_eq!(w.page_rank_weight, 0.1);
        assert_eq!(w.zone_weight, 0.45);
        assert_eq!(w.class_weight, 0.05);
        assert_eq!(w.title_boost, 1.3);
        assert_eq!(w.idf_cutoff, 3.8);
        assert_eq!(w.min_stub_chars, 1000);
        assert_eq!(w.top_k, 10);
    }

    #[test]
    fn weights_load_partial_json() {
        let w = Weights::from_json(r#"{"top_k": 3, "title_boost": 2.0}"#).unwrap();
        assert_eq!(w.top_k, 3);
        assert_eq!(w.title_boost, 2.0);
        // untouched fields keep their defaults
        assert_eq!(w.term_weight, 0.4);
    }

    #[test]
    fn ranking_terms_strip_operators_and_stopwords() {
        let stops = ["the"].iter().map(|s| s.to_string()).collect();
        let analyzer = Analyzer::new(stops);
        let terms = ranking_terms("\"The Cat\" AND dog OR fi*h", &analyzer);
        assert_eq!(terms, vec!["cat", "dog", "fi*h"]);
    }

    #[test]
    fn max_of_empty_map_is_zero() {
        assert_eq!(max_value(&HashMap::new()), 0.0);
        assert_eq!(normalized(&HashMap::new(), 0, 0.0), 0.0);
    }

    #[test]
    fn page_rank_control_dampens_authority_heavy_docs() {
        use crate::build::PostingsBuilder;
        use crate::codec::{write_index, IndexReader};
        use std::io::Cursor;

        fn reader(docs: &[(DocId, &str)]) -> IndexReader<Cursor<Vec<u8>>> {
            let analyzer = Analyzer::new(HashSet::new());
            let mut builder = PostingsBuilder::new();
            for (doc, text) in docs {
                builder.add_document(*doc, &analyzer.terms(text));
            }
            let mut bytes = Vec::new();
            write_index(&builder.finalize(), &mut bytes).unwrap();
            IndexReader::open(Cursor::new(bytes)).unwrap()
        }

        // doc 1 has the weaker term score but the stronger page rank, so
        // its authority component dominates past the 10x threshold
        let mut body = reader(&[
            (0, "gull gull gull"),
            (1, "gull reef coral tide"),
            (2, "kelp"),
        ]);
        let mut zone = reader(&[]);

        let mut meta = CollectionMeta::default();
        meta.load_page_rank("0.5\n0.6\n0.5\n".as_bytes()).unwrap();

        let analyzer = Analyzer::new(HashSet::new());
        let terms = vec!["gull".to_string()];
        let hits: HashSet<DocId> = [0, 1].into_iter().collect();

        let weights = Weights {
            term_weight: 0.05,
            page_rank_weight: 0.6,
            zone_weight: 0.3,
            idf_cutoff: 0.0,
            ..Weights::default()
        };
        let ranker = Ranker {
            weights: &weights,
            meta: &meta,
            analyzer: &analyzer,
        };
        let ranked = {
            let mut b = Session::new(&mut body);
            let mut z = Session::new(&mut zone);
            ranker.top_k(&terms, &hits, &mut b, &mut z).unwrap()
        };
        assert_eq!(ranked, vec![0, 1]);

        // with the dampening factor neutralized doc 1 wins outright
        let softer = Weights {
            page_rank_control: 1.0,
            ..weights.clone()
        };
        let ranker = Ranker {
            weights: &softer,
            meta: &meta,
            analyzer: &analyzer,
        };
        let ranked = {
            let mut b = Session::new(&mut body);
            let mut z = Session::new(&mut zone);
            ranker.top_k(&terms, &hits, &mut b, &mut z).unwrap()
        };
        assert_eq!(ranked, vec![1, 0]);
    }
}
