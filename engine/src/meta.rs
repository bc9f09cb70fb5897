use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead};

use crate::analyze::Analyzer;
use crate::DocId;

/// Title-file entry for one document: the raw title, its stemmed and
/// stop-worded term set (for the title boost), and the two stub flags.
#[derive(Debug, Clone)]
pub struct TitleEntry {
    pub raw: String,
    pub terms: HashSet<String>,
    pub zone_stub: bool,
    pub body_stub: bool,
}

/// Per-document sidecar data consumed by the ranker. Authority scores and
/// classification labels are produced elsewhere; this only loads them.
/// Every accessor degrades to a neutral value when data is missing, so a
/// gap never fails a query.
#[derive(Default)]
pub struct CollectionMeta {
    titles: HashMap<DocId, TitleEntry>,
    page_rank: Vec<f64>,
    classes: HashMap<DocId, i32>,
}

impl CollectionMeta {
    /// Load the tab-separated title file:
    /// `<docId>\t<zoneStub 0|1>\t<bodyStub 0|1>\t<title>`.
    pub fn load_titles<R: BufRead>(&mut self, reader: R, analyzer: &Analyzer) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.splitn(4, '\t');
            let parsed = (|| {
                let doc: DocId = fields.next()?.trim().parse().ok()?;
                let zone_stub = fields.next()?.trim() == "1";
                let body_stub = fields.next()?.trim() == "1";
                let raw = fields.next()?.to_string();
                Some((doc, zone_stub, body_stub, raw))
            })();
            match parsed {
                Some((doc, zone_stub, body_stub, raw)) => {
                    let terms: HashSet<String> = analyzer.terms(&raw).into_iter().collect();
                    self.titles.insert(
                        doc,
                        TitleEntry {
                            raw,
                            terms,
                            zone_stub,
                            body_stub,
                        },
                    );
                }
                None => tracing::warn!(%line, "skipping malformed title line"),
            }
        }
        tracing::debug!(titles = self.titles.len(), "loaded title metadata");
        Ok(())
    }

    /// Load authority scores, one float per line; the line number is the
    /// document id.
    pub fn load_page_rank<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            match line.trim().parse::<f64>() {
                Ok(score) => self.page_rank.push(score),
                Err(_) => {
                    tracing::warn!(%line, "skipping malformed page rank line");
                    self.page_rank.push(0.0);
                }
            }
        }
        Ok(())
    }

    /// Load classification labels: `<docId> <classId>` per line.
    pub fn load_classes<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            let parsed = line
                .trim()
                .split_once(' ')
                .and_then(|(doc, class)| {
                    Some((doc.trim().parse::<DocId>().ok()?, class.trim().parse::<i32>().ok()?))
                });
            match parsed {
                Some((doc, class)) => {
                    self.classes.insert(doc, class);
                }
                None => {
                    if !line.trim().is_empty() {
                        tracing::warn!(%line, "skipping malformed classification line");
                    }
                }
            }
        }
        Ok(())
    }

    pub fn page_rank(&self, doc: DocId) -> Option<f64> {
        self.page_rank.get(doc as usize).copied()
    }

    pub fn class_of(&self, doc: DocId) -> Option<i32> {
        self.classes.get(&doc).copied()
    }

    pub fn is_zone_stub(&self, doc: DocId) -> bool {
        self.titles.get(&doc).map(|t| t.zone_stub).unwrap_or(false)
    }

    pub fn is_body_stub(&self, doc: DocId) -> bool {
        self.titles.get(&doc).map(|t| t.body_stub).unwrap_or(false)
    }

    pub fn title_contains(&self, doc: DocId, term: &str) -> bool {
        self.titles
            .get(&doc)
            .map(|t| t.terms.contains(term))
            .unwrap_or(false)
    }

    pub fn raw_title(&self, doc: DocId) -> Option<&str> {
        self.titles.get(&doc).map(|t| t.raw.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        let stops = ["the", "of"].iter().map(|s| s.to_string()).collect();
        Analyzer::new(stops)
    }

    #[test]
    fn parses_title_lines() {
        let mut meta = CollectionMeta::default();
        let input = "0\t0\t1\tThe History of Computing\n1\t1\t0\tRust\n";
        meta.load_titles(input.as_bytes(), &analyzer()).unwrap();
        assert!(!meta.is_zone_stub(0));
        assert!(meta.is_body_stub(0));
        assert!(meta.is_zone_stub(1));
        assert_eq!(meta.raw_title(0), Some("The History of Computing"));
        // stemmed, stop-worded title terms
        assert!(meta.title_contains(0, "comput"));
        assert!(!meta.title_contains(0, "the"));
    }

    #[test]
    fn malformed_title_line_is_skipped() {
        let mut meta = CollectionMeta::default();
        meta.load_titles("garbage line\n2\t0\t0\tOk\n".as_bytes(), &analyzer())
            .unwrap();
        assert_eq!(meta.raw_title(2), Some("Ok"));
        assert_eq!(meta.raw_title(0), None);
    }

    #[test]
    fn page_rank_is_indexed_by_line() {
        let mut meta = CollectionMeta::default();
        meta.load_page_rank("0.25\n0.5\n".as_bytes()).unwrap();
        assert_eq!(meta.page_rank(1), Some(0.5));
        assert_eq!(meta.page_rank(7), None);
    }

    #[test]
    fn classes_parse() {
        let mut meta = CollectionMeta::default();
        meta.load_classes("0 4\n3 9\n".as_bytes()).unwrap();
        assert_eq!(meta.class_of(3), Some(9));
        assert_eq!(meta.class_of(1), None);
    }
}
