use std::collections::{BTreeMap, BTreeSet};

use crate::DocId;

pub type PositionList = Vec<u32>;

/// Accumulates term occurrences over the collection, one `add` per literal
/// token occurrence. `finalize` consumes the builder, so the weights are
/// computed exactly once and no query path can see a half-built index.
#[derive(Default)]
pub struct PostingsBuilder {
    postings: BTreeMap<String, BTreeMap<DocId, PositionList>>,
    docs: BTreeSet<DocId>,
}

impl PostingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `term` in `doc` at token position `pos`.
    /// Occurrences are appended verbatim; duplicates are kept.
    pub fn add(&mut self, term: &str, doc: DocId, pos: u32) {
        self.docs.insert(doc);
        self.postings
            .entry(term.to_string())
            .or_default()
            .entry(doc)
            .or_default()
            .push(pos);
    }

    /// Register `doc` (so it counts toward N and receives a normalization
    /// entry even when empty) and add every term at its stream position.
    pub fn add_document(&mut self, doc: DocId, terms: &[String]) {
        self.docs.insert(doc);
        for (pos, term) in terms.iter().enumerate() {
            self.add(term, doc, pos as u32);
        }
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    /// Compute `idf = ln(N / df)` per term and the Euclidean normalization
    /// factor `sqrt(sum of tf^2)` per document.
    pub fn finalize(self) -> BuiltIndex {
        let n = self.docs.len() as f64;
        let mut idf = BTreeMap::new();
        let mut norms: BTreeMap<DocId, f64> =
            self.docs.iter().map(|&d| (d, 0.0)).collect();

        for (term, by_doc) in &self.postings {
            idf.insert(term.clone(), (n / by_doc.len() as f64).ln());
            for (&doc, positions) in by_doc {
                let tf = positions.len() as f64;
                *norms.entry(doc).or_insert(0.0) += tf * tf;
            }
        }
        for norm in norms.values_mut() {
            *norm = norm.sqrt();
        }

        tracing::info!(
            num_docs = self.docs.len(),
            num_terms = self.postings.len(),
            "finalized index"
        );
        BuiltIndex {
            postings: self.postings,
            idf,
            norms,
        }
    }
}

/// An immutable, fully weighted index ready for serialization.
pub struct BuiltIndex {
    pub(crate) postings: BTreeMap<String, BTreeMap<DocId, PositionList>>,
    pub(crate) idf: BTreeMap<String, f64>,
    pub(crate) norms: BTreeMap<DocId, f64>,
}

impl BuiltIndex {
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    pub fn norm(&self, doc: DocId) -> Option<f64> {
        self.norms.get(&doc).copied()
    }

    pub fn positions(&self, term: &str, doc: DocId) -> Option<&[u32]> {
        self.postings.get(term)?.get(&doc).map(|p| p.as_slice())
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(|t| t.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_matches_definition() {
        let mut b = PostingsBuilder::new();
        b.add_document(0, &["apple".into(), "pear".into()]);
        b.add_document(1, &["apple".into()]);
        let built = b.finalize();
        assert_eq!(built.idf("apple"), Some((2.0f64 / 2.0).ln()));
        assert_eq!(built.idf("pear"), Some((2.0f64 / 1.0).ln()));
    }

    #[test]
    fn term_in_every_doc_has_zero_idf() {
        let mut b = PostingsBuilder::new();
        b.add_document(0, &["common".into()]);
        b.add_document(1, &["common".into()]);
        let built = b.finalize();
        assert_eq!(built.idf("common"), Some(0.0));
    }

    #[test]
    fn norm_is_root_of_squared_tfs() {
        let mut b = PostingsBuilder::new();
        // doc 0: apple x2, pear x1 -> sqrt(4 + 1)
        b.add_document(0, &["apple".into(), "apple".into(), "pear".into()]);
        let built = b.finalize();
        assert_eq!(built.norm(0), Some(5.0f64.sqrt()));
    }

    #[test]
    fn empty_document_still_counted() {
        let mut b = PostingsBuilder::new();
        b.add_document(0, &["only".into()]);
        b.add_document(1, &[]);
        let built = b.finalize();
        // N = 2, so "only" is not in every doc
        assert!(built.idf("only").unwrap() > 0.0);
        assert_eq!(built.norm(1), Some(0.0));
    }

    #[test]
    fn duplicate_positions_are_kept() {
        let mut b = PostingsBuilder::new();
        b.add("dup", 3, 7);
        b.add("dup", 3, 7);
        let built = b.finalize();
        assert_eq!(built.positions("dup", 3), Some(&[7, 7][..]));
    }
}
