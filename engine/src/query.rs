use std::collections::{BTreeSet, HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

use crate::analyze::Analyzer;
use crate::boolexpr::{self, Expr};
use crate::codec::{IndexReader, IndexSource, Postings};
use crate::error::QueryError;
use crate::DocId;

lazy_static! {
    // query-side token split: keeps wildcards and boolean punctuation
    static ref QUERY_SPLIT_RE: Regex =
        Regex::new(r"[^a-zA-Z0-9*()]+").expect("valid regex");
    static ref FREE_TEXT_RE: Regex = Regex::new(r"[a-z0-9*]+").expect("valid regex");
}

/// True when the string carries the phrase-query quoting.
pub fn is_quoted(s: &str) -> bool {
    !s.is_empty() && s.starts_with('"') && s.ends_with('"')
}

/// Rewrite a raw query into evaluator form: one layer of quotes remembered
/// and re-applied, parentheses spaced out, terms lowercased, stopwords
/// dropped, non-wildcard terms stemmed, and runs of consecutive boolean
/// operators collapsed to one.
pub fn preprocess(raw: &str, analyzer: &Analyzer) -> String {
    let trimmed = raw.trim();
    let wrapped = is_quoted(trimmed);
    let spaced = trimmed
        .trim_matches('"')
        .replace('(', " ( ")
        .replace(')', " ) ");

    let mut kept: Vec<String> = Vec::new();
    for tok in QUERY_SPLIT_RE.split(&spaced) {
        if tok.is_empty() {
            continue;
        }
        match tok {
            "AND" | "OR" | "(" | ")" => kept.push(tok.to_string()),
            _ if tok.contains('*') => kept.push(tok.to_lowercase()),
            _ => {
                let lower = tok.to_lowercase();
                if !analyzer.is_stopword(&lower) {
                    kept.push(analyzer.stem(&lower));
                }
            }
        }
    }

    let mut out: Vec<String> = Vec::new();
    let mut last_was_op = false;
    for tok in kept {
        let is_op = tok == "AND" || tok == "OR";
        if !(is_op && last_was_op) {
            out.push(tok);
        }
        last_was_op = is_op;
    }

    let joined = out.join(" ");
    if wrapped {
        format!("\"{joined}\"")
    } else {
        joined
    }
}

fn free_text_tokens(text: &str) -> Vec<String> {
    FREE_TEXT_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn has_bool_tokens(q: &str) -> bool {
    q.split_whitespace()
        .any(|t| matches!(t, "AND" | "OR" | "(" | ")"))
}

/// Evaluation state for one query against one index: the reader (storage,
/// permuterm, norms) plus the per-query term cache. A fresh session per
/// query is the cache-clearing rule; the cache must never outlive a query.
pub struct Session<'a, S: IndexSource> {
    reader: &'a mut IndexReader<S>,
    cache: HashMap<String, Postings>,
}

impl<'a, S: IndexSource> Session<'a, S> {
    pub fn new(reader: &'a mut IndexReader<S>) -> Self {
        Self {
            reader,
            cache: HashMap::new(),
        }
    }

    pub fn norm(&self, doc: DocId) -> Option<f64> {
        self.reader.norm(doc)
    }

    /// idf of a term, if this query has touched it. Used by the ranker to
    /// judge query generality without extra disk reads.
    pub fn cached_idf(&self, term: &str) -> Option<f64> {
        self.cache.get(term).map(|p| p.idf)
    }

    /// Expand a wildcard token against this index's dictionary.
    pub fn expand_wildcard(&self, token: &str) -> Result<BTreeSet<String>, QueryError> {
        self.reader.permuterm().expand(token)
    }

    /// Fetch postings for `term` through the cache. Terms missing from the
    /// dictionary are cached as empty, matching their zero contribution.
    fn lookup(&mut self, term: &str) -> Result<&Postings, QueryError> {
        if !self.cache.contains_key(term) {
            let postings = self.reader.fetch_postings(term)?;
            self.cache.insert(term.to_string(), postings);
        }
        Ok(&self.cache[term])
    }

    /// Term frequency per document plus idf for one dictionary term.
    pub fn term_stats(&mut self, term: &str) -> Result<(f64, HashMap<DocId, usize>), QueryError> {
        let postings = self.lookup(term)?;
        let tfs = postings
            .docs
            .iter()
            .map(|(doc, positions)| (*doc, positions.len()))
            .collect();
        Ok((postings.idf, tfs))
    }

    /// Evaluate a preprocessed query string to its matching document set.
    ///
    /// Dispatch, in order: quoted string is a phrase query; a string with
    /// boolean tokens goes through the expression parser; anything else is
    /// free text (a single token being the degenerate one-word case).
    pub fn matches(&mut self, query: &str) -> Result<HashSet<DocId>, QueryError> {
        let q = query.trim();
        if q.is_empty() {
            return Ok(HashSet::new());
        }
        if q == "*" {
            return Err(QueryError::BareWildcard);
        }
        if is_quoted(q) {
            return self.phrase(q);
        }
        if has_bool_tokens(q) {
            let expr = boolexpr::parse(q)?;
            return self.eval_expr(&expr);
        }
        self.free_text(q)
    }

    /// Recursive boolean evaluation. `And` folds intersection starting
    /// from its first operand's result; `Or` folds union from the empty
    /// set.
    pub fn eval_expr(&mut self, expr: &Expr) -> Result<HashSet<DocId>, QueryError> {
        match expr {
            Expr::Atom(text) => self.free_text(text),
            Expr::And(operands) => {
                let mut iter = operands.iter();
                let mut acc = match iter.next() {
                    Some(e) => self.eval_expr(e)?,
                    None => HashSet::new(),
                };
                for e in iter {
                    let rhs = self.eval_expr(e)?;
                    acc.retain(|d| rhs.contains(d));
                }
                Ok(acc)
            }
            Expr::Or(operands) => {
                let mut acc = HashSet::new();
                for e in operands {
                    acc.extend(self.eval_expr(e)?);
                }
                Ok(acc)
            }
        }
    }

    /// Union of one-word matches across every token (OR semantics).
    fn free_text(&mut self, text: &str) -> Result<HashSet<DocId>, QueryError> {
        let mut out = HashSet::new();
        for token in free_text_tokens(text) {
            if token.contains('*') {
                out.extend(self.wildcard_docs(&token)?);
            } else {
                let postings = self.lookup(&token)?;
                out.extend(postings.docs.keys().copied());
            }
        }
        Ok(out)
    }

    /// Documents matching any dictionary term in the wildcard expansion.
    /// Every expanded term is pulled through the cache so the ranker can
    /// score it later without re-reading.
    fn wildcard_docs(&mut self, token: &str) -> Result<HashSet<DocId>, QueryError> {
        let terms = self.expand_wildcard(token)?;
        let mut out = HashSet::new();
        for term in terms {
            let postings = self.lookup(&term)?;
            out.extend(postings.docs.keys().copied());
        }
        Ok(out)
    }

    /// Positional phrase matching over a quoted string. Wildcard terms are
    /// expanded first and their postings merged per document (positions
    /// unioned) before the pairwise positional intersection.
    fn phrase(&mut self, quoted: &str) -> Result<HashSet<DocId>, QueryError> {
        let text = quoted.trim().trim_matches('"');
        let terms = free_text_tokens(text);
        if terms.is_empty() {
            return Ok(HashSet::new());
        }

        // candidates: documents containing every phrase term
        let all = Expr::And(terms.iter().cloned().map(Expr::Atom).collect());
        let candidates = self.eval_expr(&all)?;
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut per_term: Vec<HashMap<DocId, Vec<u32>>> = Vec::with_capacity(terms.len());
        for term in &terms {
            if term.contains('*') {
                let expansion = self.expand_wildcard(term)?;
                let mut merged: HashMap<DocId, BTreeSet<u32>> = HashMap::new();
                for t in expansion {
                    let postings = self.lookup(&t)?;
                    for (doc, positions) in &postings.docs {
                        merged
                            .entry(*doc)
                            .or_default()
                            .extend(positions.iter().copied());
                    }
                }
                per_term.push(
                    merged
                        .into_iter()
                        .map(|(doc, set)| (doc, set.into_iter().collect()))
                        .collect(),
                );
            } else {
                per_term.push(self.lookup(term)?.docs.clone());
            }
        }

        let mut out = HashSet::new();
        'docs: for &doc in &candidates {
            let mut live: HashSet<u32> = match per_term[0].get(&doc) {
                Some(positions) => positions.iter().copied().collect(),
                None => continue,
            };
            for (i, positions) in per_term.iter().enumerate().skip(1) {
                let plist = match positions.get(&doc) {
                    Some(p) => p,
                    None => continue 'docs,
                };
                // term i must sit exactly i tokens after term 0
                let shifted: HashSet<u32> = plist
                    .iter()
                    .filter_map(|p| p.checked_sub(i as u32))
                    .collect();
                live.retain(|p| shifted.contains(p));
                if live.is_empty() {
                    continue 'docs;
                }
            }
            out.insert(doc);
        }
        Ok(out)
    }
}
