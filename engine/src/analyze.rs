use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::io::{self, BufRead};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z0-9]+").expect("valid regex");
}

/// Tokenization context: the stopword set plus an English Porter stemmer.
///
/// Token positions are indices into the *filtered* term stream: stopwords
/// do not consume a position. Phrase adjacency at query time relies on the
/// same rule being applied on both sides.
pub struct Analyzer {
    stemmer: Stemmer,
    stopwords: HashSet<String>,
}

impl Analyzer {
    pub fn new(stopwords: HashSet<String>) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stopwords,
        }
    }

    /// NFKC normalization followed by lowercasing.
    fn fold(text: &str) -> String {
        text.nfkc().collect::<String>().to_lowercase()
    }

    /// Ordered, stemmed, stopword-filtered terms of `text`.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let folded = Self::fold(text);
        let mut out = Vec::new();
        for mat in TOKEN_RE.find_iter(&folded) {
            let token = mat.as_str();
            if self.stopwords.contains(token) {
                continue;
            }
            out.push(self.stemmer.stem(token).to_string());
        }
        out
    }

    /// Stem a single already-lowercased token.
    pub fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).to_string()
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }
}

/// Read a stopword list, one word per line.
pub fn read_stopwords<R: BufRead>(reader: R) -> io::Result<HashSet<String>> {
    let mut words = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        let word = line.trim();
        if !word.is_empty() {
            words.insert(word.to_string());
        }
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        let stops = ["the", "and", "of", "a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Analyzer::new(stops)
    }

    #[test]
    fn stems_and_filters() {
        let terms = analyzer().terms("The running of the runners");
        assert_eq!(terms, vec!["run", "runner"]);
    }

    #[test]
    fn positions_skip_stopwords() {
        // "quick" lands at position 0 even though "the" precedes it
        let terms = analyzer().terms("the quick fox");
        assert_eq!(terms[0], "quick");
        assert_eq!(terms[1], "fox");
    }

    #[test]
    fn folds_unicode() {
        let terms = analyzer().terms("Caf\u{e9} menu");
        assert!(terms.iter().any(|t| t.starts_with("caf")));
    }

    #[test]
    fn reads_stopword_list() {
        let input = "the\nand\n\n  of  \n";
        let set = read_stopwords(input.as_bytes()).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("of"));
    }
}
