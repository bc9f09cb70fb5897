use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::build::BuiltIndex;
use crate::error::IndexError;
use crate::permuterm::Permuterm;
use crate::DocId;

/// Two 20-digit zero-padded length fields plus their trailing newlines.
pub const HEADER_LEN: u64 = 42;

/// Byte-addressable storage for one index file. Implemented for anything
/// `Read + Seek`, so the evaluator runs against an in-memory cursor in
/// tests and a buffered file in production.
pub trait IndexSource {
    fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, IndexError>;

    /// Read one `\n`-terminated line starting at `offset` (newline not
    /// included). An offset at or past EOF is a structural error.
    fn line_at(&mut self, offset: u64) -> Result<String, IndexError>;
}

impl<T: Read + Seek> IndexSource for T {
    fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, IndexError> {
        self.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf).map_err(|e| {
            // only a short read means the offset overran the file
            if e.kind() == io::ErrorKind::UnexpectedEof {
                IndexError::OffsetBeyondEnd(offset)
            } else {
                IndexError::Io(e)
            }
        })?;
        Ok(buf)
    }

    fn line_at(&mut self, offset: u64) -> Result<String, IndexError> {
        self.seek(SeekFrom::Start(offset))?;
        let mut line = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if let Some(i) = chunk[..n].iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&chunk[..i]);
                // rewind so subsequent reads are not misaligned
                let consumed = line.len() as u64 + 1;
                self.seek(SeekFrom::Start(offset + consumed))?;
                return finish_line(line, offset);
            }
            line.extend_from_slice(&chunk[..n]);
        }
        if line.is_empty() {
            return Err(IndexError::OffsetBeyondEnd(offset));
        }
        finish_line(line, offset)
    }
}

fn finish_line(bytes: Vec<u8>, offset: u64) -> Result<String, IndexError> {
    String::from_utf8(bytes).map_err(|_| IndexError::Corrupt {
        offset,
        reason: "line is not valid utf-8".into(),
    })
}

/// Serialize a built index in the seekable text layout:
/// two 20-digit length headers, the dictionary section (term + offset
/// relative to the postings section), the normalization section, then one
/// postings line per term prefixed with its idf.
pub fn write_index<W: Write>(index: &BuiltIndex, out: &mut W) -> Result<(), IndexError> {
    // Postings lines are rendered first: offsets must be known before the
    // dictionary can be written.
    let mut lines: Vec<String> = Vec::with_capacity(index.postings.len());
    let mut offsets: Vec<(&str, u64)> = Vec::with_capacity(index.postings.len());
    let mut current: u64 = 0;
    for (term, by_doc) in &index.postings {
        let mut line = String::new();
        line.push_str(&index.idf[term].to_string());
        for (doc, positions) in by_doc {
            line.push(':');
            line.push_str(&doc.to_string());
            for pos in positions {
                line.push(' ');
                line.push_str(&pos.to_string());
            }
        }
        line.push('\n');
        offsets.push((term, current));
        current += line.len() as u64;
        lines.push(line);
    }

    let mut dict = String::new();
    for (term, offset) in &offsets {
        dict.push_str(term);
        dict.push(' ');
        dict.push_str(&offset.to_string());
        dict.push('\n');
    }
    let mut norm = String::new();
    for (doc, factor) in &index.norms {
        norm.push_str(&doc.to_string());
        norm.push(' ');
        norm.push_str(&factor.to_string());
        norm.push('\n');
    }

    write!(out, "{:020}\n{:020}\n", dict.len(), norm.len())?;
    out.write_all(dict.as_bytes())?;
    out.write_all(norm.as_bytes())?;
    for line in &lines {
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

/// One term's postings as loaded from disk: positions keyed by document,
/// plus the term's idf. The default value stands in for absent terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Postings {
    pub idf: f64,
    pub docs: HashMap<DocId, Vec<u32>>,
}

/// A loaded index: the permuterm dictionary and normalization table are
/// memory-resident, postings lines are fetched by seek on demand.
#[derive(Debug)]
pub struct IndexReader<S: IndexSource> {
    source: S,
    permuterm: Permuterm,
    norms: HashMap<DocId, f64>,
}

impl<S: IndexSource> IndexReader<S> {
    /// Parse the fixed-width headers, build the permuterm index from the
    /// dictionary section, and load the normalization table in full.
    /// Dictionary offsets are shifted to absolute file positions here.
    pub fn open(mut source: S) -> Result<Self, IndexError> {
        let dict_len = parse_header_field(&source.read_at(0, 21)?)?;
        let norm_len = parse_header_field(&source.read_at(21, 21)?)?;
        let base = HEADER_LEN + dict_len + norm_len;

        let dict_text = section_utf8(source.read_at(HEADER_LEN, dict_len)?, HEADER_LEN)?;
        let mut permuterm = Permuterm::new();
        for line in dict_text.lines() {
            if line.is_empty() {
                continue;
            }
            let (term, offset) = line.split_once(' ').ok_or_else(|| IndexError::Corrupt {
                offset: HEADER_LEN,
                reason: format!("dictionary line {line:?} has no offset"),
            })?;
            let offset: u64 = offset.parse().map_err(|_| IndexError::Corrupt {
                offset: HEADER_LEN,
                reason: format!("dictionary offset {offset:?} is not numeric"),
            })?;
            permuterm.insert_term(term, base + offset);
        }

        let norm_start = HEADER_LEN + dict_len;
        let norm_text = section_utf8(source.read_at(norm_start, norm_len)?, norm_start)?;
        let mut norms = HashMap::new();
        for line in norm_text.lines() {
            if line.is_empty() {
                continue;
            }
            let (doc, factor) = line.split_once(' ').ok_or_else(|| IndexError::Corrupt {
                offset: norm_start,
                reason: format!("normalization line {line:?} has no factor"),
            })?;
            let doc: DocId = doc.parse().map_err(|_| IndexError::Corrupt {
                offset: norm_start,
                reason: format!("document id {doc:?} is not numeric"),
            })?;
            let factor: f64 = factor.parse().map_err(|_| IndexError::Corrupt {
                offset: norm_start,
                reason: format!("normalization factor {factor:?} is not numeric"),
            })?;
            norms.insert(doc, factor);
        }

        tracing::debug!(
            terms = permuterm.num_terms(),
            docs = norms.len(),
            "loaded index header"
        );
        Ok(Self {
            source,
            permuterm,
            norms,
        })
    }

    pub fn permuterm(&self) -> &Permuterm {
        &self.permuterm
    }

    pub fn norm(&self, doc: DocId) -> Option<f64> {
        self.norms.get(&doc).copied()
    }

    pub fn num_docs(&self) -> usize {
        self.norms.len()
    }

    /// Fetch and parse one term's postings line. A term absent from the
    /// dictionary yields an empty postings map, never an error.
    pub fn fetch_postings(&mut self, term: &str) -> Result<Postings, IndexError> {
        match self.permuterm.offset_of(term) {
            Some(offset) => self.fetch_at(offset),
            None => Ok(Postings::default()),
        }
    }

    /// Seek to a known postings offset and parse the line there.
    pub fn fetch_at(&mut self, offset: u64) -> Result<Postings, IndexError> {
        let line = self.source.line_at(offset)?;
        parse_postings_line(&line, offset)
    }
}

fn section_utf8(bytes: Vec<u8>, offset: u64) -> Result<String, IndexError> {
    String::from_utf8(bytes).map_err(|_| IndexError::Corrupt {
        offset,
        reason: "section is not valid utf-8".into(),
    })
}

/// Parse one 21-byte header field: 20 decimal digits and a newline.
fn parse_header_field(bytes: &[u8]) -> Result<u64, IndexError> {
    let text = String::from_utf8_lossy(bytes);
    let digits = match text.strip_suffix('\n') {
        Some(d) => d,
        None => return Err(IndexError::BadHeader(text.into_owned())),
    };
    digits
        .parse::<u64>()
        .map_err(|_| IndexError::BadHeader(digits.to_string()))
}

fn parse_postings_line(line: &str, offset: u64) -> Result<Postings, IndexError> {
    let mut fields = line.trim_end().split(':');
    let idf_field = fields.next().unwrap_or("");
    let idf: f64 = idf_field.parse().map_err(|_| IndexError::Corrupt {
        offset,
        reason: format!("idf field {idf_field:?} is not numeric"),
    })?;

    let mut docs = HashMap::new();
    for field in fields {
        let mut inner = field.split(' ');
        let doc_field = inner.next().unwrap_or("");
        let doc: DocId = doc_field.parse().map_err(|_| IndexError::Corrupt {
            offset,
            reason: format!("document id {doc_field:?} is not numeric"),
        })?;
        let mut positions = Vec::new();
        for p in inner {
            let pos: u32 = p.parse().map_err(|_| IndexError::Corrupt {
                offset,
                reason: format!("position {p:?} is not numeric"),
            })?;
            positions.push(pos);
        }
        docs.insert(doc, positions);
    }
    Ok(Postings { idf, docs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::PostingsBuilder;
    use std::io::Cursor;

    fn tiny_index_bytes() -> Vec<u8> {
        let mut b = PostingsBuilder::new();
        b.add_document(0, &["apple".into(), "pear".into(), "apple".into()]);
        b.add_document(1, &["pear".into()]);
        let built = b.finalize();
        let mut out = Vec::new();
        write_index(&built, &mut out).unwrap();
        out
    }

    #[test]
    fn header_is_fixed_width() {
        let bytes = tiny_index_bytes();
        assert_eq!(bytes[20], b'\n');
        assert_eq!(bytes[41], b'\n');
        assert!(bytes[..20].iter().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn round_trips_postings() {
        let bytes = tiny_index_bytes();
        let mut reader = IndexReader::open(Cursor::new(bytes)).unwrap();
        let apple = reader.fetch_postings("apple").unwrap();
        assert_eq!(apple.docs[&0], vec![0, 2]);
        assert!(!apple.docs.contains_key(&1));
        assert!((apple.idf - (2.0f64).ln()).abs() < 1e-12);

        let pear = reader.fetch_postings("pear").unwrap();
        assert_eq!(pear.idf, 0.0);
        assert_eq!(pear.docs.len(), 2);
    }

    #[test]
    fn missing_term_is_empty_not_error() {
        let mut reader = IndexReader::open(Cursor::new(tiny_index_bytes())).unwrap();
        let missing = reader.fetch_postings("zebra").unwrap();
        assert!(missing.docs.is_empty());
        assert_eq!(missing.idf, 0.0);
    }

    #[test]
    fn norms_are_loaded() {
        let reader = IndexReader::open(Cursor::new(tiny_index_bytes())).unwrap();
        // doc 0: apple tf=2, pear tf=1 -> sqrt(5)
        assert_eq!(reader.norm(0), Some(5.0f64.sqrt()));
        assert_eq!(reader.norm(1), Some(1.0));
    }

    #[test]
    fn non_numeric_header_is_fatal() {
        let mut bytes = tiny_index_bytes();
        bytes[3] = b'x';
        let err = IndexReader::open(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, IndexError::BadHeader(_)));
    }

    #[test]
    fn offset_past_eof_is_fatal() {
        let bytes = tiny_index_bytes();
        let len = bytes.len() as u64;
        let mut reader = IndexReader::open(Cursor::new(bytes)).unwrap();
        let err = reader.fetch_at(len + 100).unwrap_err();
        assert!(matches!(err, IndexError::OffsetBeyondEnd(_)));
    }

    struct FailingSource;

    impl Read for FailingSource {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk failure"))
        }
    }

    impl Seek for FailingSource {
        fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn io_failure_is_not_reported_as_truncation() {
        let err = FailingSource.read_at(0, 4).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[test]
    fn corrupt_postings_line_is_fatal() {
        let line = "notafloat:0 1 2";
        let err = parse_postings_line(line, 99).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { offset: 99, .. }));
    }
}
