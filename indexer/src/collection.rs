use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEADING_RE: Regex = Regex::new(r"==[^=]+==").expect("valid regex");
    static ref TAG_RE: Regex = Regex::new(r"<\w+>|<\w+/>|</\w+>").expect("valid regex");
    static ref DIV_RE: Regex = Regex::new(r"<div [^<>]+/>").expect("valid regex");
    static ref SPAN_RE: Regex = Regex::new(r"<span [^<>]+/>").expect("valid regex");
    static ref BR_RE: Regex = Regex::new(r"<br />").expect("valid regex");
}

/// One page from the tagged collection. `zone` is the lead section (text
/// before the first `==Heading==` marker), `body` the remainder; both have
/// markup tags excised.
#[derive(Debug)]
pub struct Page {
    pub id: u32,
    pub title: String,
    pub zone: String,
    pub body: String,
}

/// Strip semantically uninteresting markup. Tags that may carry links or
/// other signal are left intact.
fn excise_tags(text: &str) -> String {
    let text = TAG_RE.replace_all(text, "");
    let text = DIV_RE.replace_all(&text, "");
    let text = SPAN_RE.replace_all(&text, "");
    BR_RE.replace_all(&text, "").into_owned()
}

fn tag_content<'a>(src: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = src.find(&open)? + open.len();
    let end = src[start..].find(&close)? + start;
    Some(&src[start..end])
}

fn parse_page(src: &str) -> Option<Page> {
    let id: u32 = tag_content(src, "id")?.trim().parse().ok()?;
    let title = tag_content(src, "title")?.trim().to_string();
    let text = tag_content(src, "text").unwrap_or("");
    // the lead section runs up to the first heading marker; the body is
    // everything from that marker on (and empty for heading-less pages)
    let (zone, body) = match HEADING_RE.find(text) {
        Some(m) => (&text[..m.start()], &text[m.start()..]),
        None => (text, ""),
    };
    Some(Page {
        id,
        title,
        zone: excise_tags(zone),
        body: excise_tags(body),
    })
}

/// Parse every `<page>` inside the `<collection>` wrapper. Pages missing
/// an id or title are skipped with a warning.
pub fn parse_collection(input: &str) -> Vec<Page> {
    let start = match input.find("<collection>") {
        Some(i) => i + "<collection>".len(),
        None => return Vec::new(),
    };
    let rest = &input[start..];
    let end = rest.find("</collection>").unwrap_or(rest.len());
    let mut rest = &rest[..end];

    let mut pages = Vec::new();
    while let Some(open) = rest.find("<page>") {
        let after = &rest[open + "<page>".len()..];
        let (page_src, next) = match after.find("</page>") {
            Some(close) => (&after[..close], &after[close + "</page>".len()..]),
            None => (after, ""),
        };
        match parse_page(page_src) {
            Some(page) => pages.push(page),
            None => tracing::warn!("skipping page without id or title"),
        }
        rest = next;
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
<collection>
<page>
<id>7</id>
<title>Inverted index</title>
<text>An index structure. <ref>citation</ref>
==History==
Early systems used card catalogues.
==See also==
Related topics.</text>
</page>
<page>
<id>8</id>
<title>Short page</title>
<text>Only a lead section here.</text>
</page>
</collection>
";

    #[test]
    fn splits_lead_and_body() {
        let pages = parse_collection(SAMPLE);
        assert_eq!(pages.len(), 2);
        let page = &pages[0];
        assert_eq!(page.id, 7);
        assert_eq!(page.title, "Inverted index");
        assert!(page.zone.contains("index structure"));
        assert!(!page.zone.contains("card catalogues"));
        assert!(page.body.contains("card catalogues"));
        assert!(page.body.contains("Related topics"));
    }

    #[test]
    fn headingless_page_is_all_zone() {
        let pages = parse_collection(SAMPLE);
        let page = &pages[1];
        assert!(page.zone.contains("Only a lead section"));
        assert!(page.body.is_empty());
    }

    #[test]
    fn markup_is_excised() {
        let pages = parse_collection(SAMPLE);
        assert!(!pages[0].zone.contains("<ref>"));
        assert!(!pages[0].zone.contains("citation</ref>"));
        assert!(pages[0].zone.contains("citation"));
    }

    #[test]
    fn page_without_id_is_skipped() {
        let input = "<collection><page><title>No id</title><text>x</text></page></collection>";
        assert!(parse_collection(input).is_empty());
    }

    #[test]
    fn no_collection_tag_means_no_pages() {
        assert!(parse_collection("<page><id>1</id></page>").is_empty());
    }
}
