//! Walking WordprocessingML trees.
//!
//! Paragraphs are found wherever they live: directly in the body, inside
//! table cells (nested to any depth), content controls, text boxes, and in
//! header and footer parts, which share the same markup.

use crate::xml::{XmlElement, XmlNode};

pub const W_BODY: &str = "w:body";
pub const W_P: &str = "w:p";
pub const W_PPR: &str = "w:pPr";
pub const W_R: &str = "w:r";
pub const W_RPR: &str = "w:rPr";
pub const W_T: &str = "w:t";
pub const W_TAB: &str = "w:tab";
pub const W_BR: &str = "w:br";
pub const W_CR: &str = "w:cr";
pub const W_SECT_PR: &str = "w:sectPr";

/// Elements that hold runs on behalf of a paragraph.
pub const RUN_CONTAINERS: &[&str] = &[
    "w:hyperlink",
    "w:ins",
    "w:moveTo",
    "w:smartTag",
    "w:customXml",
    "w:sdt",
    "w:sdtContent",
    "w:fldSimple",
    "w:dir",
    "w:bdo",
];

pub fn is_run_container(el: &XmlElement) -> bool {
    RUN_CONTAINERS.contains(&el.name.as_str())
}

/// Call `f` on every paragraph under `el` (including `el` itself), outermost first.
///
/// `f` runs before the paragraph's own descendants are visited, so text-box
/// paragraphs nested in a run are reached after their host paragraph.
pub fn for_each_paragraph(el: &mut XmlElement, f: &mut dyn FnMut(&mut XmlElement)) {
    if el.is(W_P) {
        f(el);
    }
    for child in el.elements_mut() {
        for_each_paragraph(child, f);
    }
}

pub fn paragraphs(el: &XmlElement) -> Vec<&XmlElement> {
    let mut out = Vec::new();
    collect_paragraphs(el, &mut out);
    out
}

fn collect_paragraphs<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    if el.is(W_P) {
        out.push(el);
    }
    for child in el.elements() {
        collect_paragraphs(child, out);
    }
}

/// Call `f` on every run under `el`.
pub fn for_each_run(el: &mut XmlElement, f: &mut dyn FnMut(&mut XmlElement)) {
    if el.is(W_R) {
        f(el);
    }
    for child in el.elements_mut() {
        for_each_run(child, f);
    }
}

/// Runs that make up a paragraph's own text, in document order.
///
/// Descends into hyperlinks, insertions, content controls and similar
/// wrappers but never into a run, so text-box paragraphs anchored inside a
/// run are not counted as part of their host paragraph.
pub fn paragraph_runs(paragraph: &mut XmlElement) -> Vec<&mut XmlElement> {
    let mut out = Vec::new();
    collect_runs(paragraph, &mut out);
    out
}

fn collect_runs<'a>(el: &'a mut XmlElement, out: &mut Vec<&'a mut XmlElement>) {
    for node in el.children.iter_mut() {
        if let XmlNode::Element(child) = node {
            if child.is(W_R) {
                out.push(child);
            } else if is_run_container(child) {
                collect_runs(child, out);
            }
        }
    }
}

/// Plain text of a paragraph as the substitution engine sees it.
pub fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut out = String::new();
    push_paragraph_text(paragraph, &mut out);
    out
}

fn push_paragraph_text(el: &XmlElement, out: &mut String) {
    for child in el.elements() {
        if child.is(W_R) {
            for item in child.elements() {
                match item.name.as_str() {
                    W_T => out.push_str(&item.text()),
                    W_TAB => out.push('\t'),
                    W_BR | W_CR => out.push('\n'),
                    _ => {}
                }
            }
        } else if is_run_container(child) {
            push_paragraph_text(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    const NESTED: &str = concat!(
        "<w:body>",
        "<w:p><w:r><w:t>one</w:t></w:r></w:p>",
        "<w:tbl><w:tr><w:tc>",
        "<w:p><w:r><w:t>two</w:t></w:r></w:p>",
        "<w:tbl><w:tr><w:tc><w:p><w:hyperlink><w:r><w:t>three</w:t></w:r></w:hyperlink></w:p></w:tc></w:tr></w:tbl>",
        "</w:tc></w:tr></w:tbl>",
        "<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/></w:r><w:del><w:r><w:delText>gone</w:delText></w:r></w:del></w:p>",
        "</w:body>"
    );

    #[test]
    fn test_finds_paragraphs_in_nested_tables() {
        let doc = XmlDocument::parse("t", NESTED).unwrap();
        let texts: Vec<String> = paragraphs(&doc.root).into_iter().map(paragraph_text).collect();
        assert_eq!(texts, vec!["one", "two", "three", "a\tb\n"]);
    }

    #[test]
    fn test_for_each_paragraph_visits_all() {
        let mut doc = XmlDocument::parse("t", NESTED).unwrap();
        let mut count = 0;
        for_each_paragraph(&mut doc.root, &mut |_| count += 1);
        assert_eq!(count, 4);
    }

    #[test]
    fn test_paragraph_runs_skip_deleted_text() {
        let mut doc = XmlDocument::parse("t", NESTED).unwrap();
        let mut run_counts = Vec::new();
        for_each_paragraph(&mut doc.root, &mut |p| run_counts.push(paragraph_runs(p).len()));
        assert_eq!(run_counts, vec![1, 1, 1, 1]);
    }
}
