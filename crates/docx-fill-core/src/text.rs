//! Read-only views of a package's text: plain-text extraction and
//! placeholder lookup.
//!
//! Only WordprocessingML paragraphs count. Text inside DrawingML shapes
//! (`a:p`, `a:t`) is neither extracted nor reported as a placeholder, since
//! substitution never rewrites it.

use regex::RegexBuilder;
use serde::Serialize;

use crate::error::{FillError, Result};
use crate::package::DocxPackage;
use crate::replacements::ReplacementSet;
use crate::traverse::{paragraph_text, paragraphs};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Where a placeholder occurs in a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPresence {
    pub key: String,
    /// Parts whose paragraph text contains the key, in body-headers-footers order.
    pub parts: Vec<String>,
}

impl KeyPresence {
    pub fn found(&self) -> bool {
        !self.parts.is_empty()
    }
}

/// Text parts in reading order: the main document, then headers and footers.
fn text_parts(package: &DocxPackage) -> Result<Vec<String>> {
    let mut parts = vec![package.main_document_part()];
    parts.extend(package.header_footer_parts()?);
    Ok(parts)
}

fn part_paragraphs(package: &DocxPackage, part: &str) -> Result<Vec<String>> {
    let bytes = package
        .part(part)
        .ok_or_else(|| FillError::MissingPart(part.to_string()))?;
    let xml = std::str::from_utf8(bytes).map_err(|e| FillError::xml(part, e))?;
    let doc = roxmltree::Document::parse(xml).map_err(|e| FillError::xml(part, e))?;

    Ok(doc
        .descendants()
        .filter(|node| is_w(*node, "p"))
        .map(|p| {
            let mut text = String::new();
            collect_paragraph_text(p, &mut text);
            text
        })
        .collect())
}

/// Text of `node`'s own runs; paragraphs nested inside (text boxes) are skipped.
fn collect_paragraph_text(node: roxmltree::Node, out: &mut String) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().namespace() != Some(W_NS) {
            collect_paragraph_text(child, out);
            continue;
        }
        match child.tag_name().name() {
            "p" => {}
            "t" => out.push_str(child.text().unwrap_or_default()),
            "tab" if is_in_run(child) => out.push('\t'),
            "br" | "cr" => out.push('\n'),
            _ => collect_paragraph_text(child, out),
        }
    }
}

fn is_w(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().namespace() == Some(W_NS) && node.tag_name().name() == name
}

/// `w:tab` is also a tab-stop definition inside `w:tabs`; only run tabs are text.
fn is_in_run(node: roxmltree::Node) -> bool {
    node.parent().is_some_and(|parent| is_w(parent, "r"))
}

/// Plain text of the document, one line per paragraph.
pub fn extract_text(package: &DocxPackage) -> Result<String> {
    let mut lines = Vec::new();
    for part in text_parts(package)? {
        lines.extend(part_paragraphs(package, &part)?);
    }
    Ok(lines.join("\n"))
}

/// Report, for every key of `set`, the parts whose paragraphs contain it.
///
/// Paragraph text is read the way substitution reads it, so a key reported
/// here is a key that filling the package replaces.
pub fn find_keys(package: &DocxPackage, set: &ReplacementSet) -> Result<Vec<KeyPresence>> {
    let mut texts = Vec::new();
    for part in text_parts(package)? {
        let doc = package.xml_part(&part)?;
        let texts_of_part: Vec<String> = paragraphs(&doc.root)
            .into_iter()
            .map(paragraph_text)
            .collect();
        texts.push((part, texts_of_part));
    }

    let mut report = Vec::with_capacity(set.len());
    for key in set.keys() {
        let pattern = RegexBuilder::new(&regex::escape(key))
            .case_insensitive(true)
            .build()?;
        let parts = texts
            .iter()
            .filter(|(_, paragraphs)| paragraphs.iter().any(|p| pattern.is_match(p)))
            .map(|(part, _)| part.clone())
            .collect();
        report.push(KeyPresence {
            key: key.to_string(),
            parts,
        });
    }
    Ok(report)
}
