//! Concatenating two documents into one.
//!
//! The body of the second document is appended to the first one's body,
//! ahead of its final section properties. Anything the appended content
//! points to through relationships (images, charts, embedded objects,
//! hyperlinks) is carried over under fresh part names and relationship ids,
//! together with the parts those parts point to in turn. Styles and
//! numbering resolve against the first document's definitions.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{FillError, Result};
use crate::package::{media_content_type, DocxPackage, CONTENT_TYPES_PART};
use crate::rels::{
    relative_target, resolve_target, Relationships, FOOTER_SUFFIX, HEADER_SUFFIX,
};
use crate::traverse::{W_BODY, W_BR, W_P, W_R, W_SECT_PR};
use crate::xml::{XmlDocument, XmlElement, XmlNode};

const OFFICE_RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const HEADER_REFERENCE: &str = "w:headerReference";
const FOOTER_REFERENCE: &str = "w:footerReference";
const RELS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Start the appended document on a new page.
    pub page_break: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { page_break: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub blocks: usize,
    pub relationships: usize,
    pub copied_parts: Vec<String>,
}

/// Append the body of `second` to `first`.
pub fn merge_documents(
    first: &mut DocxPackage,
    second: &DocxPackage,
    options: &MergeOptions,
) -> Result<MergeReport> {
    let first_main = first.main_document_part();
    let second_main = second.main_document_part();
    let mut first_doc = first.xml_part(&first_main)?;
    let second_doc = second.xml_part(&second_main)?;

    let second_body = second_doc
        .root
        .child(W_BODY)
        .ok_or_else(|| FillError::InvalidPackage(format!("{second_main} has no w:body")))?;
    let mut blocks = body_blocks(second_body);
    for block in &mut blocks {
        block.walk_mut(&mut drop_header_footer_references);
    }

    let mut report = MergeReport {
        blocks: blocks.len(),
        ..MergeReport::default()
    };

    let source_prefix = namespace_prefix(&second_doc.root, OFFICE_RELATIONSHIPS_NS);
    if let Some(source_prefix) = source_prefix {
        let target_prefix = match namespace_prefix(&first_doc.root, OFFICE_RELATIONSHIPS_NS) {
            Some(prefix) => prefix,
            None => {
                first_doc
                    .root
                    .set_attr(format!("xmlns:{source_prefix}"), OFFICE_RELATIONSHIPS_NS);
                source_prefix.clone()
            }
        };
        let first_rels = first.relationships(&first_main)?;
        let second_rels = second.relationships(&second_main)?;
        let mut copier = RelationshipCopier {
            first: &mut *first,
            second,
            first_main: &first_main,
            second_main: &second_main,
            first_rels,
            second_rels,
            ids: HashMap::new(),
            parts: HashMap::new(),
            report: &mut report,
        };
        for block in &mut blocks {
            copier.retarget(block, &source_prefix, &target_prefix)?;
        }
        copier.finish()?;
    }

    copy_namespace_declarations(&mut first_doc.root, &second_doc.root);

    let first_body = first_doc
        .root
        .child_mut(W_BODY)
        .ok_or_else(|| FillError::InvalidPackage(format!("{first_main} has no w:body")))?;
    let mut insert_at = final_sect_pr_index(first_body).unwrap_or(first_body.children.len());
    if options.page_break {
        first_body
            .children
            .insert(insert_at, XmlNode::Element(page_break_paragraph()));
        insert_at += 1;
    }
    let tail = first_body.children.split_off(insert_at);
    first_body
        .children
        .extend(blocks.into_iter().map(XmlNode::Element));
    first_body.children.extend(tail);

    first.set_xml_part(&first_main, &first_doc)?;
    debug!(
        blocks = report.blocks,
        relationships = report.relationships,
        "merged document body"
    );
    Ok(report)
}

/// Open `first` and `second`, merge them and save the result to `output`.
#[instrument(skip(options))]
pub fn merge_files(
    first: &Path,
    second: &Path,
    output: &Path,
    options: &MergeOptions,
) -> Result<MergeReport> {
    let mut package = DocxPackage::open(first).map_err(|e| e.at(first))?;
    let other = DocxPackage::open(second).map_err(|e| e.at(second))?;
    let report = merge_documents(&mut package, &other, options).map_err(|e| e.at(second))?;
    package.save(output).map_err(|e| e.at(output))?;
    info!("Merged {:?} and {:?} into {:?}", first, second, output);
    Ok(report)
}

/// Body children to append: every element before the final `w:sectPr`.
fn body_blocks(body: &XmlElement) -> Vec<XmlElement> {
    let end = final_sect_pr_index(body).unwrap_or(body.children.len());
    body.children[..end]
        .iter()
        .filter_map(|node| match node {
            XmlNode::Element(el) => Some(el.clone()),
            _ => None,
        })
        .collect()
}

fn final_sect_pr_index(body: &XmlElement) -> Option<usize> {
    body.children
        .iter()
        .rposition(|node| matches!(node, XmlNode::Element(_)))
        .filter(|&idx| matches!(&body.children[idx], XmlNode::Element(el) if el.is(W_SECT_PR)))
}

fn drop_header_footer_references(el: &mut XmlElement) {
    if el.is(W_SECT_PR) {
        el.children.retain(|node| {
            !matches!(node, XmlNode::Element(c) if c.is(HEADER_REFERENCE) || c.is(FOOTER_REFERENCE))
        });
    }
}

fn page_break_paragraph() -> XmlElement {
    XmlElement::new(W_P).with_child(
        XmlElement::new(W_R).with_child(XmlElement::new(W_BR).with_attr("w:type", "page")),
    )
}

/// Prefix bound to `namespace` on `root`, e.g. `r` for `xmlns:r="..."`.
fn namespace_prefix(root: &XmlElement, namespace: &str) -> Option<String> {
    root.attributes
        .iter()
        .find(|(key, value)| key.starts_with("xmlns:") && value == namespace)
        .map(|(key, _)| key["xmlns:".len()..].to_string())
}

/// Declare on `target` every prefix used by `source` that `target` lacks.
fn copy_namespace_declarations(target: &mut XmlElement, source: &XmlElement) {
    for (key, value) in &source.attributes {
        if !key.starts_with("xmlns:") {
            continue;
        }
        match target.attr(key).map(str::to_string) {
            None => target.set_attr(key.clone(), value.clone()),
            Some(existing) if existing != *value => {
                warn!("Namespace prefix {} is bound differently in merged documents", key);
            }
            Some(_) => {}
        }
    }
}

struct RelationshipCopier<'a> {
    first: &'a mut DocxPackage,
    second: &'a DocxPackage,
    first_main: &'a str,
    second_main: &'a str,
    first_rels: Relationships,
    second_rels: Relationships,
    /// Relationship id in `second` -> id assigned in `first`.
    ids: HashMap<String, String>,
    /// Part name in `second` -> name of its copy in `first`.
    parts: HashMap<String, String>,
    report: &'a mut MergeReport,
}

impl RelationshipCopier<'_> {
    fn retarget(
        &mut self,
        el: &mut XmlElement,
        source_prefix: &str,
        target_prefix: &str,
    ) -> Result<()> {
        let qualifier = format!("{source_prefix}:");
        for attr in &mut el.attributes {
            let Some(local) = attr.0.strip_prefix(&qualifier) else {
                continue;
            };
            let local = local.to_string();
            if let Some(new_id) = self.copy_relationship(&attr.1)? {
                attr.1 = new_id;
            }
            if source_prefix != target_prefix {
                attr.0 = format!("{target_prefix}:{local}");
            }
        }
        for child in el.elements_mut() {
            self.retarget(child, source_prefix, target_prefix)?;
        }
        Ok(())
    }

    fn copy_relationship(&mut self, old_id: &str) -> Result<Option<String>> {
        if let Some(new_id) = self.ids.get(old_id) {
            return Ok(Some(new_id.clone()));
        }
        let Some(rel) = self.second_rels.get(old_id).cloned() else {
            warn!("Relationship {} referenced by merged content does not exist", old_id);
            return Ok(None);
        };
        if rel.has_type_suffix(HEADER_SUFFIX) || rel.has_type_suffix(FOOTER_SUFFIX) {
            return Ok(None);
        }

        let new_id = if rel.external {
            self.first_rels.push(&rel.rel_type, &rel.target, true)
        } else {
            let source_part = resolve_target(self.second_main, &rel.target);
            let Some(new_part) = self.copy_part_tree(&source_part)? else {
                warn!("Part {} referenced by {} is missing", source_part, old_id);
                return Ok(None);
            };
            let target = relative_target(self.first_main, &new_part);
            self.first_rels.push(&rel.rel_type, &target, false)
        };

        self.report.relationships += 1;
        self.ids.insert(old_id.to_string(), new_id.clone());
        Ok(Some(new_id))
    }

    /// Copy `source_part` and every internal part reachable through its own
    /// relationships. Returns the copy's name, or `None` when `second` lacks
    /// the part. Each part is copied once.
    fn copy_part_tree(&mut self, source_part: &str) -> Result<Option<String>> {
        if let Some(copied) = self.parts.get(source_part) {
            return Ok(Some(copied.clone()));
        }
        let Some(data) = self.second.part(source_part).map(<[u8]>::to_vec) else {
            return Ok(None);
        };
        let new_part = self.copy_part(source_part, data)?;
        self.parts.insert(source_part.to_string(), new_part.clone());

        let mut rels = self.second.relationships(source_part)?;
        if rels.items.is_empty() {
            return Ok(Some(new_part));
        }
        for rel in rels.items.iter_mut().filter(|rel| !rel.external) {
            let dependency = resolve_target(source_part, &rel.target);
            match self.copy_part_tree(&dependency)? {
                Some(copied) => rel.target = relative_target(&new_part, &copied),
                None => warn!("Part {} referenced by {} is missing", dependency, source_part),
            }
        }
        self.first.set_relationships(&new_part, &rels)?;
        self.first.ensure_default_content_type("rels", RELS_CONTENT_TYPE)?;
        Ok(Some(new_part))
    }

    fn copy_part(&mut self, source_part: &str, data: Vec<u8>) -> Result<String> {
        let (dir, file) = source_part.rsplit_once('/').unwrap_or(("word", source_part));
        let (stem, extension) = file.rsplit_once('.').unwrap_or((file, "bin"));
        let stem = stem.trim_end_matches(|c: char| c.is_ascii_digit());
        let new_part = self.first.unique_part_name(dir, stem, extension);
        self.first.set_part(&new_part, data);

        match override_content_type(self.second, source_part)? {
            Some(content_type) => add_override(self.first, &new_part, &content_type)?,
            None => {
                let content_type = default_content_type(self.second, extension)?
                    .unwrap_or_else(|| media_content_type(extension).to_string());
                self.first.ensure_default_content_type(extension, &content_type)?;
            }
        }
        debug!("Copied {} to {}", source_part, new_part);
        self.report.copied_parts.push(new_part.clone());
        Ok(new_part)
    }

    fn finish(self) -> Result<()> {
        if !self.ids.is_empty() {
            self.first.set_relationships(self.first_main, &self.first_rels)?;
        }
        Ok(())
    }
}

fn content_types(package: &DocxPackage) -> Result<Option<XmlDocument>> {
    if !package.has_part(CONTENT_TYPES_PART) {
        return Ok(None);
    }
    package.xml_part(CONTENT_TYPES_PART).map(Some)
}

fn override_content_type(package: &DocxPackage, part: &str) -> Result<Option<String>> {
    let Some(doc) = content_types(package)? else {
        return Ok(None);
    };
    let part_name = format!("/{part}");
    let content_type = doc
        .root
        .elements()
        .find(|el| {
            el.local_name() == "Override" && el.attr("PartName") == Some(part_name.as_str())
        })
        .and_then(|el| el.attr("ContentType"))
        .map(str::to_string);
    Ok(content_type)
}

fn default_content_type(package: &DocxPackage, extension: &str) -> Result<Option<String>> {
    let Some(doc) = content_types(package)? else {
        return Ok(None);
    };
    let content_type = doc
        .root
        .elements()
        .find(|el| {
            el.local_name() == "Default"
                && el
                    .attr("Extension")
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .and_then(|el| el.attr("ContentType"))
        .map(str::to_string);
    Ok(content_type)
}

fn add_override(package: &mut DocxPackage, part: &str, content_type: &str) -> Result<()> {
    let mut doc = package.xml_part(CONTENT_TYPES_PART)?;
    doc.root.children.push(XmlNode::Element(
        XmlElement::new("Override")
            .with_attr("PartName", format!("/{part}"))
            .with_attr("ContentType", content_type),
    ));
    package.set_xml_part(CONTENT_TYPES_PART, &doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::{paragraph_text, paragraphs};
    use pretty_assertions::assert_eq;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
    const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    fn rel_type(name: &str) -> String {
        format!("{REL_BASE}/{name}")
    }

    fn document(body: &str) -> Vec<u8> {
        format!(
            "<w:document xmlns:w=\"{W_NS}\" xmlns:r=\"{OFFICE_RELATIONSHIPS_NS}\">\
             <w:body>{body}</w:body></w:document>"
        )
        .into_bytes()
    }

    fn content_types_xml() -> Vec<u8> {
        concat!(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
            "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
            "<Override PartName=\"/word/document.xml\" ContentType=\"main\"/>",
            "</Types>"
        )
        .as_bytes()
        .to_vec()
    }

    fn first_package() -> DocxPackage {
        let mut package = DocxPackage::default();
        package.set_part(CONTENT_TYPES_PART, content_types_xml());
        package.set_part(
            "word/document.xml",
            document(concat!(
                "<w:p><w:r><w:t>first</w:t></w:r></w:p>",
                "<w:sectPr><w:pgSz w:w=\"11906\"/></w:sectPr>"
            )),
        );
        let mut rels = Relationships::default();
        rels.push(&rel_type("image"), "media/image1.png", false);
        package.set_relationships("word/document.xml", &rels).unwrap();
        package.set_part("word/media/image1.png", vec![1, 1]);
        package
    }

    fn second_package() -> DocxPackage {
        let mut package = DocxPackage::default();
        package.set_part(CONTENT_TYPES_PART, content_types_xml());
        package.set_part(
            "word/document.xml",
            document(concat!(
                "<w:p><w:r><w:t>second</w:t></w:r></w:p>",
                "<w:p><w:r><w:drawing><a:blip xmlns:a=\"urn:a\" r:embed=\"rId1\"/></w:drawing></w:r></w:p>",
                "<w:p><w:hyperlink r:id=\"rId2\"><w:r><w:t>link</w:t></w:r></w:hyperlink></w:p>",
                "<w:sectPr><w:headerReference w:type=\"default\" r:id=\"rId3\"/></w:sectPr>"
            )),
        );
        let mut rels = Relationships::default();
        rels.push(&rel_type("image"), "media/image1.png", false);
        rels.push(&rel_type("hyperlink"), "https://example.com", true);
        package.set_relationships("word/document.xml", &rels).unwrap();
        package.set_part("word/media/image1.png", vec![2, 2]);
        package
    }

    fn body_texts(package: &DocxPackage) -> Vec<String> {
        let doc = package.xml_part("word/document.xml").unwrap();
        paragraphs(&doc.root).into_iter().map(paragraph_text).collect()
    }

    #[test]
    fn test_appends_body_before_final_section() {
        let mut first = first_package();
        let report =
            merge_documents(&mut first, &second_package(), &MergeOptions::default()).unwrap();
        assert_eq!(report.blocks, 3);
        assert_eq!(body_texts(&first), vec!["first", "\n", "second", "", "link"]);

        let doc = first.xml_part("word/document.xml").unwrap();
        let body = doc.root.child(W_BODY).unwrap();
        let last = body.elements().last().unwrap();
        assert!(last.is(W_SECT_PR));
        assert!(last.child("w:pgSz").is_some());
        assert_eq!(body.children_named(W_SECT_PR).count(), 1);
    }

    #[test]
    fn test_page_break_is_optional() {
        let mut first = first_package();
        let options = MergeOptions { page_break: false };
        merge_documents(&mut first, &second_package(), &options).unwrap();
        assert_eq!(body_texts(&first), vec!["first", "second", "", "link"]);
    }

    #[test]
    fn test_images_and_links_are_retargeted() {
        let mut first = first_package();
        let report =
            merge_documents(&mut first, &second_package(), &MergeOptions::default()).unwrap();
        assert_eq!(report.relationships, 2);
        assert_eq!(report.copied_parts, vec!["word/media/image2.png".to_string()]);
        assert_eq!(first.part("word/media/image1.png"), Some(&[1u8, 1][..]));
        assert_eq!(first.part("word/media/image2.png"), Some(&[2u8, 2][..]));

        let rels = first.relationships("word/document.xml").unwrap();
        let image = rels.get("rId2").unwrap();
        assert_eq!(image.target, "media/image2.png");
        let link = rels.get("rId3").unwrap();
        assert!(link.external);
        assert_eq!(link.target, "https://example.com");

        let xml = String::from_utf8(first.part("word/document.xml").unwrap().to_vec()).unwrap();
        assert!(xml.contains("r:embed=\"rId2\""));
        assert!(xml.contains("<w:hyperlink r:id=\"rId3\">"));
        assert!(!xml.contains("w:headerReference"));

        let types = String::from_utf8(first.part(CONTENT_TYPES_PART).unwrap().to_vec()).unwrap();
        assert!(types.contains("Extension=\"png\" ContentType=\"image/png\""));
    }

    #[test]
    fn test_missing_body_is_an_error() {
        let mut first = first_package();
        let mut second = DocxPackage::default();
        second.set_part("word/document.xml", b"<w:document xmlns:w=\"urn:w\"/>".to_vec());
        let err = merge_documents(&mut first, &second, &MergeOptions::default()).unwrap_err();
        assert!(matches!(err, FillError::InvalidPackage(_)));
    }

    fn chart_package() -> DocxPackage {
        let mut package = DocxPackage::default();
        package.set_part(
            CONTENT_TYPES_PART,
            concat!(
                "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
                "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
                "<Default Extension=\"xlsx\" ContentType=\"application/vnd.openxmlformats-",
                "officedocument.spreadsheetml.sheet\"/>",
                "<Override PartName=\"/word/charts/chart1.xml\" ContentType=\"chart\"/>",
                "</Types>"
            )
            .as_bytes()
            .to_vec(),
        );
        package.set_part(
            "word/document.xml",
            document(concat!(
                "<w:p><w:r><w:drawing>",
                "<c:chart xmlns:c=\"urn:c\" r:id=\"rId1\"/>",
                "</w:drawing></w:r></w:p>"
            )),
        );
        let mut rels = Relationships::default();
        rels.push(&rel_type("chart"), "charts/chart1.xml", false);
        package.set_relationships("word/document.xml", &rels).unwrap();
        package.set_part("word/charts/chart1.xml", b"<c:chartSpace xmlns:c=\"urn:c\"/>".to_vec());

        let mut chart_rels = Relationships::default();
        chart_rels.push(
            &rel_type("package"),
            "../embeddings/Microsoft_Excel_Worksheet.xlsx",
            false,
        );
        chart_rels.push(&rel_type("hyperlink"), "https://example.com/data", true);
        package.set_relationships("word/charts/chart1.xml", &chart_rels).unwrap();
        package.set_part("word/embeddings/Microsoft_Excel_Worksheet.xlsx", vec![7, 7]);
        package
    }

    #[test]
    fn test_copied_parts_keep_their_own_relationships() {
        let mut first = first_package();
        first.set_part("word/charts/chart1.xml", b"<c:chartSpace xmlns:c=\"urn:c\"/>".to_vec());
        let report =
            merge_documents(&mut first, &chart_package(), &MergeOptions::default()).unwrap();

        assert_eq!(
            report.copied_parts,
            vec![
                "word/charts/chart2.xml".to_string(),
                "word/embeddings/Microsoft_Excel_Worksheet1.xlsx".to_string(),
            ]
        );
        assert_eq!(
            first.part("word/embeddings/Microsoft_Excel_Worksheet1.xlsx"),
            Some(&[7u8, 7][..])
        );

        let chart_rels = first.relationships("word/charts/chart2.xml").unwrap();
        assert_eq!(chart_rels.items.len(), 2);
        let embedding = chart_rels.get("rId1").unwrap();
        assert_eq!(
            resolve_target("word/charts/chart2.xml", &embedding.target),
            "word/embeddings/Microsoft_Excel_Worksheet1.xlsx"
        );
        let link = chart_rels.get("rId2").unwrap();
        assert!(link.external);
        assert_eq!(link.target, "https://example.com/data");

        let main_rels = first.relationships("word/document.xml").unwrap();
        assert_eq!(main_rels.get("rId2").unwrap().target, "charts/chart2.xml");
        let xml = String::from_utf8(first.part("word/document.xml").unwrap().to_vec()).unwrap();
        assert!(xml.contains("<c:chart xmlns:c=\"urn:c\" r:id=\"rId2\"/>"));

        let types = String::from_utf8(first.part(CONTENT_TYPES_PART).unwrap().to_vec()).unwrap();
        assert!(types.contains("PartName=\"/word/charts/chart2.xml\" ContentType=\"chart\""));
        assert!(types.contains("Extension=\"xlsx\""));
        assert!(types.contains("Extension=\"rels\""));
    }
}
