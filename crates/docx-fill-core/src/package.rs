//! DOCX package I/O: the zip container and its parts.

use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FillError, Result};
use crate::rels::{
    rels_part_for, resolve_target, Relationships, FOOTER_SUFFIX, HEADER_SUFFIX,
    OFFICE_DOCUMENT_SUFFIX,
};
use crate::xml::{XmlDocument, XmlElement, XmlNode};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const DEFAULT_MAIN_PART: &str = "word/document.xml";

#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    data: Vec<u8>,
}

/// An opened DOCX package. Entry order is preserved on write.
#[derive(Debug, Clone, Default)]
pub struct DocxPackage {
    entries: Vec<PackageEntry>,
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let package = Self::from_reader(file)?;
        debug!("Opened package {:?} ({} parts)", path, package.entries.len());
        Ok(package)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            entries.push(PackageEntry { name, data });
        }
        Ok(Self { entries })
    }

    /// Write the package as a zip stream. Media is STORED, everything else DEFLATED.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for entry in &self.entries {
            let options = if entry.name.starts_with("word/media/") {
                stored
            } else {
                deflated
            };
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }
        Ok(zip.finish()?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Save to `path`, writing a sibling temp file first and renaming it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("docx.tmp");
        let file = File::create(&temp_path)?;
        if let Err(e) = self.write_to(file) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        fs::rename(&temp_path, path)?;
        info!("Saved package to {:?}", path);
        Ok(())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Replace a part's bytes, or append the part when it does not exist yet.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(PackageEntry {
                name: name.to_string(),
                data,
            }),
        }
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(pos).data)
    }

    pub fn xml_part(&self, name: &str) -> Result<XmlDocument> {
        let bytes = self
            .part(name)
            .ok_or_else(|| FillError::MissingPart(name.to_string()))?;
        XmlDocument::parse_bytes(name, bytes)
    }

    pub fn set_xml_part(&mut self, name: &str, doc: &XmlDocument) -> Result<()> {
        self.set_part(name, doc.to_bytes()?);
        Ok(())
    }

    /// Relationships owned by `part`; empty when the part has no `.rels`.
    pub fn relationships(&self, part: &str) -> Result<Relationships> {
        let rels_name = rels_part_for(part);
        match self.part(&rels_name) {
            Some(bytes) => {
                let xml = std::str::from_utf8(bytes).map_err(|e| FillError::xml(&rels_name, e))?;
                Relationships::parse(&rels_name, xml)
            }
            None => Ok(Relationships::default()),
        }
    }

    pub fn set_relationships(&mut self, part: &str, rels: &Relationships) -> Result<()> {
        self.set_part(&rels_part_for(part), rels.to_xml()?.into_bytes());
        Ok(())
    }

    /// The main document part, found through the package relationships.
    pub fn main_document_part(&self) -> String {
        self.relationships("")
            .ok()
            .and_then(|rels| {
                rels.of_type(OFFICE_DOCUMENT_SUFFIX)
                    .find(|rel| !rel.external)
                    .map(|rel| resolve_target("", &rel.target))
            })
            .filter(|name| self.has_part(name))
            .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string())
    }

    /// Header and footer parts referenced by the main document.
    ///
    /// Falls back to part names when the main part carries no relationships.
    pub fn header_footer_parts(&self) -> Result<Vec<String>> {
        let main = self.main_document_part();
        let rels = self.relationships(&main)?;
        let mut parts: Vec<String> = rels
            .items
            .iter()
            .filter(|rel| {
                !rel.external
                    && (rel.has_type_suffix(HEADER_SUFFIX) || rel.has_type_suffix(FOOTER_SUFFIX))
            })
            .map(|rel| resolve_target(&main, &rel.target))
            .filter(|name| self.has_part(name))
            .collect();

        if rels.items.is_empty() {
            parts = self
                .part_names()
                .filter(|name| {
                    (name.starts_with("word/header") || name.starts_with("word/footer"))
                        && name.ends_with(".xml")
                })
                .map(str::to_string)
                .collect();
        }
        parts.dedup();
        Ok(parts)
    }

    /// Make sure `[Content_Types].xml` declares a default for `extension`.
    pub fn ensure_default_content_type(
        &mut self,
        extension: &str,
        content_type: &str,
    ) -> Result<()> {
        let mut doc = self.xml_part(CONTENT_TYPES_PART)?;
        let exists = doc.root.elements().any(|el| {
            el.local_name() == "Default"
                && el
                    .attr("Extension")
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        });
        if exists {
            return Ok(());
        }
        let default = XmlElement::new("Default")
            .with_attr("Extension", extension)
            .with_attr("ContentType", content_type);
        // Defaults conventionally precede overrides.
        let pos = doc
            .root
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(el) if el.local_name() == "Override"))
            .unwrap_or(doc.root.children.len());
        doc.root.children.insert(pos, XmlNode::Element(default));
        self.set_xml_part(CONTENT_TYPES_PART, &doc)?;
        debug!("Registered content type {} for .{}", content_type, extension);
        Ok(())
    }

    /// A part name under `dir` that is not yet used, e.g. `word/media/image3.png`.
    pub fn unique_part_name(&self, dir: &str, stem: &str, extension: &str) -> String {
        let mut n = 1usize;
        loop {
            let candidate = format!("{dir}/{stem}{n}.{extension}");
            if !self.has_part(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// MIME type for common media extensions carried by DOCX packages.
pub fn media_content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}
