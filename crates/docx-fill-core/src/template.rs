//! Filling a template package: substitution plus colour normalisation over
//! the main document, headers and footers.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::color::force_text_color;
use crate::error::Result;
use crate::package::DocxPackage;
use crate::replace::{CrossRunStyle, Substitution};
use crate::replacements::ReplacementSet;

pub const DEFAULT_TEXT_COLOR: &str = "000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillOptions {
    pub cross_run: CrossRunStyle,
    /// Hex colour applied to every run after substitution; `None` keeps the template's colours.
    pub force_color: Option<String>,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            cross_run: CrossRunStyle::default(),
            force_color: Some(DEFAULT_TEXT_COLOR.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartReport {
    pub part: String,
    pub replacements: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    pub parts: Vec<PartReport>,
    /// Keys that were not found anywhere in the document.
    pub unmatched_keys: Vec<String>,
}

impl FillReport {
    pub fn total(&self) -> usize {
        self.parts.iter().map(|p| p.replacements).sum()
    }
}

/// Apply `set` to the main document part and every header and footer part.
pub fn fill_package(
    package: &mut DocxPackage,
    set: &ReplacementSet,
    options: &FillOptions,
) -> Result<FillReport> {
    let substitution = Substitution::new(set, options.cross_run)?;
    let mut parts = vec![package.main_document_part()];
    parts.extend(package.header_footer_parts()?);

    let mut report = FillReport::default();
    let mut key_hits = vec![0usize; substitution.keys().len()];

    for part in parts {
        let mut doc = package.xml_part(&part)?;
        let hits = substitution.apply_to_tree(&mut doc.root);
        let replacements: usize = hits.iter().sum();
        for (total, n) in key_hits.iter_mut().zip(&hits) {
            *total += n;
        }

        let recolored = match &options.force_color {
            Some(hex) => force_text_color(&mut doc.root, hex),
            None => 0,
        };
        if replacements > 0 || recolored > 0 {
            package.set_xml_part(&part, &doc)?;
        }
        debug!(part = %part, replacements, recolored, "filled part");
        report.parts.push(PartReport { part, replacements });
    }

    report.unmatched_keys = substitution
        .keys()
        .iter()
        .zip(&key_hits)
        .filter(|(_, &n)| n == 0)
        .map(|(key, _)| key.clone())
        .collect();
    Ok(report)
}

/// Open `template`, fill it and save the result to `output`.
#[instrument(skip(set, options), fields(keys = set.len()))]
pub fn generate(
    template: &Path,
    output: &Path,
    set: &ReplacementSet,
    options: &FillOptions,
) -> Result<FillReport> {
    let mut package = DocxPackage::open(template).map_err(|e| e.at(template))?;
    let report = fill_package(&mut package, set, options).map_err(|e| e.at(template))?;
    package.save(output).map_err(|e| e.at(output))?;

    if !report.unmatched_keys.is_empty() {
        warn!("Placeholders not found in template: {}", report.unmatched_keys.join(", "));
    }
    info!(
        "Generated {:?} from {:?} ({} replacements)",
        output,
        template,
        report.total()
    );
    Ok(report)
}
