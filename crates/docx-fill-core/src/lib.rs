//! Fill DOCX templates by replacing literal placeholders, even when Word has
//! split them across formatting runs, and concatenate generated documents.

pub mod color;
pub mod error;
pub mod merge;
pub mod package;
pub mod rels;
pub mod replace;
pub mod replacements;
pub mod template;
pub mod text;
pub mod traverse;
pub mod xml;

pub use error::{FillError, Result};
pub use merge::{merge_documents, merge_files, MergeOptions, MergeReport};
pub use package::DocxPackage;
pub use replace::{replace_in_paragraph, CrossRunStyle, Substitution};
pub use replacements::ReplacementSet;
pub use template::{fill_package, generate, FillOptions, FillReport, PartReport};
pub use text::{extract_text, find_keys, KeyPresence};
