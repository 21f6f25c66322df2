//! Where templates live and where generated documents go.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use tracing::debug;

pub const DOC_DIR: &str = "doc";
pub const TEMPLATE_FILE: &str = "comanda.docx";
pub const GENERATED_DIR: &str = "Generated";
pub const OUTPUT_PREFIX: &str = "CAPAC+Comanda transport";

/// How many parent directories are searched for a `doc` folder.
const MAX_PARENT_LEVELS: usize = 6;

/// The closest directory at or above `start` (at most six levels up) that
/// contains a `doc` folder; `start` itself when there is none.
pub fn find_doc_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .take(MAX_PARENT_LEVELS + 1)
        .find(|dir| dir.join(DOC_DIR).is_dir())
        .unwrap_or(start)
        .to_path_buf()
}

/// Search from the working directory, then from the executable's directory.
pub fn discover_doc_root() -> PathBuf {
    let mut starts = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        starts.push(cwd);
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        starts.push(dir);
    }
    for start in &starts {
        let root = find_doc_root(start);
        if root.join(DOC_DIR).is_dir() {
            debug!("Using doc root {:?}", root);
            return root;
        }
    }
    starts.into_iter().next().unwrap_or_else(|| PathBuf::from("."))
}

pub fn template_path(root: &Path) -> PathBuf {
    root.join(DOC_DIR).join(TEMPLATE_FILE)
}

pub fn generated_dir(root: &Path) -> PathBuf {
    root.join(DOC_DIR).join(GENERATED_DIR)
}

/// `CAPAC+Comanda transport - yyyy-MM-dd HH.mm.ss.docx`
pub fn output_file_name(now: NaiveDateTime) -> String {
    format!("{OUTPUT_PREFIX} - {}.docx", now.format("%Y-%m-%d %H.%M.%S"))
}

/// The template to fill: `explicit` when given, else `<root>/doc/comanda.docx`.
pub fn resolve_template(explicit: Option<&Path>, root: &Path) -> Result<PathBuf> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| template_path(root));
    if !path.is_file() {
        bail!("Template not found at {}", path.display());
    }
    Ok(path)
}
