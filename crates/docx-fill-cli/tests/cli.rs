use std::fs::{self, File};
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use docx_rs::{Docx, Paragraph, Run};
use predicates::prelude::*;
use rstest::*;
use tempfile::TempDir;

fn template() -> Docx {
    Docx::new()
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text("CLI"))
                .add_run(Run::new().add_text("ENT:").bold()),
        )
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("PRET:")))
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Data: {{Today}}")))
}

/// A directory laid out like an installation: `<root>/doc/comanda.docx`.
#[fixture]
fn doc_root() -> TempDir {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("doc")).unwrap();
    let file = File::create(root.path().join("doc").join("comanda.docx")).unwrap();
    template().build().pack(file).unwrap();
    root
}

fn generated_files(root: &Path) -> Vec<PathBuf> {
    fs::read_dir(root.join("doc").join("Generated"))
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

#[test]
fn test_help_lists_subcommands() {
    cargo_bin_cmd!("docx-fill")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("check"));
}

#[rstest]
fn test_generate_writes_timestamped_output(doc_root: TempDir) {
    cargo_bin_cmd!("docx-fill")
        .args(["generate", "--client", "ACME SRL", "--price", "900", "--currency", "EUR"])
        .arg("--doc-root")
        .arg(doc_root.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("CAPAC+Comanda transport - "));

    let files = generated_files(doc_root.path());
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("CAPAC+Comanda transport - "));
    assert!(name.ends_with(".docx"));
    assert!(!name.contains(':'));

    cargo_bin_cmd!("docx-fill")
        .arg("text")
        .arg(&files[0])
        .assert()
        .success()
        .stdout(predicate::str::contains("CLIENT: ACME SRL"))
        .stdout(predicate::str::contains("PRET: 900 EUR"))
        .stdout(predicate::str::contains("{{Today}}").not());
}

#[rstest]
fn test_generate_json_report(doc_root: TempDir) {
    let output = doc_root.path().join("out.docx");
    cargo_bin_cmd!("docx-fill")
        .args(["generate", "--json", "--set", "Data:=Ziua:"])
        .arg("--doc-root")
        .arg(doc_root.path())
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"unmatched_keys\""))
        .stdout(predicate::str::contains("\"output\""));
    assert!(output.is_file());
}

#[rstest]
fn test_check_strict_fails_on_missing_placeholders(doc_root: TempDir) {
    cargo_bin_cmd!("docx-fill")
        .args(["check", "--strict"])
        .arg("--doc-root")
        .arg(doc_root.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("found    CLIENT:"))
        .stdout(predicate::str::contains("missing  RUTA:"));
}

#[test]
fn test_missing_template_is_reported() {
    let empty = TempDir::new().unwrap();
    cargo_bin_cmd!("docx-fill")
        .arg("generate")
        .arg("--doc-root")
        .arg(empty.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Template not found"));
}

#[rstest]
fn test_merge_two_documents(doc_root: TempDir) {
    let template = doc_root.path().join("doc").join("comanda.docx");
    let merged = doc_root.path().join("merged.docx");
    cargo_bin_cmd!("docx-fill")
        .arg("merge")
        .arg(&template)
        .arg(&template)
        .arg("-o")
        .arg(&merged)
        .assert()
        .success();

    cargo_bin_cmd!("docx-fill")
        .arg("text")
        .arg(&merged)
        .assert()
        .success()
        .stdout(predicate::str::contains("PRET:").count(2));
}
