//! `docx-fill`: fill the shipment order template, merge generated documents
//! and prepare an email draft.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use docx_fill_core::{
    extract_text, find_keys, generate, merge_files, DocxPackage, FillReport, MergeOptions,
    MergeReport,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod mail;
mod order;
mod paths;

use config::{doc_root, CheckArgs, Cli, Command, GenerateArgs, MergeArgs, TextArgs};
use mail::DraftMessage;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Merge(args) => run_merge(args),
        Command::Check(args) => run_check(args),
        Command::Text(args) => run_text(args),
    }
}

#[derive(Debug, Serialize)]
struct GenerateSummary {
    output: PathBuf,
    #[serde(flatten)]
    fill: FillReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    merge: Option<MergeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_draft: Option<PathBuf>,
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let root = doc_root(args.doc_root.as_deref());
    let template = paths::resolve_template(args.template.as_deref(), &root)?;
    let now = Local::now();
    let set = args.order.replacements(now.date_naive())?;

    let output = match &args.output {
        Some(path) => path.clone(),
        None => paths::generated_dir(&root).join(paths::output_file_name(now.naive_local())),
    };
    info!("Filling {:?} with {} placeholders", template, set.len());
    let fill = generate(&template, &output, &set, &args.fill_options())
        .with_context(|| format!("Failed to generate document from {}", template.display()))?;

    let merge = match &args.merge_with {
        Some(other) => Some(
            merge_files(&output, other, &output, &MergeOptions::default()).with_context(|| {
                format!("Failed to merge {} into the generated document", other.display())
            })?,
        ),
        None => None,
    };

    let email_draft = if args.draft_email {
        let draft = DraftMessage::new(&output, &args.mail_from)?
            .with_recipients(args.mail_to.iter().map(String::as_str))?;
        let eml = draft.write_eml()?;
        if !mail::open_draft(&eml, &output) {
            info!("Email draft could not be opened; opened the document instead");
        }
        Some(eml)
    } else {
        if args.open {
            mail::open_document(&output);
        }
        None
    };

    if args.json {
        let summary = GenerateSummary {
            output,
            fill,
            merge,
            email_draft,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", output.display());
    }
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let report = merge_files(&args.first, &args.second, &args.output, &args.merge_options())
        .context("Failed to merge documents")?;
    info!(
        "Appended {} blocks ({} relationships copied)",
        report.blocks, report.relationships
    );
    println!("{}", args.output.display());
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    let root = doc_root(args.doc_root.as_deref());
    let template = paths::resolve_template(args.template.as_deref(), &root)?;
    let set = args.order.replacements(Local::now().date_naive())?;
    let package = DocxPackage::open(&template)
        .with_context(|| format!("Failed to open {}", template.display()))?;
    let presence = find_keys(&package, &set)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&presence)?);
    } else {
        for key in &presence {
            if key.found() {
                println!("found    {}  ({})", key.key, key.parts.join(", "));
            } else {
                println!("missing  {}", key.key);
            }
        }
    }

    let missing = presence.iter().filter(|k| !k.found()).count();
    if args.strict && missing > 0 {
        bail!("{} placeholder(s) not found in {}", missing, template.display());
    }
    Ok(())
}

fn run_text(args: TextArgs) -> Result<()> {
    let package = DocxPackage::open(&args.docx)
        .with_context(|| format!("Failed to open {}", args.docx.display()))?;
    println!("{}", extract_text(&package)?);
    Ok(())
}
