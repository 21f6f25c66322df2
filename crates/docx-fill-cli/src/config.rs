use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use docx_fill_core::{CrossRunStyle, FillOptions, MergeOptions, ReplacementSet};

use crate::mail::DEFAULT_FROM;
use crate::order::{parse_date, ShipmentOrder};

/// Fill shipment order templates and merge generated documents.
#[derive(Parser, Debug)]
#[command(name = "docx-fill", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a document from the template
    Generate(GenerateArgs),
    /// Append one document to another
    Merge(MergeArgs),
    /// Report which placeholders a template contains
    Check(CheckArgs),
    /// Print the text of a document
    Text(TextArgs),
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("empty placeholder in '{s}'")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Order form fields. Flags override values read from `--order`.
#[derive(Args, Debug, Clone, Default)]
pub struct OrderArgs {
    /// JSON file with the order fields
    #[arg(long, env = "DOCX_FILL_ORDER")]
    pub order: Option<PathBuf>,

    #[arg(long)]
    pub tank: Option<String>,

    /// Pickup date (dd/MM/yyyy); defaults to today
    #[arg(long, value_parser = parse_date)]
    pub pickup_date: Option<NaiveDate>,

    /// Delivery date (dd/MM/yyyy); defaults to tomorrow
    #[arg(long, value_parser = parse_date)]
    pub delivery_date: Option<NaiveDate>,

    #[arg(long)]
    pub loading_address: Option<String>,

    #[arg(long)]
    pub unloading_address: Option<String>,

    /// Cargo description
    #[arg(long)]
    pub description: Option<String>,

    /// Maximum payment term in days
    #[arg(long)]
    pub max_days: Option<String>,

    #[arg(long)]
    pub client: Option<String>,

    #[arg(long)]
    pub route: Option<String>,

    /// CAPAC sheet date (dd/MM/yyyy); defaults to today
    #[arg(long, value_parser = parse_date)]
    pub capac_date: Option<NaiveDate>,

    /// Truck registration number
    #[arg(long)]
    pub registration: Option<String>,

    #[arg(long)]
    pub carrier: Option<String>,

    #[arg(long)]
    pub price: Option<String>,

    #[arg(long)]
    pub currency: Option<String>,

    /// Loaded quantity in KG
    #[arg(long)]
    pub quantity: Option<String>,

    #[arg(long)]
    pub client_invoice: Option<String>,

    #[arg(long)]
    pub carrier_invoice: Option<String>,

    /// Extra placeholder, applied after the built-in ones (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub extra: Vec<(String, String)>,
}

impl OrderArgs {
    pub fn load(&self) -> Result<ShipmentOrder> {
        let mut order = match &self.order {
            Some(path) => ShipmentOrder::from_json_file(path)?,
            None => ShipmentOrder::default(),
        };

        let text_fields = [
            (&self.tank, &mut order.tank_number),
            (&self.loading_address, &mut order.loading_address),
            (&self.unloading_address, &mut order.unloading_address),
            (&self.description, &mut order.description),
            (&self.max_days, &mut order.max_payment_days),
            (&self.client, &mut order.client),
            (&self.route, &mut order.route),
            (&self.registration, &mut order.registration_number),
            (&self.carrier, &mut order.carrier),
            (&self.price, &mut order.price),
            (&self.currency, &mut order.currency),
            (&self.quantity, &mut order.quantity),
            (&self.client_invoice, &mut order.client_invoice),
            (&self.carrier_invoice, &mut order.carrier_invoice),
        ];
        for (flag, field) in text_fields {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }
        if self.pickup_date.is_some() {
            order.pickup_date = self.pickup_date;
        }
        if self.delivery_date.is_some() {
            order.delivery_date = self.delivery_date;
        }
        if self.capac_date.is_some() {
            order.capac_date = self.capac_date;
        }
        Ok(order)
    }

    /// The order's placeholders followed by the `--set` pairs.
    pub fn replacements(&self, today: NaiveDate) -> Result<ReplacementSet> {
        let mut set = self.load()?.replacements(today);
        set.extend(self.extra.iter().cloned());
        Ok(set)
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub order: OrderArgs,

    /// Template to fill; defaults to <doc root>/doc/comanda.docx
    #[arg(long, env = "DOCX_FILL_TEMPLATE")]
    pub template: Option<PathBuf>,

    /// Output file; defaults to <doc root>/doc/Generated/<timestamped name>
    #[arg(long, short, env = "DOCX_FILL_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory holding the `doc` folder; searched upwards when omitted
    #[arg(long, env = "DOCX_FILL_DOC_ROOT")]
    pub doc_root: Option<PathBuf>,

    /// Keep the template's text colours instead of forcing black
    #[arg(long)]
    pub no_color: bool,

    /// Rebuild paragraphs with split placeholders as a single run
    #[arg(long)]
    pub collapse_runs: bool,

    /// Append this document to the generated one
    #[arg(long)]
    pub merge_with: Option<PathBuf>,

    /// Write an email draft with the document attached and open it
    #[arg(long)]
    pub draft_email: bool,

    /// Sender of the email draft
    #[arg(long, env = "DOCX_FILL_MAIL_FROM", default_value = DEFAULT_FROM)]
    pub mail_from: String,

    /// Recipient of the email draft (repeatable)
    #[arg(long, env = "DOCX_FILL_MAIL_TO", value_delimiter = ',')]
    pub mail_to: Vec<String>,

    /// Open the generated document
    #[arg(long)]
    pub open: bool,

    /// Print a JSON report on stdout
    #[arg(long)]
    pub json: bool,
}

impl GenerateArgs {
    pub fn fill_options(&self) -> FillOptions {
        let defaults = FillOptions::default();
        FillOptions {
            cross_run: if self.collapse_runs {
                CrossRunStyle::CollapseParagraph
            } else {
                CrossRunStyle::FirstRun
            },
            force_color: if self.no_color { None } else { defaults.force_color },
        }
    }
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    pub first: PathBuf,
    pub second: PathBuf,

    #[arg(long, short)]
    pub output: PathBuf,

    /// Do not start the second document on a new page
    #[arg(long)]
    pub no_page_break: bool,
}

impl MergeArgs {
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            page_break: !self.no_page_break,
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Template to inspect; defaults to <doc root>/doc/comanda.docx
    pub template: Option<PathBuf>,

    #[command(flatten)]
    pub order: OrderArgs,

    #[arg(long, env = "DOCX_FILL_DOC_ROOT")]
    pub doc_root: Option<PathBuf>,

    /// Fail when a placeholder is missing from the template
    #[arg(long)]
    pub strict: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TextArgs {
    pub docx: PathBuf,
}

pub fn doc_root(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(crate::paths::discover_doc_root)
}
