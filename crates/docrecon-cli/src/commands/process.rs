//! Process command - reconcile a single document file.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use docrecon_core::{DocumentPipeline, PdfTextSource, PipelineOutcome, PipelineStage};

use super::{load_config, mime_for_path, open_cache};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or plain text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Contact cache file
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output (line items)
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    if config.our_companies.is_empty() {
        anyhow::bail!(
            "No reference companies configured; pass --config with an our_companies section"
        );
    }

    let cache = open_cache(&config, args.cache_file.as_ref());
    let pipeline = DocumentPipeline::new(config, cache, Arc::new(PdfTextSource::new()), None);

    let bytes = fs::read(&args.input)?;
    let mime = mime_for_path(&args.input);
    info!("processing {} ({})", args.input.display(), mime);

    let outcome = pipeline.process_bytes(&bytes, mime).await?;

    let rendered = match args.format {
        OutputFormat::Json => render_json(&outcome)?,
        OutputFormat::Csv => render_csv(&outcome)?,
        OutputFormat::Text => render_text(&outcome),
    };

    match &args.output {
        Some(path) => fs::write(path, rendered)?,
        None => println!("{}", rendered),
    }

    info!("done in {} ms", start.elapsed().as_millis());
    Ok(())
}

fn render_json(outcome: &PipelineOutcome) -> anyhow::Result<String> {
    let value = serde_json::json!({
        "stage": outcome.stage,
        "recommended_action": outcome.recommended_action,
        "cache_status": outcome.cache_lookup.as_ref().map(|l| l.status),
        "document": outcome.document,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn render_csv(outcome: &PipelineOutcome) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["name", "quantity", "unit_price", "tax_percent", "tax_inclusive"])?;

    for item in &outcome.document.line_items {
        writer.write_record([
            item.name.as_str(),
            &item.quantity.to_string(),
            &item.unit_price.to_string(),
            &item.tax_percent.as_percent().to_string(),
            &item.is_tax_inclusive.to_string(),
        ])?;
    }

    Ok(String::from_utf8(writer.into_inner()?)?)
}

fn render_text(outcome: &PipelineOutcome) -> String {
    let doc = &outcome.document;
    let mut out = String::new();

    if outcome.stage == PipelineStage::SkippedNotOurs {
        out.push_str(&format!(
            "{} {}\n",
            style("SKIPPED:").red().bold(),
            doc.skip_reason.as_deref().unwrap_or("not our document")
        ));
        return out;
    }

    out.push_str(&format!("{}\n", style("Document").bold()));
    out.push_str(&format!("  type:        {:?}\n", doc.document_type));
    out.push_str(&format!(
        "  number:      {}\n",
        doc.bill_number.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!(
        "  issued:      {}\n",
        doc.issue_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
    ));
    out.push_str(&format!(
        "  due:         {}\n",
        doc.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
    ));
    out.push_str(&format!(
        "  currency:    {}\n",
        doc.currency.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!(
        "  net total:   {}\n",
        doc.total_amount_net.map(|a| a.to_string()).unwrap_or_else(|| "-".into())
    ));

    out.push_str(&format!("\n{}\n", style("Supplier").bold()));
    out.push_str(&format!("  name:        {}\n", doc.supplier.name));
    out.push_str(&format!(
        "  tax id:      {}\n",
        doc.supplier.tax_id.as_ref().map(|t| t.normalized.as_str()).unwrap_or("-")
    ));
    out.push_str(&format!(
        "  country:     {}\n",
        doc.supplier.country.as_deref().unwrap_or("-")
    ));

    out.push_str(&format!("\n{}\n", style("Our company").bold()));
    out.push_str(&format!("  name:        {}\n", doc.our_company.name));

    if !doc.line_items.is_empty() {
        out.push_str(&format!(
            "\n{} ({} rows)\n",
            style("Line items").bold(),
            doc.line_items.len()
        ));
        for item in &doc.line_items {
            out.push_str(&format!(
                "  {:3} x {} @ {} ({}%)\n",
                item.quantity,
                item.name,
                item.unit_price,
                item.tax_percent.as_percent()
            ));
        }
    }

    if let Some(action) = &outcome.recommended_action {
        out.push_str(&format!(
            "\n{} {:?}\n",
            style("Recommended action:").bold(),
            action
        ));
    }

    for warning in &doc.warnings {
        out.push_str(&format!("{} {}\n", style("warning:").yellow(), warning));
    }

    out
}
