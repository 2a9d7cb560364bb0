use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

mod csv_handler;
mod error;
mod package;
mod presentation;
mod slide_table;

use package::PptxPackage;

/// Renders the rows of a CSV file as a table on the first slide of a PPTX
/// presentation, styled from a template file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input CSV file with a header row
    csv_file: PathBuf,
    /// Output presentation file
    output_file: PathBuf,
    /// Template presentation providing slide layouts and styling
    #[arg(short, long, default_value = "template.pptx")]
    template: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data = csv_handler::load_csv_file(&args.csv_file)
        .with_context(|| format!("failed to read {}", args.csv_file.display()))?;
    anyhow::ensure!(
        !data.column_names.is_empty(),
        "{} has no header row",
        args.csv_file.display()
    );
    info!("Loaded {} data rows with columns {:?}", data.rows.len(), data.column_names);

    let mut pres = PptxPackage::open(&args.template)
        .with_context(|| format!("failed to open template {}", args.template.display()))?;
    presentation::generate_presentation(&mut pres, &data.rows, &data.column_names)?;

    pres.save(&args.output_file)
        .with_context(|| format!("failed to write {}", args.output_file.display()))?;
    info!("Wrote presentation to {}", args.output_file.display());
    Ok(())
}
