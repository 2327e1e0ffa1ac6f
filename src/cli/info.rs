use serde::Serialize;

use crate::catalog::store::{BuildManifest, VariantStore};
use crate::cli::OutputFormat;
use crate::config::StoreConfig;
use crate::core::types::Chromosome;

#[derive(Serialize)]
struct StoreInfo<'a> {
    root: String,
    catalog: &'a str,
    partitions: Vec<Chromosome>,
    catalog_table: bool,
    manifest: Option<BuildManifest>,
}

/// Execute info subcommand
///
/// # Errors
///
/// Returns an error if the build manifest exists but cannot be read.
pub fn run(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = VariantStore::from_config(config);
    let layout = store.layout();
    let info = StoreInfo {
        root: layout.root().display().to_string(),
        catalog: layout.catalog(),
        partitions: store.chromosomes(),
        catalog_table: layout.catalog_path().is_file(),
        manifest: store.manifest()?,
    };

    match format {
        OutputFormat::Text => print_text_info(&info),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Tsv => print_tsv_info(&info),
    }
    Ok(())
}

fn print_text_info(info: &StoreInfo<'_>) {
    println!("Root:    {}", info.root);
    println!("Catalog: {}", info.catalog);

    if info.partitions.is_empty() {
        println!("\nNo partitions published. Run `variantdb build` first.");
        return;
    }

    let labels: Vec<&str> = info.partitions.iter().map(|c| c.label()).collect();
    println!("\nPartitions ({}): {}", labels.len(), labels.join(", "));
    println!(
        "Catalog table: {}",
        if info.catalog_table { "present" } else { "absent" }
    );

    if let Some(manifest) = &info.manifest {
        println!("\nLast build: {}", manifest.created_at);
        println!("  Records:  {}", manifest.total_records);
        println!("  Accepted: {}", manifest.accepted);
        println!("  Rejected: {}", manifest.rejected.total());
        for (reason, count) in manifest.rejected.iter() {
            println!("    - {reason}: {count}");
        }
        if !manifest.conflicts.is_empty() {
            println!("  Conflicts kept as first occurrence: {}", manifest.conflicts.len());
        }
    }
}

fn print_tsv_info(info: &StoreInfo<'_>) {
    println!("chromosome\trows\tfile");
    for chromosome in &info.partitions {
        let entry = info
            .manifest
            .as_ref()
            .and_then(|m| m.partitions.iter().find(|p| p.chromosome == *chromosome));
        match entry {
            Some(entry) => println!("{chromosome}\t{}\t{}", entry.rows, entry.file),
            None => println!("{chromosome}\t.\t."),
        }
    }
}
