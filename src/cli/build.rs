use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::catalog::builder::{
    try_build, BuildOptions, BuildSummary, IntegrityPolicy, DEFAULT_BATCH_SIZE,
};
use crate::catalog::columnar::DEFAULT_ROW_GROUP_SIZE;
use crate::catalog::layout::StoreLayout;
use crate::cli::OutputFormat;
use crate::config::StoreConfig;
use crate::parsing::vcf::{read_vcf_file, VcfOptions};

#[derive(Args)]
pub struct BuildArgs {
    /// Filtered VCF (.vcf, .vcf.gz): biallelic SNVs on the standard chromosomes
    #[arg(required = true)]
    pub input: PathBuf,

    /// Map contig names such as chr17 or NC_000017.11 to 17 before validation
    #[arg(long)]
    pub standardize_contigs: bool,

    /// Keep the first occurrence of identifiers found on two chromosomes
    /// instead of failing the build
    #[arg(long)]
    pub allow_conflicts: bool,

    /// Fail if more than this fraction of records is rejected (0.0-1.0)
    #[arg(long, value_parser = parse_fraction)]
    pub max_reject_fraction: Option<f64>,

    /// Rows per Parquet record batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_row_count)]
    pub batch_size: usize,

    /// Rows per Parquet row group (the unit a lookup decodes)
    #[arg(long, default_value_t = DEFAULT_ROW_GROUP_SIZE, value_parser = parse_row_count)]
    pub row_group_size: usize,

    /// Skip writing the full-catalog table
    #[arg(long)]
    pub no_catalog: bool,
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not between 0.0 and 1.0"))
    }
}

fn parse_row_count(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1 row".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{s}' is not a positive integer")),
    }
}

/// Execute build subcommand
///
/// # Errors
///
/// Returns an error if the input cannot be read or the build fails. Nothing
/// is published on failure.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(
    args: BuildArgs,
    config: &StoreConfig,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    config.ensure_root()?;
    let layout = StoreLayout::new(config);

    let options = BuildOptions {
        integrity: if args.allow_conflicts {
            IntegrityPolicy::Report
        } else {
            IntegrityPolicy::Fail
        },
        max_reject_fraction: args.max_reject_fraction,
        batch_size: args.batch_size,
        row_group_size: args.row_group_size,
        write_catalog: !args.no_catalog,
    };

    if verbose {
        eprintln!(
            "Building catalog '{}' in {} from {}",
            layout.catalog(),
            layout.root().display(),
            args.input.display()
        );
    }

    let records = read_vcf_file(
        &args.input,
        VcfOptions {
            standardize_contigs: args.standardize_contigs,
        },
    )
    .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let summary = try_build(layout, options, records)
        .with_context(|| format!("Build from {} failed", args.input.display()))?;

    match format {
        OutputFormat::Text => print!("{summary}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Tsv => print_tsv_summary(&summary),
    }

    Ok(())
}

fn print_tsv_summary(summary: &BuildSummary) {
    println!("chromosome\trows\tfile");
    for partition in &summary.partitions {
        println!(
            "{}\t{}\t{}",
            partition.chromosome, partition.rows, partition.file
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraction() {
        assert_eq!(parse_fraction("0.25"), Ok(0.25));
        assert_eq!(parse_fraction("0"), Ok(0.0));
        assert!(parse_fraction("1.5").is_err());
        assert!(parse_fraction("-0.1").is_err());
        assert!(parse_fraction("lots").is_err());
    }

    #[test]
    fn test_parse_row_count() {
        assert_eq!(parse_row_count("500000"), Ok(500_000));
        assert!(parse_row_count("0").is_err());
        assert!(parse_row_count("-3").is_err());
    }
}
