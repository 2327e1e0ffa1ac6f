use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::catalog::store::VariantStore;
use crate::cli::OutputFormat;
use crate::config::StoreConfig;
use crate::lookup::engine::{MatchPolicy, QueryOptions};
use crate::lookup::result::{QueryResult, Resolution, RowView};

#[derive(Args)]
pub struct QueryArgs {
    /// rs-identifiers to resolve (e.g. rs1042522)
    pub ids: Vec<String>,

    /// File with one identifier per line; '-' reads stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Only look in this chromosome's partition (e.g. 17, chr17, MT)
    #[arg(short, long)]
    pub chromosome: Option<String>,

    /// Stop at the first chromosome holding an identifier instead of
    /// reporting every match
    #[arg(long)]
    pub first_match: bool,
}

/// Execute query subcommand
///
/// # Errors
///
/// Returns an error if no identifiers were given or a partition cannot be read.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(
    args: QueryArgs,
    config: &StoreConfig,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let ids = collect_ids(&args)?;
    if ids.is_empty() {
        anyhow::bail!("No identifiers given: pass them as arguments or with --input");
    }

    let store = VariantStore::from_config(config);
    if verbose {
        eprintln!(
            "Querying {} identifier(s) against {} partition(s) in {}",
            ids.len(),
            store.chromosomes().len(),
            store.layout().root().display()
        );
    }

    let options = QueryOptions {
        policy: if args.first_match {
            MatchPolicy::FirstMatch
        } else {
            MatchPolicy::AllMatches
        },
    };
    let mut session = store.session_with(options);
    let result = match &args.chromosome {
        Some(chromosome) => session.query_chromosome(&ids, chromosome)?,
        None => session.query_all(&ids)?,
    };

    match format {
        OutputFormat::Text => print_text_results(&result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.views())?),
        OutputFormat::Tsv => print_tsv_results(&result),
    }

    let unresolved = result.unresolved();
    if !unresolved.is_empty() {
        eprintln!(
            "{} of {} identifier(s) unresolved",
            unresolved.len(),
            result.len()
        );
    }

    Ok(())
}

fn collect_ids(args: &QueryArgs) -> anyhow::Result<Vec<String>> {
    let mut ids = args.ids.clone();
    if let Some(path) = &args.input {
        let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
            Box::new(std::io::stdin().lock())
        } else {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        };
        for line in reader.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() && !id.starts_with('#') {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

fn print_text_results(result: &QueryResult) {
    for row in result {
        match &row.resolution {
            Resolution::Resolved(record) => println!(
                "{}\t{}:{} {}>{}",
                row.query,
                record.chromosome,
                record.position,
                record.reference.as_str(),
                record.alternate.as_str()
            ),
            Resolution::Ambiguous(records) => {
                let locations: Vec<String> = records
                    .iter()
                    .map(|r| format!("{}:{}", r.chromosome, r.position))
                    .collect();
                println!("{}\tambiguous: {}", row.query, locations.join(", "));
            }
            Resolution::Unresolved => println!("{}\tnot found", row.query),
            Resolution::Malformed(e) => println!("{}\tinvalid: {e}", row.query),
        }
    }
}

fn print_tsv_results(result: &QueryResult) {
    println!("query\tstatus\tchrom\tpos\tref\talt\tvariant_id");
    for view in result.views() {
        let RowView {
            query,
            status,
            chrom,
            pos,
            reference,
            alternate,
            variant_id,
            ..
        } = view;
        println!(
            "{query}\t{status}\t{}\t{}\t{}\t{}\t{}",
            chrom.unwrap_or("."),
            pos.map_or_else(|| ".".to_string(), |p| p.to_string()),
            reference.unwrap_or("."),
            alternate.unwrap_or("."),
            variant_id.as_deref().unwrap_or("."),
        );
    }
}
