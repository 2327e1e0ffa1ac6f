use crate::core::types::Chromosome;

/// Map a contig name onto the standardized chromosome label set.
///
/// Accepts the labels themselves, UCSC names (`chr17`, `chrX`, `chrM`),
/// mitochondrial aliases (`M`, `chrMT`), and RefSeq accessions for the human
/// primary assembly (`NC_000017.11`, `NC_012920.1`). The RefSeq version suffix
/// is ignored so both GRCh37 and GRCh38 accessions map.
///
/// Returns `None` for anything else (ALT/unplaced scaffolds, decoys, etc.).
#[must_use]
pub fn standardize_contig(name: &str) -> Option<Chromosome> {
    if let Ok(chromosome) = Chromosome::parse(name) {
        return Some(chromosome);
    }

    if is_mitochondrial(name) {
        return Chromosome::parse("MT").ok();
    }

    if let Some(rest) = strip_prefix_ignore_case(name, "chr") {
        return Chromosome::parse(rest).ok();
    }

    if let Some(accession) = name.strip_prefix("NC_") {
        return refseq_to_chromosome(accession);
    }

    None
}

fn is_mitochondrial(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "mt" | "m" | "chrm" | "chrmt"
    )
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        name.get(prefix.len()..)
    } else {
        None
    }
}

/// `000017.11` -> 17, `000023.x` -> X, `000024.x` -> Y, `012920.x` -> MT
fn refseq_to_chromosome(accession: &str) -> Option<Chromosome> {
    let number = accession.split('.').next()?;
    if number.len() != 6 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = number.parse().ok()?;
    let label = match n {
        1..=22 => return Chromosome::parse(&n.to_string()).ok(),
        23 => "X",
        24 => "Y",
        12920 => "MT",
        _ => return None,
    };
    Chromosome::parse(label).ok()
}
