//! Command-line tests: build a store from a VCF, then query and inspect it.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const VCF: &str = "##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
chr17\t7676154\trs1042522\tG\tC\t.\t.\t.
chr19\t44908684\trs429358\tT\tC\t.\t.\t.
chr19\t44908822\trs7412\tC\tT\t.\t.\t.
chr11\t5227002\trs334\tT\tA,C\t.\t.\t.
";

fn variantdb(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("variantdb").unwrap();
    cmd.arg("--root").arg(root).arg("--catalog").arg("test");
    cmd
}

fn built_store() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let vcf = dir.path().join("filtered.vcf");
    std::fs::write(&vcf, VCF).unwrap();

    variantdb(dir.path())
        .arg("build")
        .arg(&vcf)
        .arg("--standardize-contigs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Accepted: 3"))
        .stdout(predicate::str::contains("multi-allelic: 1"))
        .stderr(predicate::str::contains("Build complete: 2 partitions"));

    dir
}

#[test]
fn test_build_writes_partitions() {
    let dir = built_store();
    assert!(dir.path().join("test.chr17.lookup.parquet").is_file());
    assert!(dir.path().join("test.chr19.lookup.parquet").is_file());
    assert!(!dir.path().join("test.chr11.lookup.parquet").exists());
    assert!(dir.path().join("test.parquet").is_file());
    assert!(dir.path().join("test.manifest.json").is_file());
}

#[test]
fn test_query_text() {
    let dir = built_store();
    variantdb(dir.path())
        .args(["query", "rs1042522", "rs_not_real", "rs334"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rs1042522\t17:7676154 G>C"))
        .stdout(predicate::str::contains("rs_not_real\tinvalid"))
        .stdout(predicate::str::contains("rs334\tnot found"))
        .stderr(predicate::str::contains("2 of 3 identifier(s) unresolved"));
}

#[test]
fn test_query_json() {
    let dir = built_store();
    let output = variantdb(dir.path())
        .args(["query", "rs7412", "rs1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["query"], "rs7412");
    assert_eq!(rows[0]["chrom"], "19");
    assert_eq!(rows[0]["variant_id"], "19_44908822_C_T");
    assert_eq!(rows[1]["status"], "unresolved");
    assert!(rows[1]["pos"].is_null());
}

#[test]
fn test_query_chromosome_tsv_from_file() {
    let dir = built_store();
    let ids = dir.path().join("ids.txt");
    std::fs::write(&ids, "rs1042522\n\nrs429358\n").unwrap();

    variantdb(dir.path())
        .args(["query", "--chromosome", "chr19", "--format", "tsv", "--input"])
        .arg(&ids)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "query\tstatus\tchrom\tpos\tref\talt\tvariant_id\n",
        ))
        .stdout(predicate::str::contains(
            "rs1042522\tunresolved\t.\t.\t.\t.\t.",
        ))
        .stdout(predicate::str::contains(
            "rs429358\tresolved\t19\t44908684\tT\tC\t19_44908684_T_C",
        ));
}

#[test]
fn test_query_reads_stdin() {
    let dir = built_store();
    variantdb(dir.path())
        .args(["query", "--input", "-"])
        .write_stdin("rs429358\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("rs429358\t19:44908684 T>C"));
}

#[test]
fn test_query_without_ids_fails() {
    let dir = tempfile::tempdir().unwrap();
    variantdb(dir.path())
        .arg("query")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No identifiers given"));
}

#[test]
fn test_info() {
    let dir = built_store();
    variantdb(dir.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Catalog: test"))
        .stdout(predicate::str::contains("Partitions (2): 17, 19"));

    let empty = tempfile::tempdir().unwrap();
    variantdb(empty.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("No partitions published"));
}

#[test]
fn test_build_conflict_fails_without_publishing() {
    let dir = tempfile::tempdir().unwrap();
    let vcf = dir.path().join("conflict.vcf");
    std::fs::write(
        &vcf,
        "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
         1\t100\trs5\tA\tG\t.\t.\t.\n2\t200\trs5\tA\tG\t.\t.\t.\n",
    )
    .unwrap();

    variantdb(dir.path())
        .arg("build")
        .arg(&vcf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("more than one chromosome"));
    assert!(!dir.path().join("test.chr1.lookup.parquet").exists());

    variantdb(dir.path())
        .arg("build")
        .arg(&vcf)
        .arg("--allow-conflicts")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conflicts: 1"));
    assert!(dir.path().join("test.chr1.lookup.parquet").is_file());
}
