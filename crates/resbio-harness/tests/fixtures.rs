//! Fixture preparation through the standard upload processes.

use resbio_harness::fixtures::{DICTYBASE, DICTY_BUILD, DICTY_SPECIES};
use resbio_harness::prelude::*;
use resbio_test_utils::TestFiles;

fn uploads(files: &TestFiles, names: &[&str]) {
    for name in names {
        files.write_upload(name, name.as_bytes());
    }
}

#[tokio::test]
async fn default_fixtures_carry_reference_descriptors() {
    let files = TestFiles::new();
    uploads(
        &files,
        &["genome.fasta.gz", "reads.fastq.gz", "annotation.gtf.gz", "annotation dicty.gff.gz"],
    );
    let (_engine, harness) = files.harness();

    let genome = harness.prepare_genome().await.unwrap();
    assert_eq!(genome.species(), Some(DICTY_SPECIES));
    assert_eq!(genome.build(), Some(DICTY_BUILD));
    assert_eq!(genome.file("fasta"), Some("genome.fasta.gz"));

    let reads = harness.prepare_reads().await.unwrap();
    assert_eq!(reads.field("fastq.0.file").and_then(|v| v.as_str()), Some("reads.fastq.gz"));

    let gtf = harness.prepare_annotation().await.unwrap();
    assert_eq!(gtf.source(), Some(DICTYBASE));

    let gff = harness.prepare_annotation_gff().await.unwrap();
    assert_eq!(gff.file("annot"), Some("annotation dicty.gff.gz"));
}

#[tokio::test]
async fn expression_fixture_records_type() {
    let files = TestFiles::new();
    uploads(&files, &["exp_2_rc.tab.gz", "exp_2_tpm.tab.gz"]);
    let (_engine, harness) = files.harness();

    let expression = harness
        .prepare_expression("exp_2_rc.tab.gz", "exp_2_tpm.tab.gz", "RC")
        .await
        .unwrap();
    assert_eq!(expression.field("exp_type").and_then(|v| v.as_str()), Some("RC"));
    assert_eq!(expression.feature_type(), Some("gene"));
    harness.assert_file_exists(&expression, "rc").await.unwrap();
}

#[tokio::test]
async fn failed_upload_is_reported_as_setup() {
    let files = TestFiles::new();
    let (_engine, harness) = files.harness();

    let err = harness
        .prepare(FixtureSpec::bam("absent.bam", "Homo sapiens", "hg19"))
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Setup);
    assert!(err.to_string().starts_with("setup step run upload-bam failed"));
}
