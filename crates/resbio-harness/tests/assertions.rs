//! Assertion behavior against a real artifact store.

use resbio_engine::{ProcessOutcome, StaticProcess};
use resbio_harness::prelude::*;
use resbio_harness::Mismatch;
use resbio_test_utils::{file_output, gzip, gzip_level, TestFiles};
use serde_json::json;

async fn produce(files: &TestFiles, outcome: ProcessOutcome) -> (Harness, DataObject) {
    let (engine, harness) = files.harness();
    engine.register("produce", StaticProcess::new(outcome));
    let data = harness.run_process("produce", Inputs::new()).await.unwrap();
    (harness, data)
}

#[tokio::test]
async fn gzip_files_compare_by_content() {
    let files = TestFiles::new();
    files.write_reference("table.tab.gz", &gzip(b"Gene\tExp\nA\t1\n"));
    let outcome =
        ProcessOutcome::new().file("exp", "out.tab.gz", gzip_level(b"Gene\tExp\nA\t1\n", 9));
    let (harness, data) = produce(&files, outcome).await;

    harness
        .assert_file(&data, "exp", "table.tab.gz", Compression::Gzip)
        .await
        .unwrap();

    // raw comparison of differently compressed streams does not match
    let err = harness
        .assert_file(&data, "exp", "table.tab.gz", Compression::None)
        .await
        .unwrap_err();
    assert!(err.is_mismatch());
}

#[tokio::test]
async fn file_mismatch_reports_line_and_digests() {
    let files = TestFiles::new();
    files.write_reference("expected.txt", b"a\nb\nc\n");
    let outcome = ProcessOutcome::new().file("out", "out.txt", b"a\nb\nX\n".to_vec());
    let (harness, data) = produce(&files, outcome).await;

    let err = harness
        .assert_file(&data, "out", "expected.txt", Compression::None)
        .await
        .unwrap_err();
    match err.mismatch() {
        Some(Mismatch::File {
            line,
            expected,
            actual,
            expected_digest,
            actual_digest,
            ..
        }) => {
            assert_eq!(*line, 3);
            assert_eq!(expected.as_deref(), Some("c"));
            assert_eq!(actual.as_deref(), Some("X"));
            assert_eq!(expected_digest.len(), 64);
            assert_ne!(expected_digest, actual_digest);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn missing_reference_is_not_a_mismatch() {
    let files = TestFiles::new();
    let outcome = ProcessOutcome::new().file("out", "out.txt", b"x".to_vec());
    let (harness, data) = produce(&files, outcome).await;

    let err = harness
        .assert_file(&data, "out", "absent.txt", Compression::None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Reference { .. }));
}

#[tokio::test]
async fn masked_fields_ignore_volatile_values() {
    let files = TestFiles::new();
    let outcome = ProcessOutcome::new()
        .dir("index", "salmon_index", vec![("a.bin".into(), vec![0; 10])])
        .field("build", json!("ens_90"));
    let (harness, data) = produce(&files, outcome).await;

    assert_eq!(data.field("index.total_size"), Some(&json!(10)));
    harness
        .assert_field_masked(&data, "index", &json!({"dir": "salmon_index"}), &["total_size"])
        .unwrap();
    assert!(harness
        .assert_field(&data, "index", &json!({"dir": "salmon_index"}))
        .unwrap_err()
        .is_mismatch());
    harness.assert_field(&data, "build", &json!("ens_90")).unwrap();

    let err = harness
        .assert_field(&data, "species", &json!("Homo sapiens"))
        .unwrap_err();
    assert_eq!(
        err.mismatch(),
        Some(&Mismatch::Field {
            data: data.id,
            path: "species".into(),
            expected: json!("Homo sapiens"),
            actual: None,
        })
    );
}

#[tokio::test]
async fn json_compares_structure_at_path() {
    let files = TestFiles::new();
    files.write_reference("genes.json.gz", &gzip(br#"{"DPU_1": [1, 2]}"#));
    files.write_reference("etc.json", br#"{"genes": {"DPU_1": [1, 3]}}"#);
    let outcome = ProcessOutcome::new().storage("etc", json!({"genes": {"DPU_1": [1, 2]}}));
    let (harness, data) = produce(&files, outcome).await;

    harness
        .assert_json(&data, "etc", "genes", "genes.json.gz")
        .await
        .unwrap();

    let err = harness
        .assert_json(&data, "etc", "", "etc.json")
        .await
        .unwrap_err();
    match err.mismatch() {
        Some(Mismatch::Json {
            location,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(location, "$.genes.DPU_1[1]");
            assert_eq!(expected, &Some(json!(3)));
            assert_eq!(actual, &Some(json!(2)));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn existence_distinguishes_undeclared_and_unstored() {
    let files = TestFiles::new();
    let outcome = ProcessOutcome::new().file("raw_scatter", "scatter.png", b"png".to_vec());
    let (harness, data) = produce(&files, outcome).await;

    harness.assert_file_exists(&data, "raw_scatter").await.unwrap();

    let err = harness.assert_file_exists(&data, "plot").await.unwrap_err();
    assert!(matches!(err, HarnessError::MissingOutput { .. }));
    assert!(err.is_missing());

    let mut ghost = data.clone();
    ghost.output = file_output("raw_scatter", "ghost.png");
    let err = harness.assert_file_exists(&ghost, "raw_scatter").await.unwrap_err();
    assert!(matches!(err, HarnessError::MissingArtifact { ref name, .. } if name == "ghost.png"));

    let err = harness
        .assert_file(&data, "plot", "x", Compression::None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::MissingOutput { .. }));
}
