//! The built-in expression suite against stub processes that emit the
//! reference outputs.

use pretty_assertions::assert_eq;
use resbio_harness::prelude::*;
use resbio_harness::suites;
use resbio_test_utils::ExpressionSuite;

fn registry() -> ScenarioRegistry {
    let mut registry = ScenarioRegistry::new();
    suites::expression::register(&mut registry).unwrap();
    registry
}

#[tokio::test]
async fn every_expression_scenario_passes() {
    let suite = ExpressionSuite::new();
    let report = suite.runner().run_all(&registry()).await;

    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(report.outcomes.len(), 10);
    for outcome in &report.outcomes {
        assert_eq!(outcome.steps_completed, outcome.steps_total, "{}", outcome.id);
    }
}

#[tokio::test]
async fn run_tagged_selects_one_process() {
    let suite = ExpressionSuite::new();
    let report = suite.runner().run_tagged(&registry(), "cuffmerge").await;

    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["expression::cufflinks"]);
    assert!(report.passed());
}

#[tokio::test]
async fn cuffnorm_binds_the_spawned_expression() {
    let suite = ExpressionSuite::new();
    let registry = registry();
    let report = suite.runner().run_tagged(&registry, "cuffnorm").await;
    assert!(report.passed(), "{}", report.generate_text());

    let latest = suite.harness.latest().await.unwrap();
    assert_eq!(latest.process, "upload-expression");
    assert_eq!(latest.status, DataStatus::Done);
}

#[tokio::test]
async fn wrong_reference_fails_the_verifying_step() {
    let suite = ExpressionSuite::new();
    suite
        .files
        .write_reference_text("reads_tpm.tab.gz", "Gene\tExpression\nDDB_G0267178\t1.0\n");

    let report = suite.runner().run_tagged(&registry(), "htseq-count").await;
    assert!(!report.passed());

    let failure = report.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.phase, Phase::Verify);
    assert_eq!(failure.description, "assert_file expression.exp == reads_tpm.tab.gz");
    let mismatch = failure.error.mismatch().unwrap();
    assert!(mismatch.to_string().contains("at line 2"));
    assert!(report.generate_text().contains("=== Result: FAIL ==="));
}

#[tokio::test]
async fn missing_upload_is_a_setup_failure() {
    let suite = ExpressionSuite::new();
    std::fs::remove_file(suite.files.files_dir().join("salmon_cds.fa.gz")).unwrap();

    let report = suite.runner().run_tagged(&registry(), "salmon-index").await;
    let failure = report.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.phase, Phase::Setup);
    assert_eq!(failure.step, 0);
    assert_eq!(failure.process.as_deref(), Some("upload-fasta-nucl"));
    assert!(matches!(
        failure.error.root(),
        HarnessError::UnexpectedStatus { observed: DataStatus::Error, .. }
    ));
}

#[tokio::test]
async fn stop_on_first_failure_ends_the_suite() {
    let suite = ExpressionSuite::new();
    std::fs::remove_file(suite.files.files_dir().join("genome.fasta.gz")).unwrap();
    let harness = Harness::new(
        suite.harness.engine().clone(),
        suite.harness.store().clone(),
        suite.files.config().with_stop_on_first_failure(true),
    );

    let report = ScenarioRunner::new(harness).run_all(&registry()).await;
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.failed_count(), 1);
}

#[tokio::test]
async fn repeated_runs_on_fresh_fixtures_agree() {
    let registry = registry();
    let mut compared = Vec::new();

    for scenario in registry.iter() {
        let first = ExpressionSuite::new().runner().run(scenario).await;
        let second = ExpressionSuite::new().runner().run(scenario).await;

        assert_eq!(first.passed(), second.passed(), "{}", scenario.id);
        assert_eq!(first.steps_completed, second.steps_completed, "{}", scenario.id);
        assert_eq!(
            first.failure.as_ref().map(|f| (f.phase, f.step)),
            second.failure.as_ref().map(|f| (f.phase, f.step)),
            "{}",
            scenario.id
        );
        compared.push(scenario.id.clone());
    }

    assert_eq!(compared.len(), 10);
    // total_size is masked in these two
    assert!(compared.iter().any(|id| id == "expression::index_fasta_nucl"));
    assert!(compared.iter().any(|id| id == "expression::salmon_index"));
}
