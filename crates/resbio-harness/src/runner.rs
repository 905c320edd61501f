//! Scenario runner and suite report
//!
//! Scenarios run one at a time against a shared [`Harness`]; steps inside a
//! scenario run in order and the first failing step ends the scenario.

use crate::error::{HarnessError, Phase};
use crate::harness::Harness;
use crate::registry::ScenarioRegistry;
use crate::scenario::{Action, Check, Scenario, Step};
use resbio_model::DataObject;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Instrument};

/// Where and why a scenario failed
#[derive(Debug)]
pub struct StepFailure {
    /// Phase of the failing step
    pub phase: Phase,
    /// Index of the failing step across setup and verification
    pub step: usize,
    /// Step description
    pub description: String,
    /// Process run by the step, if any
    pub process: Option<String>,
    /// Failure
    pub error: HarnessError,
}

/// Result of one scenario
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// Scenario id
    pub id: String,
    /// Steps that completed
    pub steps_completed: usize,
    /// Total steps
    pub steps_total: usize,
    /// Wall time
    pub duration: Duration,
    /// First failure, if any
    pub failure: Option<StepFailure>,
}

impl ScenarioOutcome {
    /// Check if the scenario passed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Results of a suite run
#[derive(Debug, Default)]
pub struct SuiteReport {
    /// Outcomes in run order
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SuiteReport {
    /// Check if every scenario passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(ScenarioOutcome::passed)
    }

    /// Number of passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// Number of failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }

    /// Outcome of a scenario by id
    #[must_use]
    pub fn outcome(&self, id: &str) -> Option<&ScenarioOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Scenario Report ===\n\n");
        let _ = writeln!(report, "Scenarios: {}", self.outcomes.len());
        let _ = writeln!(report, "Passed: {}", self.passed_count());
        let _ = writeln!(report, "Failed: {}", self.failed_count());

        report.push('\n');
        for outcome in &self.outcomes {
            let _ = writeln!(
                report,
                "[{}] {} ({}/{} steps, {} ms)",
                if outcome.passed() { "PASS" } else { "FAIL" },
                outcome.id,
                outcome.steps_completed,
                outcome.steps_total,
                outcome.duration.as_millis(),
            );
        }

        let failures: Vec<_> = self
            .outcomes
            .iter()
            .filter_map(|o| o.failure.as_ref().map(|f| (o, f)))
            .collect();
        if !failures.is_empty() {
            report.push_str("\n=== Failures ===\n");
            for (i, (outcome, failure)) in failures.iter().enumerate() {
                let _ = writeln!(
                    report,
                    "{}. {} {} step {}: {}",
                    i + 1,
                    outcome.id,
                    failure.phase,
                    failure.step,
                    failure.description
                );
                if let Some(process) = &failure.process {
                    let _ = writeln!(report, "   process: {process}");
                }
                let _ = writeln!(report, "   {}", failure.error);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Runs scenarios against a harness
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    harness: Harness,
}

impl ScenarioRunner {
    /// Create runner
    #[inline]
    #[must_use]
    pub fn new(harness: Harness) -> Self {
        Self { harness }
    }

    /// Underlying harness
    #[inline]
    #[must_use]
    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Run one scenario
    pub async fn run(&self, scenario: &Scenario) -> ScenarioOutcome {
        let span = info_span!("scenario", id = %scenario.id);
        self.run_inner(scenario).instrument(span).await
    }

    async fn run_inner(&self, scenario: &Scenario) -> ScenarioOutcome {
        let start = Instant::now();
        let steps_total = scenario.setup.len() + scenario.verify.len();
        let mut outcome = ScenarioOutcome {
            id: scenario.id.clone(),
            steps_completed: 0,
            steps_total,
            duration: Duration::ZERO,
            failure: None,
        };

        if let Err(e) = scenario.validate() {
            outcome.failure = Some(StepFailure {
                phase: Phase::Setup,
                step: 0,
                description: "validate".to_string(),
                process: None,
                error: HarnessError::setup("validate", e.into()),
            });
            outcome.duration = start.elapsed();
            return outcome;
        }

        let mut bindings: HashMap<String, DataObject> = HashMap::new();
        for (index, phase, step) in scenario.steps() {
            let result = self.execute(index, phase, step, &mut bindings).await;
            if let Err(error) = result {
                error!(step = index, %phase, %error, "scenario step failed");
                outcome.failure = Some(StepFailure {
                    phase: error.phase(),
                    step: index,
                    description: step.to_string(),
                    process: step.process().map(ToString::to_string),
                    error,
                });
                break;
            }
            outcome.steps_completed += 1;
        }

        outcome.duration = start.elapsed();
        info!(
            passed = outcome.passed(),
            duration = ?outcome.duration,
            "scenario finished"
        );
        outcome
    }

    async fn execute(
        &self,
        index: usize,
        phase: Phase,
        step: &Step,
        bindings: &mut HashMap<String, DataObject>,
    ) -> Result<(), HarnessError> {
        let h = &self.harness;
        let produced = match &step.action {
            Action::Run {
                process,
                inputs,
                expect,
            } => {
                let inputs = inputs.resolve(index, bindings).map_err(|e| match phase {
                    Phase::Setup => HarnessError::setup(step.to_string(), e.into()),
                    Phase::Verify => e.into(),
                })?;
                match phase {
                    Phase::Setup => h.prepare_expecting(process, inputs, *expect).await?,
                    Phase::Verify => h.run_expecting(process, inputs, *expect).await?,
                }
            }
            Action::Latest => match phase {
                Phase::Setup => h
                    .latest()
                    .await
                    .map_err(|e| HarnessError::setup(step.to_string(), e))?,
                Phase::Verify => h.latest().await?,
            },
            Action::Assert { target, check } => {
                let data = bindings.get(target).ok_or_else(|| {
                    HarnessError::Scenario(crate::error::ScenarioError::UnknownBinding {
                        step: index,
                        binding: target.clone(),
                    })
                })?;
                self.check(data, check).await?;
                return Ok(());
            }
        };

        if let Some(binding) = &step.binding {
            bindings.insert(binding.clone(), produced);
        }
        Ok(())
    }

    async fn check(&self, data: &DataObject, check: &Check) -> Result<(), HarnessError> {
        let h = &self.harness;
        match check {
            Check::File {
                output,
                reference,
                compression,
            } => h.assert_file(data, output, reference, *compression).await,
            Check::Field {
                path,
                expected,
                mask,
            } => h.assert_field_masked(data, path, expected, mask.as_slice()),
            Check::Json {
                output,
                path,
                reference,
            } => h.assert_json(data, output, path, reference).await,
            Check::Exists { output } => h.assert_file_exists(data, output).await,
        }
    }

    /// Run the given scenarios in order
    pub async fn run_many<'a, I>(&self, scenarios: I) -> SuiteReport
    where
        I: IntoIterator<Item = &'a Scenario>,
    {
        let mut report = SuiteReport::default();
        for scenario in scenarios {
            let outcome = self.run(scenario).await;
            let failed = !outcome.passed();
            report.outcomes.push(outcome);
            if failed && self.harness.config().stop_on_first_failure {
                break;
            }
        }
        report
    }

    /// Run every registered scenario
    pub async fn run_all(&self, registry: &ScenarioRegistry) -> SuiteReport {
        self.run_many(registry.iter()).await
    }

    /// Run scenarios exercising `process`
    pub async fn run_tagged(&self, registry: &ScenarioRegistry, process: &str) -> SuiteReport {
        self.run_many(registry.tagged(process)).await
    }
}
