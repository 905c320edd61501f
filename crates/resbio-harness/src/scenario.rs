//! Declarative test scenarios
//!
//! A [`Scenario`] is an ordered list of setup steps followed by an ordered
//! list of verification steps. Steps bind their resulting data object to a
//! name; later steps refer to earlier bindings through [`InputTemplate`]s and
//! assertion targets.
//!
//! Validation rules:
//! - bindings are unique within a scenario
//! - a step may only refer to bindings of earlier steps
//! - assertions only appear in verification
//! - the binding dependency graph is acyclic

use crate::error::{Phase, ScenarioError};
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use resbio_engine::{data_ref, Compression, Inputs};
use resbio_model::{DataObject, DataStatus};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Terminal status a run is expected to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
    /// Run succeeds
    #[default]
    Done,
    /// Run fails
    Error,
}

impl Expect {
    /// Matching data status
    #[inline]
    #[must_use]
    pub fn status(self) -> DataStatus {
        match self {
            Self::Done => DataStatus::Done,
            Self::Error => DataStatus::Error,
        }
    }
}

/// One input value of a run
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// Literal JSON
    Literal(Value),
    /// Reference to one bound data object
    Data(String),
    /// References to several bound data objects, in order
    DataList(Vec<String>),
}

/// Inputs of a run, possibly referring to earlier bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTemplate {
    entries: Vec<(String, InputValue)>,
}

impl InputTemplate {
    /// Create empty template
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal input
    #[must_use]
    pub fn literal(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, InputValue::Literal(value.into()));
        self
    }

    /// Reference to a bound data object
    #[must_use]
    pub fn data(mut self, key: &str, binding: &str) -> Self {
        self.set(key, InputValue::Data(binding.to_string()));
        self
    }

    /// References to bound data objects
    #[must_use]
    pub fn data_list(mut self, key: &str, bindings: &[&str]) -> Self {
        self.set(
            key,
            InputValue::DataList(bindings.iter().map(ToString::to_string).collect()),
        );
        self
    }

    fn set(&mut self, key: &str, value: InputValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Bindings referenced by this template
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().flat_map(|(_, value)| match value {
            InputValue::Literal(_) => Vec::new(),
            InputValue::Data(binding) => vec![binding.as_str()],
            InputValue::DataList(bindings) => bindings.iter().map(String::as_str).collect(),
        })
    }

    /// Substitute bound data objects, producing engine inputs
    ///
    /// # Errors
    /// Returns [`ScenarioError::UnknownBinding`] for a reference with no
    /// bound data object; `step` is used for the report.
    pub fn resolve(
        &self,
        step: usize,
        bindings: &HashMap<String, DataObject>,
    ) -> Result<Inputs, ScenarioError> {
        let lookup = |binding: &str| {
            bindings
                .get(binding)
                .map(|data| data_ref(data.id))
                .ok_or_else(|| ScenarioError::UnknownBinding {
                    step,
                    binding: binding.to_string(),
                })
        };

        let mut inputs = Inputs::new();
        for (key, value) in &self.entries {
            let resolved = match value {
                InputValue::Literal(v) => v.clone(),
                InputValue::Data(binding) => lookup(binding)?,
                InputValue::DataList(list) => {
                    Value::Array(list.iter().map(|b| lookup(b)).collect::<Result<_, _>>()?)
                }
            };
            inputs.insert(key.clone(), resolved);
        }
        Ok(inputs)
    }
}

/// What an assertion compares
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Output file equals a reference file after decompression
    File {
        /// Output key
        output: String,
        /// Reference file name
        reference: String,
        /// Compression of both files
        compression: Compression,
    },
    /// Output field equals a value, ignoring masked sub-fields
    Field {
        /// Dotted field path
        path: String,
        /// Expected value
        expected: Value,
        /// Sub-fields of `path` removed before comparing
        mask: Vec<String>,
    },
    /// Structured output (or a sub-path of it) equals a reference JSON file
    Json {
        /// Output key
        output: String,
        /// Dotted path inside the structure, empty for the whole
        path: String,
        /// Reference file name
        reference: String,
    },
    /// Output exists and its artifact is stored
    Exists {
        /// Output key
        output: String,
    },
}

impl Check {
    /// Reference file the check reads, if any
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::File { reference, .. } | Self::Json { reference, .. } => Some(reference),
            Self::Field { .. } | Self::Exists { .. } => None,
        }
    }
}

/// Action performed by a step
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Run a process
    Run {
        /// Process name
        process: String,
        /// Inputs
        inputs: InputTemplate,
        /// Expected terminal status
        expect: Expect,
    },
    /// Bind the most recently created data object
    Latest,
    /// Assert on a bound data object
    Assert {
        /// Binding of the data object
        target: String,
        /// Comparison
        check: Check,
    },
}

/// One scenario step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Name the resulting data object is bound to
    pub binding: Option<String>,
    /// Action
    pub action: Action,
}

impl Step {
    /// Run a process and bind the result
    #[must_use]
    pub fn run(binding: &str, process: &str, inputs: InputTemplate) -> Self {
        Self {
            binding: Some(binding.to_string()),
            action: Action::Run {
                process: process.to_string(),
                inputs,
                expect: Expect::Done,
            },
        }
    }

    /// Run a process that is expected to fail; the result is not bound
    #[must_use]
    pub fn run_failing(process: &str, inputs: InputTemplate) -> Self {
        Self {
            binding: None,
            action: Action::Run {
                process: process.to_string(),
                inputs,
                expect: Expect::Error,
            },
        }
    }

    /// Bind the most recently created data object
    #[must_use]
    pub fn latest(binding: &str) -> Self {
        Self {
            binding: Some(binding.to_string()),
            action: Action::Latest,
        }
    }

    /// Assert on a bound data object
    #[must_use]
    pub fn assert(target: &str, check: Check) -> Self {
        Self {
            binding: None,
            action: Action::Assert {
                target: target.to_string(),
                check,
            },
        }
    }

    /// Compare an uncompressed output file
    #[must_use]
    pub fn assert_file(target: &str, output: &str, reference: &str) -> Self {
        Self::assert_file_with(target, output, reference, Compression::None)
    }

    /// Compare a gzip output file by its decompressed contents
    #[must_use]
    pub fn assert_file_gz(target: &str, output: &str, reference: &str) -> Self {
        Self::assert_file_with(target, output, reference, Compression::Gzip)
    }

    fn assert_file_with(
        target: &str,
        output: &str,
        reference: &str,
        compression: Compression,
    ) -> Self {
        Self::assert(
            target,
            Check::File {
                output: output.to_string(),
                reference: reference.to_string(),
                compression,
            },
        )
    }

    /// Compare an output field
    #[must_use]
    pub fn assert_field(target: &str, path: &str, expected: impl Into<Value>) -> Self {
        Self::assert_field_masked(target, path, expected, &[])
    }

    /// Compare an output field with volatile sub-fields removed
    #[must_use]
    pub fn assert_field_masked(
        target: &str,
        path: &str,
        expected: impl Into<Value>,
        mask: &[&str],
    ) -> Self {
        Self::assert(
            target,
            Check::Field {
                path: path.to_string(),
                expected: expected.into(),
                mask: mask.iter().map(ToString::to_string).collect(),
            },
        )
    }

    /// Compare a structured output against a reference JSON file
    #[must_use]
    pub fn assert_json(target: &str, output: &str, path: &str, reference: &str) -> Self {
        Self::assert(
            target,
            Check::Json {
                output: output.to_string(),
                path: path.to_string(),
                reference: reference.to_string(),
            },
        )
    }

    /// Check an output is present and stored
    #[must_use]
    pub fn assert_exists(target: &str, output: &str) -> Self {
        Self::assert(
            target,
            Check::Exists {
                output: output.to_string(),
            },
        )
    }

    /// Process run by this step
    #[must_use]
    pub fn process(&self) -> Option<&str> {
        match &self.action {
            Action::Run { process, .. } => Some(process),
            Action::Latest | Action::Assert { .. } => None,
        }
    }

    /// Bindings this step reads
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        match &self.action {
            Action::Run { inputs, .. } => inputs.dependencies().collect(),
            Action::Latest => Vec::new(),
            Action::Assert { target, .. } => vec![target.as_str()],
        }
    }

    /// Whether this step is an assertion
    #[inline]
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self.action, Action::Assert { .. })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Action::Run {
                process, expect, ..
            } => {
                write!(f, "run {process}")?;
                if *expect == Expect::Error {
                    f.write_str(" (expecting error)")?;
                }
            }
            Action::Latest => f.write_str("latest")?,
            Action::Assert { target, check } => match check {
                Check::File {
                    output, reference, ..
                } => write!(f, "assert_file {target}.{output} == {reference}")?,
                Check::Field { path, expected, .. } => {
                    write!(f, "assert_field {target}.{path} == {expected}")?;
                }
                Check::Json {
                    output,
                    path,
                    reference,
                } => {
                    write!(f, "assert_json {target}.{output}")?;
                    if !path.is_empty() {
                        write!(f, "[{path}]")?;
                    }
                    write!(f, " == {reference}")?;
                }
                Check::Exists { output } => write!(f, "assert_exists {target}.{output}")?,
            },
        }
        if let Some(binding) = &self.binding {
            write!(f, " -> {binding}")?;
        }
        Ok(())
    }
}

/// A declarative test scenario
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Unique id
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Processes under test
    pub tags: BTreeSet<String>,
    /// Preparation steps
    pub setup: Vec<Step>,
    /// Runs and assertions under test
    pub verify: Vec<Step>,
}

impl Scenario {
    /// Create empty scenario
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            setup: Vec::new(),
            verify: Vec::new(),
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Tag with a process under test
    #[inline]
    #[must_use]
    pub fn tag(mut self, process: &str) -> Self {
        self.tags.insert(process.to_string());
        self
    }

    /// Append a setup step
    #[inline]
    #[must_use]
    pub fn setup(mut self, step: Step) -> Self {
        self.setup.push(step);
        self
    }

    /// Append a verification step
    #[inline]
    #[must_use]
    pub fn verify(mut self, step: Step) -> Self {
        self.verify.push(step);
        self
    }

    /// All steps in execution order with their phase and global index
    pub fn steps(&self) -> impl Iterator<Item = (usize, Phase, &Step)> {
        self.setup
            .iter()
            .map(|s| (Phase::Setup, s))
            .chain(self.verify.iter().map(|s| (Phase::Verify, s)))
            .enumerate()
            .map(|(i, (phase, step))| (i, phase, step))
    }

    /// Reference files read by assertions
    #[must_use]
    pub fn references(&self) -> BTreeSet<&str> {
        self.verify
            .iter()
            .filter_map(|step| match &step.action {
                Action::Assert { check, .. } => check.reference(),
                _ => None,
            })
            .collect()
    }

    /// Check the scenario is well-formed
    ///
    /// # Errors
    /// Returns the first rule the scenario breaks.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.id.trim().is_empty() {
            return Err(ScenarioError::EmptyId);
        }

        let mut bound: HashMap<&str, usize> = HashMap::new();
        for (index, phase, step) in self.steps() {
            if phase == Phase::Setup && step.is_assertion() {
                return Err(ScenarioError::AssertionInSetup { step: index });
            }
            if matches!(step.action, Action::Latest) && step.binding.is_none() {
                return Err(ScenarioError::MissingBinding { step: index });
            }
            for dep in step.dependencies() {
                if !bound.contains_key(dep) {
                    return Err(ScenarioError::UnknownBinding {
                        step: index,
                        binding: dep.to_string(),
                    });
                }
            }
            if let Some(binding) = &step.binding {
                if bound.insert(binding, index).is_some() {
                    return Err(ScenarioError::DuplicateBinding {
                        step: index,
                        binding: binding.clone(),
                    });
                }
            }
        }

        if is_cyclic_directed(&self.dependency_graph()) {
            return Err(ScenarioError::Cycle);
        }
        Ok(())
    }

    /// Step dependency graph; an edge runs from producer to consumer
    #[must_use]
    pub fn dependency_graph(&self) -> DiGraphMap<usize, ()> {
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (index, _, step) in self.steps() {
            if let Some(binding) = &step.binding {
                producers.entry(binding).or_insert(index);
            }
        }

        let mut graph = DiGraphMap::new();
        for (index, _, step) in self.steps() {
            graph.add_node(index);
            for dep in step.dependencies() {
                if let Some(&producer) = producers.get(dep) {
                    graph.add_edge(producer, index, ());
                }
            }
        }
        graph
    }

    /// Bindings the given binding transitively depends on, sorted
    #[must_use]
    pub fn upstream(&self, binding: &str) -> Vec<String> {
        let steps: Vec<&Step> = self.steps().map(|(_, _, step)| step).collect();
        let Some(start) = steps
            .iter()
            .position(|step| step.binding.as_deref() == Some(binding))
        else {
            return Vec::new();
        };

        let graph = self.dependency_graph();
        let mut stack = vec![start];
        let mut seen = BTreeSet::new();
        let mut found = BTreeSet::new();
        while let Some(node) = stack.pop() {
            for producer in graph.neighbors_directed(node, Direction::Incoming) {
                if seen.insert(producer) {
                    if let Some(b) = steps.get(producer).and_then(|s| s.binding.as_deref()) {
                        found.insert(b.to_string());
                    }
                    stack.push(producer);
                }
            }
        }
        found.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn chain() -> Scenario {
        Scenario::new("chain")
            .tag("cufflinks")
            .setup(Step::run(
                "genome",
                "upload-genome",
                InputTemplate::new().literal("src", "genome.fasta.gz"),
            ))
            .setup(Step::run(
                "reads",
                "upload-fastq-single",
                InputTemplate::new().literal("src", json!(["reads.fastq.gz"])),
            ))
            .setup(Step::run(
                "aligned",
                "alignment-tophat2",
                InputTemplate::new()
                    .data("genome", "genome")
                    .data("reads", "reads"),
            ))
            .verify(Step::run(
                "cuff",
                "cufflinks",
                InputTemplate::new().data("alignment", "aligned"),
            ))
            .verify(Step::assert_field("cuff", "build", "dd-05-2009"))
    }

    #[test]
    fn valid_chain() {
        assert_eq!(chain().validate(), Ok(()));
    }

    #[test]
    fn upstream_is_transitive() {
        let scenario = chain();
        assert_eq!(scenario.upstream("cuff"), vec!["aligned", "genome", "reads"]);
        assert_eq!(scenario.upstream("genome"), Vec::<String>::new());
        assert!(scenario.upstream("nope").is_empty());
    }

    #[test]
    fn duplicate_binding_rejected() {
        let scenario = chain().verify(Step::run("cuff", "cufflinks", InputTemplate::new()));
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DuplicateBinding { step: 5, .. })
        ));
    }

    #[test]
    fn forward_reference_rejected() {
        let scenario = Scenario::new("fwd")
            .setup(Step::run(
                "a",
                "p",
                InputTemplate::new().data("x", "b"),
            ))
            .setup(Step::run("b", "p", InputTemplate::new()));
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::UnknownBinding {
                step: 0,
                binding: "b".into()
            })
        );
    }

    #[test]
    fn assertion_in_setup_rejected() {
        let scenario = Scenario::new("s")
            .setup(Step::run("a", "p", InputTemplate::new()))
            .setup(Step::assert_exists("a", "out"));
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::AssertionInSetup { step: 1 })
        );
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(Scenario::new(" ").validate(), Err(ScenarioError::EmptyId));
    }

    #[test]
    fn resolve_substitutes_references() {
        let genome = DataObject::new("upload-genome", Inputs::new());
        let reads = DataObject::new("upload-fastq-single", Inputs::new());
        let mut bindings = HashMap::new();
        bindings.insert("genome".to_string(), genome.clone());
        bindings.insert("reads".to_string(), reads.clone());

        let inputs = InputTemplate::new()
            .data("genome", "genome")
            .data_list("reads", &["reads", "genome"])
            .literal("stranded", "no")
            .resolve(0, &bindings)
            .unwrap();

        assert_eq!(inputs["genome"], data_ref(genome.id));
        assert_eq!(
            inputs["reads"],
            json!([data_ref(reads.id), data_ref(genome.id)])
        );
        assert_eq!(inputs["stranded"], json!("no"));

        let err = InputTemplate::new()
            .data("x", "missing")
            .resolve(3, &bindings)
            .unwrap_err();
        assert_eq!(
            err,
            ScenarioError::UnknownBinding {
                step: 3,
                binding: "missing".into()
            }
        );
    }

    #[test]
    fn later_literal_overrides_earlier() {
        let template = InputTemplate::new().literal("k", 1).literal("k", 2);
        assert_eq!(template.entries().count(), 1);
        assert_eq!(
            template.entries().next(),
            Some(("k", &InputValue::Literal(json!(2))))
        );
    }

    #[test]
    fn step_display() {
        assert_eq!(
            Step::assert_file_gz("exp", "rc", "reads_rc.tab.gz").to_string(),
            "assert_file exp.rc == reads_rc.tab.gz"
        );
        assert_eq!(
            Step::run_failing("mergeexpressions", InputTemplate::new()).to_string(),
            "run mergeexpressions (expecting error)"
        );
        assert_eq!(Step::latest("exp").to_string(), "latest -> exp");
    }

    #[test]
    fn references_collected_from_verification() {
        let scenario = chain()
            .verify(Step::assert_file("cuff", "transcripts", "cufflinks_transcripts.gtf"))
            .verify(Step::assert_json("cuff", "etc", "", "etc.json.gz"));
        let refs: Vec<&str> = scenario.references().into_iter().collect();
        assert_eq!(refs, vec!["cufflinks_transcripts.gtf", "etc.json.gz"]);
    }
}
