//! Standard preparation fixtures
//!
//! Each fixture is an upload process with default inputs. Defaults follow
//! the Dictyostelium reference set; callers override any input with
//! [`FixtureSpec::with_input`].

use crate::error::HarnessError;
use crate::harness::Harness;
use crate::scenario::{InputTemplate, Step};
use resbio_model::DataObject;
use serde_json::Value;
use std::collections::HashMap;

/// Default organism of the reference set
pub const DICTY_SPECIES: &str = "Dictyostelium discoideum";
/// Default genome build of the reference set
pub const DICTY_BUILD: &str = "dd-05-2009";
/// Default annotation source of the reference set
pub const DICTYBASE: &str = "DICTYBASE";

/// Upload process with its inputs
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureSpec {
    process: String,
    inputs: InputTemplate,
}

impl FixtureSpec {
    /// Fixture for an arbitrary upload process
    #[must_use]
    pub fn new(process: &str) -> Self {
        Self {
            process: process.to_string(),
            inputs: InputTemplate::new(),
        }
    }

    /// Override or add an input
    #[must_use]
    pub fn with_input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs = self.inputs.literal(key, value);
        self
    }

    /// Upload process name
    #[inline]
    #[must_use]
    pub fn process(&self) -> &str {
        &self.process
    }

    /// Inputs
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &InputTemplate {
        &self.inputs
    }

    /// Setup step binding the fixture's data object
    #[must_use]
    pub fn step(self, binding: &str) -> Step {
        Step::run(binding, &self.process, self.inputs)
    }

    /// Reference genome
    #[must_use]
    pub fn genome() -> Self {
        Self::new("upload-genome")
            .with_input("src", "genome.fasta.gz")
            .with_input("species", DICTY_SPECIES)
            .with_input("build", DICTY_BUILD)
    }

    /// Single-end reads
    #[must_use]
    pub fn reads() -> Self {
        Self::reads_from(&["reads.fastq.gz"])
    }

    /// Single-end reads from the given files
    #[must_use]
    pub fn reads_from(files: &[&str]) -> Self {
        Self::new("upload-fastq-single").with_input("src", files)
    }

    /// GTF annotation with explicit descriptors
    #[must_use]
    pub fn annotation(src: &str, source: &str, species: &str, build: &str) -> Self {
        Self::new("upload-gtf")
            .with_input("src", src)
            .with_input("source", source)
            .with_input("species", species)
            .with_input("build", build)
    }

    /// Default GTF annotation
    #[must_use]
    pub fn annotation_gtf() -> Self {
        Self::annotation("annotation.gtf.gz", DICTYBASE, DICTY_SPECIES, DICTY_BUILD)
    }

    /// Default GFF3 annotation
    #[must_use]
    pub fn annotation_gff() -> Self {
        Self::new("upload-gff3")
            .with_input("src", "annotation dicty.gff.gz")
            .with_input("source", DICTYBASE)
            .with_input("species", DICTY_SPECIES)
            .with_input("build", DICTY_BUILD)
    }

    /// Expression with read counts and normalized values
    #[must_use]
    pub fn expression(rc: &str, exp: &str, exp_type: &str) -> Self {
        Self::new("upload-expression")
            .with_input("rc", rc)
            .with_input("exp", exp)
            .with_input("exp_type", exp_type)
            .with_input("exp_name", "expression")
            .with_input("source", DICTYBASE)
            .with_input("feature_type", "gene")
            .with_input("species", DICTY_SPECIES)
            .with_input("build", DICTY_BUILD)
    }

    /// Default expression (TPM)
    #[must_use]
    pub fn expression_default() -> Self {
        Self::expression("exp_1_rc.tab.gz", "exp_1_tpm.tab.gz", "TPM")
    }

    /// Mappability table
    #[must_use]
    pub fn mappability(src: &str) -> Self {
        Self::new("upload-mappability").with_input("src", src)
    }

    /// BAM alignment
    #[must_use]
    pub fn bam(src: &str, species: &str, build: &str) -> Self {
        Self::new("upload-bam")
            .with_input("src", src)
            .with_input("species", species)
            .with_input("build", build)
    }

    /// Nucleotide FASTA
    #[must_use]
    pub fn fasta_nucl(src: &str) -> Self {
        Self::new("upload-fasta-nucl").with_input("src", src)
    }

    /// Cuffquant CXB file
    #[must_use]
    pub fn cxb(src: &str, source: &str, species: &str, build: &str) -> Self {
        Self::new("upload-cxb")
            .with_input("src", src)
            .with_input("source", source)
            .with_input("species", species)
            .with_input("build", build)
    }
}

impl Harness {
    /// Run a fixture as a preparation step
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] when the upload does not finish done.
    pub async fn prepare(&self, fixture: FixtureSpec) -> Result<DataObject, HarnessError> {
        let inputs = fixture
            .inputs
            .resolve(0, &HashMap::new())
            .map_err(|e| HarnessError::setup(format!("prepare {}", fixture.process), e.into()))?;
        self.prepare_process(&fixture.process, inputs).await
    }

    /// Prepare the default genome
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] on failure.
    pub async fn prepare_genome(&self) -> Result<DataObject, HarnessError> {
        self.prepare(FixtureSpec::genome()).await
    }

    /// Prepare the default reads
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] on failure.
    pub async fn prepare_reads(&self) -> Result<DataObject, HarnessError> {
        self.prepare(FixtureSpec::reads()).await
    }

    /// Prepare the default GTF annotation
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] on failure.
    pub async fn prepare_annotation(&self) -> Result<DataObject, HarnessError> {
        self.prepare(FixtureSpec::annotation_gtf()).await
    }

    /// Prepare the default GFF3 annotation
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] on failure.
    pub async fn prepare_annotation_gff(&self) -> Result<DataObject, HarnessError> {
        self.prepare(FixtureSpec::annotation_gff()).await
    }

    /// Prepare an expression
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] on failure.
    pub async fn prepare_expression(
        &self,
        rc: &str,
        exp: &str,
        exp_type: &str,
    ) -> Result<DataObject, HarnessError> {
        self.prepare(FixtureSpec::expression(rc, exp, exp_type)).await
    }
}
