//! Testing utilities for resbio workspace
//!
//! Temporary upload/reference directories, gzip helpers and a stub engine
//! that answers the expression suite with known reference outputs.

#![allow(missing_docs)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use resbio_engine::{
    ArtifactStore, ChildData, FnProcess, FsArtifactStore, InMemoryEngine, ProcessContext,
    ProcessError, ProcessHandler, ProcessOutcome,
};
use resbio_harness::{Harness, HarnessConfig, ScenarioRunner};
use resbio_model::DataObject;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub fn gzip_level(bytes: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    gzip_level(bytes, 6)
}

/// Upload and reference directories plus an artifact store root
#[derive(Debug)]
pub struct TestFiles {
    dir: TempDir,
}

impl Default for TestFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFiles {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["files", "outputs", "store"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.dir.path().join("files")
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.dir.path().join("outputs")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn write_upload(&self, name: &str, bytes: &[u8]) -> PathBuf {
        write(&self.files_dir(), name, bytes)
    }

    pub fn write_reference(&self, name: &str, bytes: &[u8]) -> PathBuf {
        write(&self.reference_dir(), name, bytes)
    }

    /// Write a reference, gzip-compressed when the name ends in `.gz`
    pub fn write_reference_text(&self, name: &str, text: &str) -> PathBuf {
        if name.ends_with(".gz") {
            self.write_reference(name, &gzip(text.as_bytes()))
        } else {
            self.write_reference(name, text.as_bytes())
        }
    }

    pub fn config(&self) -> HarnessConfig {
        HarnessConfig::new()
            .with_files_dir(self.files_dir())
            .with_reference_dir(self.reference_dir())
    }

    /// Engine with the standard uploads over these directories, and a harness on it
    pub fn harness(&self) -> (InMemoryEngine, Harness) {
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(self.store_dir()));
        Harness::in_process(store, self.config())
    }
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Upload files read by the expression suite
pub const EXPRESSION_UPLOADS: &[&str] = &[
    "genome.fasta.gz",
    "reads.fastq.gz",
    "annotation.gtf.gz",
    "annotation dicty.gff.gz",
    "hg19_chr20_small.gtf.gz",
    "cuffquant_mapping.bam",
    "cuffquant_1.cxb",
    "cuffquant_2.cxb",
    "cuffquant_3.cxb",
    "cuffquant_4.cxb",
    "cuffquant_5.cxb",
    "cuffquant_6.cxb",
    "purpureum_mappability_50.tab.gz",
    "HS_chr21_ensemble.fa.gz",
    "HS_chr21_short.gtf.gz",
    "exp_1_rc.tab.gz",
    "exp_1_tpm.tab.gz",
    "exp_2_rc.tab.gz",
    "exp_2_tpm.tab.gz",
    "reads.bam",
    "feature_counts_paired.bam",
    "salmon_cds.fa.gz",
];

/// Decompressed content of every reference output of the expression suite
pub const EXPRESSION_REFERENCES: &[(&str, &str)] = &[
    (
        "cufflinks_transcripts.gtf",
        "DDB0232428\tCufflinks\ttranscript\t1\t1200\t1000\t+\t.\tgene_id \"CUFF.1\";\n",
    ),
    (
        "cuffmerge_transcripts.gtf",
        "DDB0232428\tCuffmerge\texon\t1\t1200\t.\t+\t.\tgene_id \"XLOC_000001\";\n",
    ),
    (
        "cuffnorm_all_fpkm_means.txt",
        "Gene\tq1\tq2\tq3\nENSG00000101255\t12.5\t10.1\t9.8\n",
    ),
    (
        "cuffnorm_genes.fpkm_table",
        "tracking_id\tq1_0\tq1_1\tq2_0\tq2_1\tq2_2\tq3_0\nXLOC_000001\t1\t2\t3\t4\t5\t6\n",
    ),
    (
        "cuffnorm_expression.tab.gz",
        "Gene\tExpression\nXLOC_000001\t12.5\n",
    ),
    (
        "expression_bcm_rpkm.tab.gz",
        "Gene\tExpression\nDPU_G0067110\t32.1\nDPU_G0067098\t0.4\n",
    ),
    (
        "etc.json.gz",
        r#"{"genes": {"DPU_G0067110": [32.1, 32.1], "DPU_G0067098": [0.4, 0.4]}, "timePoints": [0, 0]}"#,
    ),
    ("reads_rc.tab.gz", "Gene\tExpression\nDDB_G0267178\t15\n"),
    ("reads_fpkm.tab.gz", "Gene\tExpression\nDDB_G0267178\t203.4\n"),
    ("reads_tpm.tab.gz", "Gene\tExpression\nDDB_G0267178\t51234.7\n"),
    (
        "expression_htseq.json.gz",
        r#"{"genes": {"DDB_G0267178": 51234.7}}"#,
    ),
    (
        "merged_expset_subset.tab",
        "Gene\texpression_1\texpression_2\nDPU_G0067096\t1.0\t2.0\nDPU_G0067098\t0.0\t0.5\nDPU_G0067102\t3.1\t3.3\n",
    ),
    (
        "merged_expset_all.tab",
        "Gene\texpression_1\texpression_2\nDPU_G0067096\t1.0\t2.0\nDPU_G0067098\t0.0\t0.5\nDPU_G0067100\t7.0\t6.2\nDPU_G0067102\t3.1\t3.3\n",
    ),
    (
        "merged_etc.tab.gz",
        "Gene\tetc_0\tetc_1\nDPU_G0067110\t32.1\t32.1\nDPU_G0067098\t0.4\t0.4\nDPU_G0067102\t0.0\t0.0\n",
    ),
    (
        "feature_counts_out_rc.tab.gz",
        "Gene\tExpression\nDDB_G0267178\t42\n",
    ),
    (
        "feature_counts_out_fpkm.tab.gz",
        "Gene\tExpression\nDDB_G0267178\t88.2\n",
    ),
    (
        "feature_counts_out_tpm.tab.gz",
        "Gene\tExpression\nDDB_G0267178\t1000000\n",
    ),
];

/// Decompressed reference content by name
pub fn reference_text(name: &str) -> &'static str {
    EXPRESSION_REFERENCES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
        .unwrap_or_else(|| panic!("no reference named {name}"))
}

/// Reference content as a process would write it: gzip at a different
/// level than the reference file, so only decompressed comparison matches
pub fn produced(name: &str) -> Vec<u8> {
    let text = reference_text(name);
    if name.ends_with(".gz") {
        gzip_level(text.as_bytes(), 1)
    } else {
        text.as_bytes().to_vec()
    }
}

pub fn reference_json(name: &str) -> Value {
    serde_json::from_str(reference_text(name)).unwrap()
}

/// Copy species, build and source from an upstream data object
pub fn inherit(mut outcome: ProcessOutcome, upstream: &DataObject) -> ProcessOutcome {
    for key in ["species", "build", "source"] {
        if let Some(value) = upstream.output.get(key) {
            outcome = outcome.field(key, value.clone());
        }
    }
    outcome
}

/// Handler returning fixed artifacts with descriptors copied from an input
#[derive(Debug, Clone, Default)]
pub struct StubProcess {
    required: Vec<String>,
    inherit_from: Option<String>,
    echo: Vec<String>,
    outcome: ProcessOutcome,
}

impl StubProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requires(mut self, keys: &[&str]) -> Self {
        self.required.extend(keys.iter().map(ToString::to_string));
        self
    }

    /// Copy descriptors from the data object behind input `key`
    /// (the first one when the input is a list)
    pub fn inherit(mut self, key: &str) -> Self {
        self.inherit_from = Some(key.to_string());
        self
    }

    /// Copy inputs verbatim to output fields
    pub fn echo(mut self, keys: &[&str]) -> Self {
        self.echo.extend(keys.iter().map(ToString::to_string));
        self
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.outcome = self.outcome.field(key, value);
        self
    }

    /// Output file with the content of reference `reference`
    pub fn reference_file(mut self, key: &str, reference: &str) -> Self {
        self.outcome = self.outcome.file(key, reference, produced(reference));
        self
    }

    pub fn file(mut self, key: &str, name: &str, bytes: &[u8]) -> Self {
        self.outcome = self.outcome.file(key, name, bytes.to_vec());
        self
    }

    pub fn dir(mut self, key: &str, dir: &str, files: &[(&str, &str)]) -> Self {
        let files = files
            .iter()
            .map(|(name, content)| ((*name).to_string(), content.as_bytes().to_vec()))
            .collect();
        self.outcome = self.outcome.dir(key, dir, files);
        self
    }

    pub fn storage(mut self, key: &str, value: Value) -> Self {
        self.outcome = self.outcome.storage(key, value);
        self
    }

    pub fn child(mut self, child: ChildData) -> Self {
        self.outcome = self.outcome.child(child);
        self
    }
}

#[async_trait]
impl ProcessHandler for StubProcess {
    fn required_inputs(&self) -> Vec<String> {
        self.required.clone()
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<ProcessOutcome, ProcessError> {
        let mut outcome = ProcessOutcome::new();
        if let Some(key) = &self.inherit_from {
            let upstream = match ctx.require(key)? {
                Value::Array(_) => ctx.data_list(key)?.into_iter().next(),
                _ => Some(ctx.data(key)?),
            };
            if let Some(upstream) = upstream {
                outcome = inherit(outcome, &upstream);
            }
        }
        for key in &self.echo {
            outcome = outcome.field(key.as_str(), ctx.require(key)?.clone());
        }

        let fixed = self.outcome.clone();
        outcome.output.extend(fixed.output);
        outcome.files.extend(fixed.files);
        outcome.storages.extend(fixed.storages);
        outcome.children.extend(fixed.children);
        Ok(outcome)
    }
}

fn expression_type(data: &DataObject) -> Option<&str> {
    data.output.get("exp_type").and_then(Value::as_str)
}

/// `mergeexpressions`: rejects mixed expression types; an empty gene list
/// selects every gene
pub fn merge_expressions() -> impl ProcessHandler {
    FnProcess::new(|ctx: &ProcessContext| {
        let exps = ctx.data_list("exps")?;
        let first = exps.first().and_then(expression_type);
        if exps.iter().any(|e| expression_type(e) != first) {
            return Err(ProcessError::Failed(
                "expressions must be of the same expression type".to_string(),
            ));
        }
        let all_genes = ctx
            .input("genes")
            .and_then(Value::as_array)
            .map_or(true, Vec::is_empty);
        let reference = if all_genes {
            "merged_expset_all.tab"
        } else {
            "merged_expset_subset.tab"
        };
        Ok(ProcessOutcome::new().file("expset", reference, produced(reference)))
    })
    .requires(["exps"])
}

/// `feature_counts`: paired-end runs produce a different table set
pub fn feature_counts() -> impl ProcessHandler {
    FnProcess::new(|ctx: &ProcessContext| {
        let paired = ctx
            .input("PE_options")
            .and_then(|pe| pe.get("is_paired_end"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let prefix = if paired { "feature_counts_out" } else { "reads" };
        let annotation = ctx.data("annotation")?;

        let mut outcome = inherit(ProcessOutcome::new(), &annotation)
            .field("feature_type", json!("gene"));
        for (key, suffix) in [("rc", "rc"), ("fpkm", "fpkm"), ("exp", "tpm")] {
            let reference = format!("{prefix}_{suffix}.tab.gz");
            outcome = outcome.file(key, reference.clone(), produced(&reference));
        }
        Ok(outcome)
    })
    .requires(["alignments", "annotation"])
}

/// Register stub handlers for every non-upload process of the expression suite
pub fn register_expression_processes(engine: &InMemoryEngine) {
    engine.register(
        "alignment-tophat2",
        StubProcess::new()
            .requires(&["genome", "reads"])
            .inherit("genome")
            .file("alignment", "alignment.bam", b"BAM\x01"),
    );
    engine.register(
        "cufflinks",
        StubProcess::new()
            .requires(&["alignment", "genome"])
            .inherit("genome")
            .reference_file("transcripts", "cufflinks_transcripts.gtf"),
    );
    engine.register(
        "cuffmerge",
        StubProcess::new()
            .requires(&["expressions", "genome"])
            .inherit("genome")
            .reference_file("annot", "cuffmerge_transcripts.gtf"),
    );
    engine.register(
        "cuffquant",
        StubProcess::new()
            .requires(&["alignment", "annotation"])
            .inherit("alignment")
            .file("cxb", "abundances.cxb", b"CXB"),
    );

    let mut normalized = ChildData::new("upload-expression")
        .field("exp_type", json!("FPKM"))
        .field("feature_type", json!("gene"));
    normalized = normalized.file(
        "exp",
        "cuffnorm_expression.tab.gz",
        produced("cuffnorm_expression.tab.gz"),
    );
    engine.register(
        "cuffnorm",
        StubProcess::new()
            .requires(&["cuffquant", "annotation", "replicates"])
            .inherit("cuffquant")
            .reference_file("fpkm_means", "cuffnorm_all_fpkm_means.txt")
            .reference_file("genes_fpkm", "cuffnorm_genes.fpkm_table")
            .file("raw_scatter", "raw_scatter.png", b"\x89PNG")
            .child(normalized),
    );

    engine.register(
        "expression-bcm",
        StubProcess::new()
            .requires(&["alignment", "gff", "mappable"])
            .inherit("gff")
            .field("feature_type", json!("gene"))
            .reference_file("rpkm", "expression_bcm_rpkm.tab.gz"),
    );
    engine.register(
        "etc-bcm",
        StubProcess::new()
            .requires(&["expressions"])
            .storage("etc", reference_json("etc.json.gz")),
    );
    engine.register(
        "mergeetc",
        StubProcess::new()
            .requires(&["exps", "genes"])
            .reference_file("expset", "merged_etc.tab.gz"),
    );
    engine.register(
        "htseq-count",
        StubProcess::new()
            .requires(&["alignments", "gff"])
            .inherit("gff")
            .field("feature_type", json!("gene"))
            .reference_file("rc", "reads_rc.tab.gz")
            .reference_file("fpkm", "reads_fpkm.tab.gz")
            .reference_file("exp", "reads_tpm.tab.gz")
            .storage("exp_json", reference_json("expression_htseq.json.gz")),
    );
    engine.register(
        "index-fasta-nucl",
        StubProcess::new()
            .requires(&["nucl", "annotation"])
            .inherit("annotation")
            .dir(
                "rsem_index",
                "rsem",
                &[("genome.grp", "0 1 0 1\n"), ("genome.ti", "1\n")],
            ),
    );
    engine.register(
        "salmon-index",
        StubProcess::new()
            .requires(&["nucl", "source", "species", "build"])
            .echo(&["source", "species", "build"])
            .dir("index", "salmon_index", &[("versionInfo.json", "{}")]),
    );
    engine.register("mergeexpressions", merge_expressions());
    engine.register("feature_counts", feature_counts());
}

/// Everything the expression suite needs, wired together
#[derive(Debug)]
pub struct ExpressionSuite {
    pub files: TestFiles,
    pub engine: InMemoryEngine,
    pub harness: Harness,
}

impl Default for ExpressionSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionSuite {
    pub fn new() -> Self {
        let files = TestFiles::new();
        for name in EXPRESSION_UPLOADS {
            files.write_upload(name, format!("upload {name}\n").as_bytes());
        }
        for (name, text) in EXPRESSION_REFERENCES {
            files.write_reference_text(name, text);
        }
        let (engine, harness) = files.harness();
        register_expression_processes(&engine);
        Self {
            files,
            engine,
            harness,
        }
    }

    pub fn runner(&self) -> ScenarioRunner {
        ScenarioRunner::new(self.harness.clone())
    }
}

/// Output map with a file reference, for hand-built data objects
pub fn file_output(key: &str, name: &str) -> Map<String, Value> {
    let mut output = Map::new();
    output.insert(key.to_string(), json!({ "file": name }));
    output
}
