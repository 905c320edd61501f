//! Upload processes
//!
//! Upload processes copy files from an upload directory into storage and echo
//! descriptive inputs (species, build, source, ...) as output fields. They are
//! the only processes the reference engine provides out of the box.

use crate::error::ProcessError;
use crate::process::{ProcessContext, ProcessHandler, ProcessOutcome};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Component, Path, PathBuf};

/// Generic upload handler
#[derive(Debug, Clone)]
pub struct UploadProcess {
    upload_dir: PathBuf,
    files: Vec<(String, String)>,
    fields: Vec<String>,
    defaults: Map<String, Value>,
}

impl UploadProcess {
    /// Create upload reading from `upload_dir`
    #[must_use]
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            files: Vec::new(),
            fields: Vec::new(),
            defaults: Map::new(),
        }
    }

    /// Copy the file named by input `input` into output `output`
    #[must_use]
    pub fn file(mut self, input: &str, output: &str) -> Self {
        self.files.push((input.to_string(), output.to_string()));
        self
    }

    /// Echo an optional input as an output field
    #[must_use]
    pub fn field(mut self, key: &str) -> Self {
        self.fields.push(key.to_string());
        self
    }

    /// Output field value used when the input does not provide one
    #[must_use]
    pub fn default_field(mut self, key: &str, value: Value) -> Self {
        self.defaults.insert(key.to_string(), value);
        self
    }

    /// Standard upload processes keyed by process name
    #[must_use]
    pub fn catalog(upload_dir: impl AsRef<Path>) -> Vec<(&'static str, UploadProcess)> {
        let dir = upload_dir.as_ref();
        let descriptive = |upload: UploadProcess| upload.field("species").field("build");
        vec![
            (
                "upload-genome",
                descriptive(Self::new(dir).file("src", "fasta")),
            ),
            (
                "upload-fasta-nucl",
                descriptive(Self::new(dir).file("src", "fasta")).field("source"),
            ),
            (
                "upload-fastq-single",
                Self::new(dir).file("src", "fastq"),
            ),
            (
                "upload-gtf",
                descriptive(Self::new(dir).file("src", "annot")).field("source"),
            ),
            (
                "upload-gff3",
                descriptive(Self::new(dir).file("src", "annot")).field("source"),
            ),
            ("upload-bam", descriptive(Self::new(dir).file("src", "bam"))),
            (
                "upload-cxb",
                descriptive(Self::new(dir).file("src", "cxb")).field("source"),
            ),
            (
                "upload-mappability",
                Self::new(dir).file("src", "mappability"),
            ),
            (
                "upload-expression",
                descriptive(Self::new(dir).file("rc", "rc").file("exp", "exp"))
                    .field("exp_type")
                    .field("exp_name")
                    .field("source")
                    .field("feature_type")
                    .default_field("feature_type", json!("gene")),
            ),
        ]
    }

    async fn read_upload(
        &self,
        input: &str,
        name: &str,
    ) -> Result<(String, Vec<u8>), ProcessError> {
        let relative = Path::new(name);
        let inside = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        let stored = relative
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|_| inside)
            .ok_or_else(|| ProcessError::InvalidInput {
                key: input.to_string(),
                reason: format!("not a file under the upload directory: {name}"),
            })?
            .to_string();
        let path = self.upload_dir.join(relative);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ProcessError::Failed(format!("cannot read upload {}: {e}", path.display()))
        })?;
        Ok((stored, bytes))
    }
}

#[async_trait]
impl ProcessHandler for UploadProcess {
    fn required_inputs(&self) -> Vec<String> {
        self.files.iter().map(|(input, _)| input.clone()).collect()
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<ProcessOutcome, ProcessError> {
        let mut outcome = ProcessOutcome::new();

        for (input, output) in &self.files {
            match ctx.require(input)? {
                Value::String(name) => {
                    let (stored, bytes) = self.read_upload(input, name).await?;
                    outcome = outcome.file(output.as_str(), stored, bytes);
                }
                Value::Array(names) => {
                    let mut refs = Vec::with_capacity(names.len());
                    for name in names {
                        let name = name.as_str().ok_or_else(|| ProcessError::InvalidInput {
                            key: input.clone(),
                            reason: "expected file names".to_string(),
                        })?;
                        let (stored, bytes) = self.read_upload(input, name).await?;
                        refs.push(json!({ "file": stored.clone() }));
                        outcome.files.push((stored, bytes));
                    }
                    outcome = outcome.field(output.as_str(), Value::Array(refs));
                }
                other => {
                    return Err(ProcessError::InvalidInput {
                        key: input.clone(),
                        reason: format!("expected a file name, got {other}"),
                    })
                }
            }
        }

        for (key, value) in &self.defaults {
            outcome = outcome.field(key.as_str(), value.clone());
        }
        for key in &self.fields {
            if let Some(value) = ctx.input(key) {
                outcome = outcome.field(key.as_str(), value.clone());
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{DataLookup, Inputs};
    use resbio_model::{DataId, DataObject};
    use std::sync::Arc;

    struct NoData;

    impl DataLookup for NoData {
        fn lookup(&self, _id: DataId) -> Option<DataObject> {
            None
        }
    }

    fn ctx(inputs: Value) -> ProcessContext {
        let inputs: Inputs = serde_json::from_value(inputs).unwrap();
        ProcessContext::new(DataId::new(), "upload", inputs, Arc::new(NoData))
    }

    #[tokio::test]
    async fn uploads_file_and_echoes_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reads.bam"), b"BAM").unwrap();

        let upload = UploadProcess::new(dir.path())
            .file("src", "bam")
            .field("species")
            .field("build");
        let outcome = upload
            .run(&ctx(json!({
                "src": "reads.bam",
                "species": "Dictyostelium discoideum",
                "build": "dd-05-2009"
            })))
            .await
            .unwrap();

        assert_eq!(outcome.output["bam"], json!({"file": "reads.bam"}));
        assert_eq!(outcome.output["species"], json!("Dictyostelium discoideum"));
        assert_eq!(outcome.files, vec![("reads.bam".to_string(), b"BAM".to_vec())]);
    }

    #[tokio::test]
    async fn uploads_file_lists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reads.fastq.gz"), b"FQ").unwrap();

        let upload = UploadProcess::new(dir.path()).file("src", "fastq");
        let outcome = upload
            .run(&ctx(json!({"src": ["reads.fastq.gz"]})))
            .await
            .unwrap();
        assert_eq!(outcome.output["fastq"], json!([{"file": "reads.fastq.gz"}]));
    }

    #[tokio::test]
    async fn missing_upload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let upload = UploadProcess::new(dir.path()).file("src", "bam");
        let err = upload.run(&ctx(json!({"src": "absent.bam"}))).await.unwrap_err();
        assert!(matches!(err, ProcessError::Failed(_)));
    }

    #[tokio::test]
    async fn upload_names_stay_inside_upload_dir() {
        let root = tempfile::tempdir().unwrap();
        let uploads = root.path().join("uploads");
        std::fs::create_dir(&uploads).unwrap();
        std::fs::write(root.path().join("secret.bam"), b"BAM").unwrap();
        let upload = UploadProcess::new(&uploads).file("src", "bam");

        for name in ["../secret.bam", "/etc/passwd", "", "nested/../../secret.bam"] {
            let err = upload.run(&ctx(json!({"src": name}))).await.unwrap_err();
            assert!(
                matches!(err, ProcessError::InvalidInput { ref key, .. } if key == "src"),
                "{name}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn expression_upload_defaults_feature_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exp_1_rc.tab.gz"), b"rc").unwrap();
        std::fs::write(dir.path().join("exp_1_tpm.tab.gz"), b"tpm").unwrap();

        let (_, upload) = UploadProcess::catalog(dir.path())
            .into_iter()
            .find(|(name, _)| *name == "upload-expression")
            .unwrap();
        let outcome = upload
            .run(&ctx(json!({
                "rc": "exp_1_rc.tab.gz",
                "exp": "exp_1_tpm.tab.gz",
                "exp_type": "TPM"
            })))
            .await
            .unwrap();
        assert_eq!(outcome.output["feature_type"], json!("gene"));
        assert_eq!(outcome.output["exp_type"], json!("TPM"));
        assert_eq!(outcome.output["exp"], json!({"file": "exp_1_tpm.tab.gz"}));
    }

    #[test]
    fn catalog_declares_required_inputs() {
        let catalog = UploadProcess::catalog("/tmp");
        let (_, gtf) = catalog.iter().find(|(n, _)| *n == "upload-gtf").unwrap();
        assert_eq!(gtf.required_inputs(), vec!["src".to_string()]);
        assert_eq!(catalog.len(), 9);
    }
}
