//! Output assertions
//!
//! Compare what a process produced against reference files and expected
//! values. Compressed artifacts are compared by their decompressed content,
//! so two gzip streams with different headers but equal payloads match.

use crate::error::{HarnessError, Mismatch};
use crate::harness::Harness;
use resbio_engine::{Compression, StoreError};
use resbio_model::DataObject;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

impl Harness {
    /// Assert an output file equals a reference file
    ///
    /// Both sides are decompressed with `compression` before comparing.
    ///
    /// # Errors
    /// Returns [`Mismatch::File`] naming the first differing line, or a
    /// missing-output / missing-artifact error.
    pub async fn assert_file(
        &self,
        data: &DataObject,
        key: &str,
        reference: &str,
        compression: Compression,
    ) -> Result<(), HarnessError> {
        let produced = self
            .store()
            .read_output(data, key, compression)
            .await
            .map_err(|e| missing_or(data, key, e))?;
        let expected = self.read_reference(reference, compression).await?;

        if produced == expected {
            debug!(data = %data.id, key, reference, "file matches");
            return Ok(());
        }

        let (line, expected_line, actual_line) = first_line_difference(&expected, &produced);
        Err(Mismatch::File {
            data: data.id,
            key: key.to_string(),
            reference: reference.to_string(),
            line,
            expected: expected_line,
            actual: actual_line,
            expected_digest: sha256_hex(&expected),
            actual_digest: sha256_hex(&produced),
        }
        .into())
    }

    /// Assert an output field equals a value
    ///
    /// # Errors
    /// Returns [`Mismatch::Field`]; an absent field is a mismatch.
    pub fn assert_field(
        &self,
        data: &DataObject,
        path: &str,
        expected: &Value,
    ) -> Result<(), HarnessError> {
        self.assert_field_masked::<&str>(data, path, expected, &[])
    }

    /// Assert an output field equals a value after removing volatile
    /// sub-fields (`path.mask`) from the produced value
    ///
    /// # Errors
    /// Returns [`Mismatch::Field`]; an absent field is a mismatch.
    pub fn assert_field_masked<S: AsRef<str>>(
        &self,
        data: &DataObject,
        path: &str,
        expected: &Value,
        mask: &[S],
    ) -> Result<(), HarnessError> {
        let actual = if mask.is_empty() {
            data.field(path).cloned()
        } else {
            let mut masked = data.clone();
            for field in mask {
                masked.remove_field(&format!("{path}.{}", field.as_ref()));
            }
            masked.field(path).cloned()
        };

        if actual.as_ref() == Some(expected) {
            return Ok(());
        }
        Err(Mismatch::Field {
            data: data.id,
            path: path.to_string(),
            expected: expected.clone(),
            actual,
        }
        .into())
    }

    /// Assert a structured output (narrowed to `path`) equals a reference
    /// JSON file; a `.gz` reference is decompressed first
    ///
    /// # Errors
    /// Returns [`Mismatch::Json`] locating the first difference.
    pub async fn assert_json(
        &self,
        data: &DataObject,
        key: &str,
        path: &str,
        reference: &str,
    ) -> Result<(), HarnessError> {
        let stored = self
            .store()
            .read_output_json(data, key)
            .await
            .map_err(|e| missing_or(data, key, e))?;
        let actual = select(&stored, path);

        let bytes = self
            .read_reference(reference, Compression::from_name(reference))
            .await?;
        let expected: Value =
            serde_json::from_slice(&bytes).map_err(|source| HarnessError::ReferenceJson {
                path: self.config().reference_path(reference),
                source,
            })?;

        match json_difference(&expected, actual, "$".to_string()) {
            None => Ok(()),
            Some((location, expected, actual)) => Err(Mismatch::Json {
                data: data.id,
                key: key.to_string(),
                reference: reference.to_string(),
                location,
                expected,
                actual,
            }
            .into()),
        }
    }

    /// Assert an output is declared and its file or directory is stored
    ///
    /// # Errors
    /// Returns [`HarnessError::MissingOutput`] or
    /// [`HarnessError::MissingArtifact`].
    pub async fn assert_file_exists(
        &self,
        data: &DataObject,
        key: &str,
    ) -> Result<(), HarnessError> {
        if !data.output.contains_key(key) {
            return Err(missing_output(data, key));
        }
        if self.store().output_exists(data, key).await {
            return Ok(());
        }
        Err(HarnessError::MissingArtifact {
            data: data.id,
            key: key.to_string(),
            name: data
                .file(key)
                .or_else(|| data.dir(key))
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn read_reference(
        &self,
        name: &str,
        compression: Compression,
    ) -> Result<Vec<u8>, HarnessError> {
        let path = self.config().reference_path(name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| reference_error(&path, source))?;
        compression
            .decode(bytes)
            .map_err(|source| reference_error(&path, source))
    }
}

fn reference_error(path: &Path, source: std::io::Error) -> HarnessError {
    HarnessError::Reference {
        path: path.to_path_buf(),
        source,
    }
}

fn missing_output(data: &DataObject, key: &str) -> HarnessError {
    HarnessError::MissingOutput {
        data: data.id,
        process: data.process.clone(),
        key: key.to_string(),
    }
}

fn missing_or(data: &DataObject, key: &str, err: StoreError) -> HarnessError {
    match err {
        StoreError::MissingOutput { .. } => missing_output(data, key),
        other => other.into(),
    }
}

/// Hex SHA-256 digest
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// First differing line (1-based) with the text of each side there;
/// `None` marks a side that ended earlier
#[must_use]
pub fn first_line_difference(
    expected: &[u8],
    actual: &[u8],
) -> (usize, Option<String>, Option<String>) {
    let mut left = expected.split(|b| *b == b'\n');
    let mut right = actual.split(|b| *b == b'\n');
    let mut line = 1;
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) if l == r => line += 1,
            (None, None) => return (line, None, None),
            (l, r) => return (line, l.map(lossy), r.map(lossy)),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn select<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Location of the first difference between two JSON values with the value
/// on each side there
#[must_use]
pub fn json_difference(
    expected: &Value,
    actual: Option<&Value>,
    location: String,
) -> Option<(String, Option<Value>, Option<Value>)> {
    let Some(actual) = actual else {
        return Some((location, Some(expected.clone()), None));
    };
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            for (key, ev) in e {
                let found = json_difference(ev, a.get(key), format!("{location}.{key}"));
                if found.is_some() {
                    return found;
                }
            }
            a.iter()
                .find(|(key, _)| !e.contains_key(*key))
                .map(|(key, av)| (format!("{location}.{key}"), None, Some(av.clone())))
        }
        (Value::Array(e), Value::Array(a)) => {
            for (i, ev) in e.iter().enumerate() {
                let found = json_difference(ev, a.get(i), format!("{location}[{i}]"));
                if found.is_some() {
                    return found;
                }
            }
            a.get(e.len())
                .map(|av| (format!("{location}[{}]", e.len()), None, Some(av.clone())))
        }
        (e, a) if e == a => None,
        (e, a) => Some((location, Some(e.clone()), Some(a.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn line_difference_locates_first_change() {
        let (line, e, a) = first_line_difference(b"a\nb\nc\n", b"a\nB\nc\n");
        assert_eq!(line, 2);
        assert_eq!(e.as_deref(), Some("b"));
        assert_eq!(a.as_deref(), Some("B"));
    }

    #[test]
    fn line_difference_on_truncation() {
        let (line, e, a) = first_line_difference(b"a\nb", b"a");
        assert_eq!(line, 2);
        assert_eq!(e.as_deref(), Some("b"));
        assert_eq!(a, None);
    }

    #[test]
    fn json_difference_paths() {
        let expected = json!({"genes": ["a", "b"], "etc": {"x": 1}});
        assert_eq!(json_difference(&expected, Some(&expected), "$".into()), None);

        let actual = json!({"genes": ["a", "c"], "etc": {"x": 1}});
        assert_eq!(
            json_difference(&expected, Some(&actual), "$".into()),
            Some(("$.genes[1]".into(), Some(json!("b")), Some(json!("c"))))
        );

        let extra = json!({"genes": ["a", "b"], "etc": {"x": 1, "y": 2}});
        assert_eq!(
            json_difference(&expected, Some(&extra), "$".into()),
            Some(("$.etc.y".into(), None, Some(json!(2))))
        );
    }

    #[test]
    fn select_paths() {
        let value = json!({"a": {"b": [10, 20]}});
        assert_eq!(select(&value, ""), Some(&value));
        assert_eq!(select(&value, "a.b.1"), Some(&json!(20)));
        assert_eq!(select(&value, "a.c"), None);
    }

    proptest! {
        #[test]
        fn identical_text_has_no_difference(
            lines in proptest::collection::vec("[a-z0-9\t]{0,12}", 0..20)
        ) {
            let text = lines.join("\n");
            let (_, e, a) = first_line_difference(text.as_bytes(), text.as_bytes());
            prop_assert!(e.is_none() && a.is_none());
        }

        #[test]
        fn appended_line_is_located(lines in proptest::collection::vec("[a-z]{1,8}", 1..10)) {
            let base = lines.join("\n");
            let longer = format!("{base}\nextra");
            let (line, e, a) = first_line_difference(base.as_bytes(), longer.as_bytes());
            prop_assert_eq!(line, lines.len() + 1);
            prop_assert_eq!(e, None);
            prop_assert_eq!(a.as_deref(), Some("extra"));
        }
    }

    #[test]
    fn digest_is_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
