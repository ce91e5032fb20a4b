use serde_json::{Map, Value as Json};
use vigil_core::{Error, Result};

/// Annotations rewritten by controllers and kubectl on every rollout.
pub const DEFAULT_ANNOTATIONS_TO_CLEAN: &[&str] =
    &["deployment.kubernetes.io/revision", "kubectl.kubernetes.io/last-applied-configuration"];

const VOLATILE_METADATA: &[&str] = &["generation", "resourceVersion", "managedFields"];

#[derive(Debug, Clone)]
pub struct ManifestCleaner {
    annotations: Vec<String>,
}

impl Default for ManifestCleaner {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOTATIONS_TO_CLEAN.iter().copied())
    }
}

impl ManifestCleaner {
    pub fn new<I, S>(annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { annotations: annotations.into_iter().map(Into::into).collect() }
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    /// Parse, strip volatile fields and noisy annotations, re-indent.
    /// Nothing is returned unless the whole manifest parsed.
    pub fn clean(&self, manifest: &[u8]) -> Result<Vec<u8>> {
        let mut v: Json = serde_json::from_slice(manifest)?;
        let root = v
            .as_object_mut()
            .ok_or_else(|| Error::Diff("manifest is not a JSON object".into()))?;
        // Status is server-populated
        root.remove("status");

        let meta = root.entry("metadata").or_insert_with(|| Json::Object(Map::new()));
        if meta.is_null() {
            *meta = Json::Object(Map::new());
        }
        let meta = meta
            .as_object_mut()
            .ok_or_else(|| Error::Diff("metadata is not an object".into()))?;
        for field in VOLATILE_METADATA {
            meta.remove(*field);
        }
        let annotations = meta.entry("annotations").or_insert_with(|| Json::Object(Map::new()));
        if annotations.is_null() {
            *annotations = Json::Object(Map::new());
        }
        let annotations = annotations
            .as_object_mut()
            .ok_or_else(|| Error::Diff("metadata.annotations is not an object".into()))?;
        for key in &self.annotations {
            annotations.remove(key);
        }
        to_pretty(&v)
    }
}

/// Re-indent JSON bytes; output ends with a newline.
pub fn pretty_json(raw: &[u8]) -> Result<Vec<u8>> {
    let v: Json = serde_json::from_slice(raw)?;
    to_pretty(&v)
}

fn to_pretty(v: &Json) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(v)?;
    out.push(b'\n');
    Ok(out)
}
