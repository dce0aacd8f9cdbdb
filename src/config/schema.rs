//! Manifest schema definitions.
//!
//! Two layers live here:
//! - `*Document` types mirror the decoded field tree one-to-one and derive
//!   Serde traits. Optional maps stay optional at this layer.
//! - [`Manifest`] is the normalized, validated form handed to the compiler.
//!   It can only be obtained through validation (see `validation.rs`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::validation::index_upstreams;
use crate::error::ManifestError;

/// Decoded manifest, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManifestDocument {
    /// Free-form metadata for other libraries.
    pub annotations: Option<HashMap<String, String>>,

    /// Prefix added to every upstream route. Stripped when proxying.
    pub prefix_path: String,

    /// Upstream blocks, in declaration order.
    #[serde(rename = "upstream")]
    pub upstreams: Vec<UpstreamDocument>,
}

/// Decoded `[[upstream]]` block.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpstreamDocument {
    /// Block label; unique within the manifest.
    pub identifier: String,

    #[serde(default)]
    pub annotations: Option<HashMap<String, String>>,

    /// Scheme and host of the upstream component.
    pub destination: String,

    #[serde(default, rename = "route")]
    pub routes: Vec<Route>,

    /// 0 = no periodic flush, negative = flush after every write.
    #[serde(default)]
    pub flush_interval_ms: i64,

    /// Team that owns the upstream component.
    #[serde(default)]
    pub owner: String,

    /// Appended to the manifest prefix. Stripped when proxying.
    #[serde(default)]
    pub prefix_path: String,
}

/// An HTTP method/path combination to proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Route {
    pub methods: Vec<String>,
    pub path: String,
}

impl Route {
    pub fn new<I, M>(methods: I, path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
            path: path.into(),
        }
    }
}

/// An upstream service to proxy to.
#[derive(Debug, Clone, PartialEq)]
pub struct Upstream {
    pub identifier: String,
    pub annotations: HashMap<String, String>,
    pub destination: String,
    pub routes: Vec<Route>,
    pub flush_interval_ms: i64,
    pub owner: String,
    pub prefix_path: String,
}

impl Upstream {
    /// Create an upstream with no routes and empty optional fields.
    pub fn new(identifier: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            annotations: HashMap::new(),
            destination: destination.into(),
            routes: Vec::new(),
            flush_interval_ms: 0,
            owner: String::new(),
            prefix_path: String::new(),
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn prefix_path(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_path = prefix.into();
        self
    }

    pub fn flush_interval_ms(mut self, ms: i64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }
}

impl From<UpstreamDocument> for Upstream {
    fn from(doc: UpstreamDocument) -> Self {
        Self {
            identifier: doc.identifier,
            annotations: doc.annotations.unwrap_or_default(),
            destination: doc.destination,
            routes: doc.routes,
            flush_interval_ms: doc.flush_interval_ms,
            owner: doc.owner,
            prefix_path: doc.prefix_path,
        }
    }
}

/// A validated list of upstream services to proxy.
///
/// Immutable once built. Annotation maps are always present (possibly
/// empty) and upstream identifiers are unique.
#[derive(Debug, Clone)]
pub struct Manifest {
    annotations: HashMap<String, String>,
    upstreams: Vec<Upstream>,
    prefix_path: String,
    index: HashMap<String, usize>,
}

impl Manifest {
    /// Start building a manifest in code.
    pub fn builder() -> ManifestBuilder {
        ManifestBuilder::default()
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    pub fn prefix_path(&self) -> &str {
        &self.prefix_path
    }

    /// Look up an upstream by identifier.
    pub fn upstream(&self, identifier: &str) -> Option<&Upstream> {
        self.index.get(identifier).map(|&i| &self.upstreams[i])
    }

    fn validated(
        annotations: HashMap<String, String>,
        prefix_path: String,
        upstreams: Vec<Upstream>,
    ) -> Result<Self, ManifestError> {
        let index = index_upstreams(&upstreams)?;
        Ok(Self {
            annotations,
            upstreams,
            prefix_path,
            index,
        })
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.annotations == other.annotations
            && self.upstreams == other.upstreams
            && self.prefix_path == other.prefix_path
    }
}

impl TryFrom<ManifestDocument> for Manifest {
    type Error = ManifestError;

    fn try_from(doc: ManifestDocument) -> Result<Self, Self::Error> {
        Manifest::validated(
            doc.annotations.unwrap_or_default(),
            doc.prefix_path,
            doc.upstreams.into_iter().map(Upstream::from).collect(),
        )
    }
}

/// Builder for [`Manifest`]; validation runs in [`ManifestBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    annotations: HashMap<String, String>,
    prefix_path: String,
    upstreams: Vec<Upstream>,
}

impl ManifestBuilder {
    pub fn prefix_path(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_path = prefix.into();
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn upstream(mut self, upstream: Upstream) -> Self {
        self.upstreams.push(upstream);
        self
    }

    pub fn build(self) -> Result<Manifest, ManifestError> {
        Manifest::validated(self.annotations, self.prefix_path, self.upstreams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_defaults_annotations() {
        let doc = ManifestDocument {
            annotations: None,
            prefix_path: "/api".into(),
            upstreams: vec![UpstreamDocument {
                identifier: "widgets".into(),
                annotations: None,
                destination: "http://widgets.local".into(),
                routes: vec![Route::new(["GET"], "/widgets")],
                flush_interval_ms: 0,
                owner: String::new(),
                prefix_path: String::new(),
            }],
        };

        let manifest = Manifest::try_from(doc).unwrap();
        assert!(manifest.annotations().is_empty());
        assert!(manifest.upstreams()[0].annotations.is_empty());
        assert_eq!(manifest.upstream("widgets").unwrap().destination, "http://widgets.local");
        assert!(manifest.upstream("gadgets").is_none());
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = Manifest::builder()
            .upstream(Upstream::new("accounts", "http://a.local"))
            .upstream(Upstream::new("accounts", "http://b.local"))
            .build()
            .unwrap_err();
        assert_eq!(err, ManifestError::DuplicateUpstreamIdentifier("accounts".into()));
    }
}
