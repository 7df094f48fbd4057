//! NuGet V3 wire types: the service index document and the error envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Parsed service index document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceIndex {
    /// Schema version (`3.0.0` for every V3 source)
    pub version: Option<String>,
    /// Well-formed resource entries, in document order
    pub resources: Vec<ServiceIndexResource>,
}

/// One resource entry of the service index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIndexResource {
    /// Resource URL
    #[serde(rename = "@id")]
    pub id: String,
    /// Raw type tags, possibly version-suffixed
    #[serde(rename = "@type", with = "type_tags")]
    pub types: Vec<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Minimum client version expected by the source
    #[serde(default, rename = "clientVersion", skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
}

/// Document shape before individual resources are validated
#[derive(Debug, Deserialize)]
struct RawServiceIndex {
    #[serde(default)]
    version: Option<String>,
    resources: Vec<Value>,
}

impl ServiceIndex {
    /// Parse a service index body.
    ///
    /// Fails only when the body is not JSON or has no `resources` array.
    /// Malformed resource entries are dropped.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawServiceIndex = serde_json::from_slice(body)?;

        let resources = raw
            .resources
            .into_iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                match serde_json::from_value::<ServiceIndexResource>(entry) {
                    Ok(resource) => Some(resource),
                    Err(e) => {
                        debug!(position, error = %e, "Skipping malformed service index resource");
                        None
                    }
                }
            })
            .collect();

        Ok(Self {
            version: raw.version,
            resources,
        })
    }

    /// Whether the declared schema version is one this client understands
    pub fn is_supported_version(&self) -> bool {
        self.version
            .as_deref()
            .map_or(true, |version| version.trim().starts_with("3."))
    }
}

/// `@type` is a single tag in most sources, an array of tags in a few
mod type_tags {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(tag) => vec![tag],
            OneOrMany::Many(tags) => tags,
        })
    }

    pub fn serialize<S>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match tags {
            [tag] => tag.serialize(serializer),
            _ => tags.serialize(serializer),
        }
    }
}

/// Error body returned by NuGet servers and gallery implementations
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorEnvelope {
    /// `{"error": {"code": "...", "message": "..."}}`
    Nested { error: ErrorBody },
    /// `{"code": "...", "message": "..."}`
    Flat(ErrorBody),
}

/// Fields shared by both envelope shapes
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    /// The (code, message) pair, with an empty message treated as absent
    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        let body = match self {
            ErrorEnvelope::Nested { error } => error,
            ErrorEnvelope::Flat(body) => body,
        };
        let message = body.message.filter(|message| !message.trim().is_empty());
        (body.code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_array_types() {
        let body = br#"{
            "version": "3.0.0",
            "resources": [
                {"@id": "https://a/query", "@type": "SearchQueryService", "comment": "Query endpoint"},
                {"@id": "https://a/flat/", "@type": ["PackageBaseAddress/3.0.0", "PackageBaseAddress"]}
            ]
        }"#;

        let index = ServiceIndex::parse(body).unwrap();
        assert_eq!(index.version.as_deref(), Some("3.0.0"));
        assert_eq!(index.resources.len(), 2);
        assert_eq!(index.resources[0].types, vec!["SearchQueryService"]);
        assert_eq!(index.resources[0].comment.as_deref(), Some("Query endpoint"));
        assert_eq!(index.resources[1].types.len(), 2);
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let body = br#"{
            "resources": [
                {"@type": "SearchQueryService"},
                {"@id": "https://a/query", "@type": 42},
                "not an object",
                {"@id": "https://a/catalog", "@type": "Catalog/3.0.0"}
            ]
        }"#;

        let index = ServiceIndex::parse(body).unwrap();
        assert_eq!(index.resources.len(), 1);
        assert_eq!(index.resources[0].id, "https://a/catalog");
    }

    #[test]
    fn test_missing_resources_is_an_error() {
        assert!(ServiceIndex::parse(br#"{"version": "3.0.0"}"#).is_err());
        assert!(ServiceIndex::parse(br#"{"resources": {}}"#).is_err());
        assert!(ServiceIndex::parse(b"<html></html>").is_err());
        assert!(ServiceIndex::parse(b"").is_err());
    }

    #[test]
    fn test_supported_version() {
        let mut index = ServiceIndex::parse(br#"{"version": "3.0.0", "resources": []}"#).unwrap();
        assert!(index.is_supported_version());
        index.version = Some("2.0.0".to_string());
        assert!(!index.is_supported_version());
        index.version = None;
        assert!(index.is_supported_version());
    }

    #[test]
    fn test_error_envelope_shapes() {
        let flat: ErrorEnvelope =
            serde_json::from_str(r#"{"code": "PackageExists", "message": "Conflict"}"#).unwrap();
        assert_eq!(
            flat.into_parts(),
            (Some("PackageExists".to_string()), Some("Conflict".to_string()))
        );

        let nested: ErrorEnvelope =
            serde_json::from_str(r#"{"error": {"code": "Unauthorized", "message": "Bad key"}}"#).unwrap();
        assert_eq!(
            nested.into_parts(),
            (Some("Unauthorized".to_string()), Some("Bad key".to_string()))
        );

        let empty: ErrorEnvelope = serde_json::from_str(r#"{"message": "  "}"#).unwrap();
        assert_eq!(empty.into_parts(), (None, None));
    }
}
