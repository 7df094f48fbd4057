//! Service index resolution
//!
//! The service index is fetched once per client. Each resource's tags are
//! matched against the [`ServiceType`] catalog; unrecognized tags are skipped.
//! When several resources resolve to the same capability, the longest
//! matching tag wins, and among equally long tags the first in document
//! order wins.

use std::collections::BTreeMap;

use reqwest::Method;
use tracing::{debug, info, warn};
use url::Url;

use nuget_core::error::NuGetError;
use nuget_core::types::{ServiceType, TagMatch};
use nuget_core::utils::expand_template;
use crate::api::{ServiceIndex, ServiceIndexResource};
use crate::request::{read_body, RequestCore, RequestOptions};
use crate::response::check_response_with;
use crate::ClientResult;

/// Resolved capability to URL mapping. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointMap {
    endpoints: BTreeMap<ServiceType, Url>,
}

impl EndpointMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from service index resources
    pub fn from_resources(resources: &[ServiceIndexResource]) -> Self {
        // capability -> (specificity, url); strictly longer tags replace
        let mut best: BTreeMap<ServiceType, (usize, Url)> = BTreeMap::new();

        for resource in resources {
            let matches: Vec<TagMatch> = resource
                .types
                .iter()
                .filter_map(|tag| ServiceType::match_tag(tag))
                .collect();
            if matches.is_empty() {
                debug!(types = ?resource.types, "Skipping unrecognized service index resource");
                continue;
            }

            let url = match Url::parse(resource.id.trim()) {
                Ok(url) if url.has_host() => url,
                Ok(_) | Err(_) => {
                    warn!(types = ?resource.types, id = %resource.id, "Skipping resource with unusable URL");
                    continue;
                }
            };

            for matched in matches {
                match best.get(&matched.service_type) {
                    Some((specificity, _)) if *specificity >= matched.specificity => {}
                    _ => {
                        best.insert(matched.service_type, (matched.specificity, url.clone()));
                    }
                }
            }
        }

        Self {
            endpoints: best.into_iter().map(|(service_type, (_, url))| (service_type, url)).collect(),
        }
    }

    /// URL for a capability, if the source offers it
    pub fn get(&self, service_type: ServiceType) -> Option<&Url> {
        self.endpoints.get(&service_type)
    }

    /// URL for a capability the caller cannot do without
    pub fn require(&self, service_type: ServiceType) -> ClientResult<&Url> {
        self.get(service_type).ok_or_else(|| {
            NuGetError::build(format!("Source does not offer the {} resource", service_type))
        })
    }

    /// Expand a URI template resource such as `PackageDetailsUriTemplate`.
    ///
    /// Values are percent-encoded as path segments.
    pub fn expand(&self, service_type: ServiceType, vars: &[(&str, &str)]) -> ClientResult<Url> {
        let template = self.require(service_type)?;
        // Url percent-encodes braces; restore only the placeholders being filled
        let mut decoded = template.as_str().to_string();
        for (name, _) in vars {
            decoded = decoded.replace(&format!("%7B{}%7D", name), &format!("{{{}}}", name));
        }
        let encoded: Vec<(&str, String)> = vars
            .iter()
            .map(|(name, value)| (*name, urlencoding::encode(value).into_owned()))
            .collect();
        let encoded: Vec<(&str, &str)> = encoded.iter().map(|(name, value)| (*name, value.as_str())).collect();
        let expanded = expand_template(&decoded, &encoded);
        Url::parse(&expanded)
            .map_err(|e| NuGetError::build(format!("Expanded {} URL '{}' is invalid: {}", service_type, expanded, e)))
    }

    pub fn contains(&self, service_type: ServiceType) -> bool {
        self.endpoints.contains_key(&service_type)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Entries ordered by capability
    pub fn iter(&self) -> impl Iterator<Item = (ServiceType, &Url)> {
        self.endpoints.iter().map(|(service_type, url)| (*service_type, url))
    }
}

impl FromIterator<(ServiceType, Url)> for EndpointMap {
    fn from_iter<I: IntoIterator<Item = (ServiceType, Url)>>(iter: I) -> Self {
        Self {
            endpoints: iter.into_iter().collect(),
        }
    }
}

/// Fetch and resolve the service index at `index_url`.
///
/// Cancellation and credential failures surface as themselves; every other
/// failure is wrapped in [`NuGetError::Discovery`].
pub async fn resolve(
    core: &RequestCore,
    index_url: &Url,
    options: RequestOptions,
) -> ClientResult<EndpointMap> {
    let index = fetch_index(core, index_url, options).await.map_err(|e| match e {
        NuGetError::Cancelled | NuGetError::Discovery { .. } | NuGetError::Authentication { .. } => e,
        other => NuGetError::discovery(index_url.as_str(), other.to_string(), other),
    })?;

    let endpoints = EndpointMap::from_resources(&index.resources);
    info!(
        url = %index_url,
        resources = index.resources.len(),
        endpoints = endpoints.len(),
        "Resolved service index"
    );
    Ok(endpoints)
}

async fn fetch_index(
    core: &RequestCore,
    index_url: &Url,
    options: RequestOptions,
) -> ClientResult<ServiceIndex> {
    let request = core.new_request(
        Method::GET,
        index_url,
        (),
        options.default_header("Accept", "application/json"),
    )?;
    let response = check_response_with(core.execute(&request).await?, &request.cancellation).await?;
    let body = read_body(response, &request.cancellation).await?;

    let index = ServiceIndex::parse(&body).map_err(|e| {
        NuGetError::discovery(index_url.as_str(), format!("Invalid service index: {}", e), e)
    })?;

    if !index.is_supported_version() {
        return Err(NuGetError::Discovery {
            url: index_url.to_string(),
            message: format!(
                "Unsupported service index version '{}'",
                index.version.as_deref().unwrap_or_default()
            ),
            source: None,
        });
    }

    Ok(index)
}
