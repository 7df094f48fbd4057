//! Service index capabilities and `@type` tag matching.
//!
//! A NuGet V3 service index lists resources by `@type` tag. Tags are versioned
//! by suffix (`SearchQueryService`, `SearchQueryService/3.0.0-beta`,
//! `SearchQueryService/3.5.0`), so a capability is recognized by its base tag
//! or by its base tag followed by `/` and a non-empty version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between a base tag and its version suffix
pub const VERSION_SEPARATOR: char = '/';

/// A service capability listed in a service index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceType {
    /// Package search
    SearchQueryService,
    /// Package id and version autocomplete
    SearchAutocompleteService,
    /// Package metadata (registration pages)
    RegistrationsBaseUrl,
    /// Flat container for .nupkg and .nuspec downloads
    PackageBaseAddress,
    /// Push and delete packages
    PackagePublish,
    /// Push symbol packages
    SymbolPackagePublish,
    /// Gallery details page for a package
    PackageDetailsUriTemplate,
    /// Gallery "report abuse" page
    ReportAbuseUriTemplate,
    /// Package README download
    ReadmeUriTemplate,
    /// Gallery owner profile page
    OwnerDetailsUriTemplate,
    /// Repository signing certificates
    RepositorySignatures,
    /// Catalog of all package events
    Catalog,
    /// Known vulnerabilities index
    VulnerabilityInfo,
    /// Legacy V2 OData feed
    LegacyGallery,
}

/// Outcome of matching a raw tag against the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch {
    /// Recognized capability
    pub service_type: ServiceType,
    /// Length of the matched tag; longer tags are more specific aliases
    pub specificity: usize,
}

impl ServiceType {
    /// Every capability this client recognizes, in declaration order
    pub const ALL: [ServiceType; 14] = [
        ServiceType::SearchQueryService,
        ServiceType::SearchAutocompleteService,
        ServiceType::RegistrationsBaseUrl,
        ServiceType::PackageBaseAddress,
        ServiceType::PackagePublish,
        ServiceType::SymbolPackagePublish,
        ServiceType::PackageDetailsUriTemplate,
        ServiceType::ReportAbuseUriTemplate,
        ServiceType::ReadmeUriTemplate,
        ServiceType::OwnerDetailsUriTemplate,
        ServiceType::RepositorySignatures,
        ServiceType::Catalog,
        ServiceType::VulnerabilityInfo,
        ServiceType::LegacyGallery,
    ];

    /// Stable name of this capability
    pub fn name(&self) -> &'static str {
        match self {
            ServiceType::SearchQueryService => "SearchQueryService",
            ServiceType::SearchAutocompleteService => "SearchAutocompleteService",
            ServiceType::RegistrationsBaseUrl => "RegistrationsBaseUrl",
            ServiceType::PackageBaseAddress => "PackageBaseAddress",
            ServiceType::PackagePublish => "PackagePublish",
            ServiceType::SymbolPackagePublish => "SymbolPackagePublish",
            ServiceType::PackageDetailsUriTemplate => "PackageDetailsUriTemplate",
            ServiceType::ReportAbuseUriTemplate => "ReportAbuseUriTemplate",
            ServiceType::ReadmeUriTemplate => "ReadmeUriTemplate",
            ServiceType::OwnerDetailsUriTemplate => "OwnerDetailsUriTemplate",
            ServiceType::RepositorySignatures => "RepositorySignatures",
            ServiceType::Catalog => "Catalog",
            ServiceType::VulnerabilityInfo => "VulnerabilityInfo",
            ServiceType::LegacyGallery => "LegacyGallery",
        }
    }

    /// Base tags recognized for this capability.
    ///
    /// Each base tag also matches its versioned variants.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            ServiceType::SearchQueryService => &["SearchQueryService"],
            ServiceType::SearchAutocompleteService => &["SearchAutocompleteService"],
            ServiceType::RegistrationsBaseUrl => &["RegistrationsBaseUrl"],
            ServiceType::PackageBaseAddress => &["PackageBaseAddress"],
            ServiceType::PackagePublish => &["PackagePublish"],
            ServiceType::SymbolPackagePublish => &["SymbolPackagePublish"],
            ServiceType::PackageDetailsUriTemplate => &["PackageDetailsUriTemplate"],
            ServiceType::ReportAbuseUriTemplate => &["ReportAbuseUriTemplate"],
            ServiceType::ReadmeUriTemplate => &["ReadmeUriTemplate"],
            ServiceType::OwnerDetailsUriTemplate => &["OwnerDetailsUriTemplate"],
            ServiceType::RepositorySignatures => &["RepositorySignatures"],
            ServiceType::Catalog => &["Catalog"],
            ServiceType::VulnerabilityInfo => &["VulnerabilityInfo"],
            ServiceType::LegacyGallery => &["LegacyGallery"],
        }
    }

    /// Whether the capability's URL is a URI template with `{placeholders}`
    pub fn is_template(&self) -> bool {
        matches!(
            self,
            ServiceType::PackageDetailsUriTemplate
                | ServiceType::ReportAbuseUriTemplate
                | ServiceType::ReadmeUriTemplate
                | ServiceType::OwnerDetailsUriTemplate
        )
    }

    /// Recognize a raw `@type` tag. Unknown tags return `None`.
    pub fn from_tag(tag: &str) -> Option<ServiceType> {
        Self::match_tag(tag).map(|m| m.service_type)
    }

    /// Recognize a raw `@type` tag and report how specific the match is
    pub fn match_tag(tag: &str) -> Option<TagMatch> {
        let tag = tag.trim();
        Self::ALL.iter().find_map(|service_type| {
            service_type
                .tags()
                .iter()
                .any(|base| tag_matches(base, tag))
                .then_some(TagMatch {
                    service_type: *service_type,
                    specificity: tag.len(),
                })
        })
    }
}

/// `tag` equals `base`, or is `base` followed by the separator and a version
fn tag_matches(base: &str, tag: &str) -> bool {
    match tag.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(VERSION_SEPARATOR)
            .is_some_and(|version| !version.is_empty()),
        None => false,
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    /// Parse a capability name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|service_type| service_type.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown service type '{}'", s))
    }
}
