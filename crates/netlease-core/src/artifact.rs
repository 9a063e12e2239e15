//! Settings artifacts and the pluggable builder registry
//!
//! An artifact is the rendered settings content handed to a kind's
//! install script. Builders are looked up in a [`BuilderRegistry`] rather
//! than a hardcoded match, so coverage can be checked at configuration
//! time instead of surfacing at the first install.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::lease::{Lease, SettingKind};

/// Rendered settings content for one kind, built from a winning lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsArtifact {
    /// Kind the content applies to
    pub kind: SettingKind,
    /// File content fed to the install script
    pub content: String,
}

/// Trait for building a settings artifact from a lease payload
///
/// Builders are pure: same lease in, same artifact out, no side effects.
pub trait ArtifactBuilder: Send + Sync {
    /// Build the artifact for this builder's kind
    ///
    /// The lease has already qualified via
    /// [`Lease::can_update`](crate::lease::Lease::can_update); an empty
    /// payload here is a bug, not an expected input.
    fn build(&self, lease: &Lease) -> Result<SettingsArtifact>;
}

/// Registry mapping setting kinds to artifact builders
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<SettingKind, Box<dyn ArtifactBuilder>>,
}

impl BuilderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry covering every built-in kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SettingKind::Hostname, Box::new(HostnameBuilder));
        registry.register(SettingKind::Resolver, Box::new(ResolverBuilder));
        registry
    }

    /// Register a builder for a kind, replacing any previous one
    pub fn register(&mut self, kind: SettingKind, builder: Box<dyn ArtifactBuilder>) {
        self.builders.insert(kind, builder);
    }

    /// Look up the builder for a kind
    pub fn get(&self, kind: SettingKind) -> Option<&dyn ArtifactBuilder> {
        self.builders.get(&kind).map(Box::as_ref)
    }

    /// Whether a builder exists for a kind
    pub fn covers(&self, kind: SettingKind) -> bool {
        self.builders.contains_key(&kind)
    }

    /// Verify that every kind in the list has a builder
    ///
    /// Used at configuration time so a missing builder is a startup
    /// error rather than a surprise at the first install.
    pub fn validate_coverage<'a>(
        &self,
        kinds: impl IntoIterator<Item = &'a SettingKind>,
    ) -> Result<()> {
        for kind in kinds {
            if !self.covers(*kind) {
                return Err(Error::UnsupportedKind(*kind));
            }
        }
        Ok(())
    }
}

/// Builds the hostname artifact: the bare name, newline-terminated
pub struct HostnameBuilder;

impl ArtifactBuilder for HostnameBuilder {
    fn build(&self, lease: &Lease) -> Result<SettingsArtifact> {
        let hostname = lease
            .hostname
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Other("lease qualified without a hostname payload".into()))?;

        Ok(SettingsArtifact {
            kind: SettingKind::Hostname,
            content: format!("{hostname}\n"),
        })
    }
}

/// Builds the resolver artifact in resolv.conf format
pub struct ResolverBuilder;

impl ArtifactBuilder for ResolverBuilder {
    fn build(&self, lease: &Lease) -> Result<SettingsArtifact> {
        let resolver = lease
            .resolver
            .as_ref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::Other("lease qualified without a resolver payload".into()))?;

        let mut content = String::new();
        if let Some(domain) = &resolver.default_domain {
            let _ = writeln!(content, "domain {domain}");
        }
        for server in &resolver.servers {
            let _ = writeln!(content, "nameserver {server}");
        }
        if !resolver.search.is_empty() {
            let _ = writeln!(content, "search {}", resolver.search.join(" "));
        }

        Ok(SettingsArtifact {
            kind: SettingKind::Resolver,
            content,
        })
    }
}
