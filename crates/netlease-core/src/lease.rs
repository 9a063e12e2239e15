//! Lease and setting-kind data model
//!
//! A lease is a snapshot of configuration values obtained from one source
//! (DHCP, firmware, static assignment) for one device. Each lease carries
//! an update-permission bitmask naming the host-wide setting kinds it may
//! drive, plus the payload for those kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// A category of host-wide setting managed by the reconciliation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    /// System hostname
    Hostname,
    /// DNS resolver configuration
    Resolver,
}

impl SettingKind {
    /// All kinds, in registry order
    pub const ALL: [SettingKind; 2] = [SettingKind::Hostname, SettingKind::Resolver];

    /// Stable index into per-kind tables
    pub fn index(self) -> usize {
        match self {
            SettingKind::Hostname => 0,
            SettingKind::Resolver => 1,
        }
    }

    /// Bit in the update-permission mask
    fn bit(self) -> u32 {
        1 << self.index()
    }

    /// Short name used in config keys and log messages
    pub fn name(self) -> &'static str {
        match self {
            SettingKind::Hostname => "hostname",
            SettingKind::Resolver => "resolver",
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask of setting kinds a lease is permitted to update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateFlags(u32);

impl UpdateFlags {
    /// Empty mask: the lease may not drive any setting
    pub const NONE: UpdateFlags = UpdateFlags(0);

    /// Mask covering every known kind
    pub fn all() -> Self {
        let mut flags = UpdateFlags::NONE;
        for kind in SettingKind::ALL {
            flags.insert(kind);
        }
        flags
    }

    /// Build a mask from a list of kinds
    pub fn from_kinds(kinds: &[SettingKind]) -> Self {
        let mut flags = UpdateFlags::NONE;
        for kind in kinds {
            flags.insert(*kind);
        }
        flags
    }

    /// Permit the given kind
    pub fn insert(&mut self, kind: SettingKind) {
        self.0 |= kind.bit();
    }

    /// Whether the given kind is permitted
    pub fn contains(&self, kind: SettingKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether no kind is permitted
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// The protocol a lease was obtained through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Static assignment
    Static,
    /// Dynamically negotiated (DHCP)
    Dhcp,
    /// Firmware-provided boot configuration (e.g. iBFT)
    Firmware,
}

impl ProtocolKind {
    /// Fixed per-protocol arbitration constant, favoring authoritative
    /// sources over dynamic ones
    pub fn kind_weight(self) -> u32 {
        match self {
            ProtocolKind::Static => 0,
            ProtocolKind::Dhcp => 5,
            ProtocolKind::Firmware => 10,
        }
    }
}

/// Address family a lease applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// Resolver payload carried by a lease
///
/// Shaped like the resolv.conf triple: default domain, name server list,
/// search list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverInfo {
    /// Default domain
    #[serde(default)]
    pub default_domain: Option<String>,
    /// Name server addresses, in preference order
    #[serde(default)]
    pub servers: Vec<IpAddr>,
    /// Domain search list
    #[serde(default)]
    pub search: Vec<String>,
}

impl ResolverInfo {
    /// A resolver payload with no usable content never qualifies a source
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.search.is_empty() && self.default_domain.is_none()
    }
}

/// A configuration lease obtained for one device
///
/// Leases are owned by their device's entry in the
/// [`LeaseStore`](crate::store::LeaseStore); arbitration sources reference
/// them through generation-stamped handles, never by ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Identifier assigned at acquisition, used to guard releases
    pub uuid: Uuid,
    /// Protocol the lease was obtained through
    pub protocol: ProtocolKind,
    /// Address family
    pub family: AddressFamily,
    /// Monotonic sequence number, assigned by the acquisition layer.
    /// 0 is reserved as the "not installed" sentinel.
    #[serde(default)]
    pub seqno: u64,
    /// Which setting kinds this lease may drive
    #[serde(default)]
    pub update: UpdateFlags,
    /// Hostname payload
    #[serde(default)]
    pub hostname: Option<String>,
    /// Resolver payload
    #[serde(default)]
    pub resolver: Option<ResolverInfo>,
}

impl Lease {
    /// Create a lease with a fresh identifier and no payload
    pub fn new(protocol: ProtocolKind, family: AddressFamily) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            protocol,
            family,
            seqno: 0,
            update: UpdateFlags::NONE,
            hostname: None,
            resolver: None,
        }
    }

    /// Whether this lease both may drive the given kind and carries a
    /// non-empty payload for it
    pub fn can_update(&self, kind: SettingKind) -> bool {
        if !self.update.contains(kind) {
            return false;
        }
        match kind {
            SettingKind::Hostname => self
                .hostname
                .as_deref()
                .is_some_and(|name| !name.is_empty()),
            SettingKind::Resolver => self.resolver.as_ref().is_some_and(|r| !r.is_empty()),
        }
    }

    /// Arbitration weight of this lease
    ///
    /// Prefer IPv4 over IPv6 as the tie-breaker within a protocol.
    pub fn weight(&self) -> u32 {
        let mut weight = 10 * self.protocol.kind_weight();
        if self.family == AddressFamily::Ipv4 {
            weight += 1;
        }
        weight
    }
}
