//! Protocol versions and the handshake word format.
//!
//! A handshake word is a big-endian `u32` laid out as:
//!
//! ```text
//! +----------+----------+----------+----------+
//! | reserved |  range   |  minor   |  major   |
//! |  1 byte  |  1 byte  |  1 byte  |  1 byte  |
//! +----------+----------+----------+----------+
//! ```
//!
//! `range` lets a single proposal cover `minor - range ..= minor`.

use crate::error::HandshakeError;
use std::fmt;

/// Magic preamble sent before the version proposals.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Number of proposal slots in a handshake.
pub const PROPOSAL_SLOTS: usize = 4;

/// Size of the handshake request (magic + four proposals).
pub const HANDSHAKE_SIZE: usize = 4 + PROPOSAL_SLOTS * 4;

/// A (major, minor) protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// Sentinel returned by a server that accepts none of the proposals.
    pub const NO_VERSION: ProtocolVersion = ProtocolVersion::new(0, 0);

    /// What the reply looks like when an HTTP server answers with "HTTP".
    pub const HTTP: ProtocolVersion = ProtocolVersion::new(80, 84);

    pub const V5_1: ProtocolVersion = ProtocolVersion::new(5, 1);
    pub const V5_2: ProtocolVersion = ProtocolVersion::new(5, 2);
    pub const V5_3: ProtocolVersion = ProtocolVersion::new(5, 3);
    pub const V5_4: ProtocolVersion = ProtocolVersion::new(5, 4);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Decodes a version from a raw handshake word.
    pub fn from_raw(raw: u32) -> Self {
        Self {
            major: (raw & 0xFF) as u8,
            minor: ((raw >> 8) & 0xFF) as u8,
        }
    }

    /// Encodes this version as an exact-match handshake word.
    pub fn to_raw(self) -> u32 {
        (u32::from(self.minor) << 8) | u32::from(self.major)
    }

    pub fn is_no_version(self) -> bool {
        self == Self::NO_VERSION
    }

    pub fn is_http(self) -> bool {
        self == Self::HTTP
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One handshake proposal: a maximum version plus how many minors below it
/// are also acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    pub max: ProtocolVersion,
    pub range: u8,
}

impl VersionProposal {
    pub const fn exact(version: ProtocolVersion) -> Self {
        Self {
            max: version,
            range: 0,
        }
    }

    /// A proposal covering every minor from `min` to `max` inclusive.
    pub fn range(max: ProtocolVersion, min: ProtocolVersion) -> Self {
        let range = if min.major == max.major && min.minor <= max.minor {
            max.minor - min.minor
        } else {
            0
        };
        Self { max, range }
    }

    pub fn to_raw(self) -> u32 {
        (u32::from(self.range) << 16) | self.max.to_raw()
    }

    pub fn accepts(self, version: ProtocolVersion) -> bool {
        version.major == self.max.major
            && version.minor <= self.max.minor
            && version.minor >= self.max.minor.saturating_sub(self.range)
    }
}

impl From<ProtocolVersion> for VersionProposal {
    fn from(version: ProtocolVersion) -> Self {
        Self::exact(version)
    }
}

/// Versions this engine speaks, newest first.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 4] = [
    ProtocolVersion::V5_4,
    ProtocolVersion::V5_3,
    ProtocolVersion::V5_2,
    ProtocolVersion::V5_1,
];

/// Default proposals: every supported version, one slot each.
pub fn default_proposals() -> Vec<VersionProposal> {
    SUPPORTED_VERSIONS
        .iter()
        .copied()
        .map(VersionProposal::exact)
        .collect()
}

/// Builds the 20-byte handshake request.
///
/// Only the first four proposals are sent; empty slots are zero.
pub fn handshake_request(proposals: &[VersionProposal]) -> [u8; HANDSHAKE_SIZE] {
    let mut buf = [0u8; HANDSHAKE_SIZE];
    buf[..4].copy_from_slice(&BOLT_MAGIC);
    for (slot, proposal) in proposals.iter().take(PROPOSAL_SLOTS).enumerate() {
        let start = 4 + slot * 4;
        buf[start..start + 4].copy_from_slice(&proposal.to_raw().to_be_bytes());
    }
    buf
}

/// Interprets the server's 4-byte handshake reply against what was proposed.
pub fn select_version(
    reply: [u8; 4],
    proposals: &[VersionProposal],
) -> Result<ProtocolVersion, HandshakeError> {
    let version = ProtocolVersion::from_raw(u32::from_be_bytes(reply));
    if version.is_no_version() {
        return Err(HandshakeError::NoSupportedVersion);
    }
    if version.is_http() {
        return Err(HandshakeError::HttpEndpoint);
    }
    let proposed = proposals
        .iter()
        .take(PROPOSAL_SLOTS)
        .any(|p| p.accepts(version));
    if proposed && SUPPORTED_VERSIONS.contains(&version) {
        Ok(version)
    } else {
        Err(HandshakeError::UnsupportedVersion(version))
    }
}
