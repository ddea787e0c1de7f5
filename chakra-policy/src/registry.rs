//! Registry of deployed policy program revisions.
//!
//! Each revision is an immutable source text plus the content id it was
//! pinned under. A file encrypted against revision N names that id in its
//! access condition, so the text must never change after deployment: a new
//! rule means a new revision.

use crate::error::{PolicyError, PolicyResult};
use crate::program::{PolicyValidator, SiwsPolicyV0, SiwsPolicyV1, SiwsPolicyV2};
use chakra_crypto::ContentHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Revision number stored alongside every private file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PolicyVersion(u32);

impl PolicyVersion {
    pub const V0: Self = Self(0);
    pub const V1: Self = Self(1);
    pub const V2: Self = Self(2);

    /// Revision new uploads are encrypted against.
    pub const CURRENT: Self = Self::V1;

    pub const ALL: [Self; 3] = [Self::V0, Self::V1, Self::V2];

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for PolicyVersion {
    type Error = PolicyError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|v| v.0 == value)
            .ok_or(PolicyError::UnsupportedVersion(value))
    }
}

impl From<PolicyVersion> for u32 {
    fn from(version: PolicyVersion) -> Self {
        version.0
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

pub const SIWS_V0_SOURCE: &str = include_str!("../programs/siws_v0.policy");
pub const SIWS_V1_SOURCE: &str = include_str!("../programs/siws_v1.policy");
pub const SIWS_V2_SOURCE: &str = include_str!("../programs/siws_v2.policy");

// IPFS CIDv0 of each source, fixed at deployment.
pub const SIWS_V0_CID: &str = "QmYAvQSBZQy1ieoQh2Zx1oWCMar7zGF4fKsM91uTVHuJbf";
pub const SIWS_V1_CID: &str = "QmNmpSD1K2t9YwXc3Zs7zZAbcQEiFsd1sVXspawHYMPJjs";
pub const SIWS_V2_CID: &str = "QmcK2j7zt8hctWZZUvSh2hJNowr3ieAprvfJaF9R8ctRez";

/// One deployed revision.
#[derive(Clone)]
pub struct ProgramEntry {
    pub version: PolicyVersion,
    pub source: &'static str,
    pub pinned_id: &'static str,
    pub validator: Arc<dyn PolicyValidator>,
}

impl fmt::Debug for ProgramEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramEntry")
            .field("version", &self.version)
            .field("pinned_id", &self.pinned_id)
            .finish_non_exhaustive()
    }
}

/// Lookup of program text, pinned id and validator by revision.
#[derive(Clone, Debug)]
pub struct ProgramRegistry {
    entries: BTreeMap<PolicyVersion, ProgramEntry>,
}

impl ProgramRegistry {
    /// The three revisions deployed so far.
    pub fn builtin() -> Self {
        let entries = [
            ProgramEntry {
                version: PolicyVersion::V0,
                source: SIWS_V0_SOURCE,
                pinned_id: SIWS_V0_CID,
                validator: Arc::new(SiwsPolicyV0),
            },
            ProgramEntry {
                version: PolicyVersion::V1,
                source: SIWS_V1_SOURCE,
                pinned_id: SIWS_V1_CID,
                validator: Arc::new(SiwsPolicyV1),
            },
            ProgramEntry {
                version: PolicyVersion::V2,
                source: SIWS_V2_SOURCE,
                pinned_id: SIWS_V2_CID,
                validator: Arc::new(SiwsPolicyV2),
            },
        ];
        Self {
            entries: entries.into_iter().map(|e| (e.version, e)).collect(),
        }
    }

    pub fn entry(&self, version: PolicyVersion) -> PolicyResult<&ProgramEntry> {
        self.entries
            .get(&version)
            .ok_or(PolicyError::UnsupportedVersion(version.as_u32()))
    }

    /// Source text to submit for execution under `version`.
    pub fn source(&self, version: PolicyVersion) -> PolicyResult<&'static str> {
        Ok(self.entry(version)?.source)
    }

    /// Content id an access condition pins for `version`.
    pub fn pinned_id(&self, version: PolicyVersion) -> PolicyResult<&'static str> {
        Ok(self.entry(version)?.pinned_id)
    }

    /// Identifies submitted program text.
    ///
    /// Hashes `code` and returns the entry whose pinned id matches, along with
    /// the computed id. Text that matches no pin is never dispatched.
    pub fn resolve_source(
        &self,
        code: &str,
        hasher: &dyn ContentHasher,
    ) -> PolicyResult<(&ProgramEntry, String)> {
        let computed = hasher.content_id(code.as_bytes())?;
        match self.entries.values().find(|e| e.pinned_id == computed) {
            Some(entry) => Ok((entry, computed)),
            None => Err(PolicyError::UnknownProgram(computed)),
        }
    }

    /// Recomputes every pin; fails on the first revision whose text drifted.
    pub fn verify_pins(&self, hasher: &dyn ContentHasher) -> PolicyResult<()> {
        for entry in self.entries.values() {
            let computed = hasher.content_id(entry.source.as_bytes())?;
            if computed != entry.pinned_id {
                return Err(PolicyError::PinMismatch {
                    version: entry.version,
                    pinned: entry.pinned_id.to_string(),
                    computed,
                });
            }
        }
        Ok(())
    }

    pub fn versions(&self) -> impl Iterator<Item = PolicyVersion> + '_ {
        self.entries.keys().copied()
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
