//! Spec file loading and validation.
//!
//! # File formats
//!
//! ```text
//! CODEGROUPS.json   { "groups": { "<name>": ["<ref>", ...] } }
//! CODEOWNERS.json   { "functionalBlocks":
//!                       { "<block>": { "owners": [...], "additionalApprovers": [...] } },
//!                     "filemap": [ { "<path>": "<block>" }, ... ] }
//! ```
//!
//! Files ending in `.yaml` / `.yml` are read as YAML with the same shape;
//! anything else is JSON. Every semantic problem is reported as
//! [`SpecError::Invalid`] before any remote call is made.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::SpecError;
use crate::types::{FunctionalBlock, GroupSpec, IdentityRef, OwnershipSpec, GROUP_MARKER};

/// Serialization format of a spec file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// Pick the format from the file extension; JSON unless `.yaml`/`.yml`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SpecFormat::Yaml
            }
            _ => SpecFormat::Json,
        }
    }
}

// ---------------------------------------------------------------------------
// 1. Raw file shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGroupsFile {
    groups: Entries<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCodeownersFile {
    functional_blocks: Entries<RawBlock>,
    filemap: Vec<Entries<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    owners: Vec<String>,
    #[serde(default)]
    additional_approvers: Vec<String>,
}

/// Map entries in document order with repeated keys kept, so a key given
/// twice is reported instead of silently overwritten.
#[derive(Debug)]
struct Entries<V>(Vec<(String, V)>);

impl<V> Entries<V> {
    /// First key that appears more than once.
    fn duplicate_key(&self) -> Option<&str> {
        let mut seen = BTreeSet::new();
        self.0
            .iter()
            .map(|(key, _)| key.as_str())
            .find(|key| !seen.insert(*key))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate a `CODEGROUPS` file.
pub fn load_group_spec(path: &Path) -> Result<GroupSpec, SpecError> {
    let contents = read(path)?;
    parse_group_spec(&contents, SpecFormat::from_path(path), path)
}

/// Load and validate a `CODEOWNERS` file, joining the filemap against its
/// functional blocks.
pub fn load_ownership_spec(path: &Path) -> Result<OwnershipSpec, SpecError> {
    let contents = read(path)?;
    parse_ownership_spec(&contents, SpecFormat::from_path(path), path)
}

/// Parse group spec text. `origin` is only used for error context.
pub fn parse_group_spec(
    contents: &str,
    format: SpecFormat,
    origin: &Path,
) -> Result<GroupSpec, SpecError> {
    let raw: RawGroupsFile = decode(contents, format, origin)?;
    let invalid = |reason: String| SpecError::Invalid {
        path: origin.to_path_buf(),
        reason,
    };

    if let Some(name) = raw.groups.duplicate_key() {
        return Err(invalid(format!("group {name:?} is defined more than once")));
    }

    let mut spec = GroupSpec::default();
    for (name, members) in raw.groups.0 {
        let trimmed = name.trim();
        if trimmed.strip_prefix(GROUP_MARKER).unwrap_or(trimmed).trim().is_empty() {
            return Err(invalid(format!("group name {name:?} must not be empty")));
        }
        let members = identity_set(members)
            .map_err(|reason| invalid(format!("group {name:?}: {reason}")))?;
        spec.groups.insert(name, members);
    }
    Ok(spec)
}

/// Parse codeowners spec text. `origin` is only used for error context.
pub fn parse_ownership_spec(
    contents: &str,
    format: SpecFormat,
    origin: &Path,
) -> Result<OwnershipSpec, SpecError> {
    let raw: RawCodeownersFile = decode(contents, format, origin)?;
    let invalid = |reason: String| SpecError::Invalid {
        path: origin.to_path_buf(),
        reason,
    };

    if let Some(name) = raw.functional_blocks.duplicate_key() {
        return Err(invalid(format!("functional block {name:?} is defined more than once")));
    }

    let mut blocks = BTreeMap::new();
    for (name, block) in raw.functional_blocks.0 {
        let owners = identity_set(block.owners)
            .map_err(|reason| invalid(format!("block {name:?} owners: {reason}")))?;
        let additional_approvers = identity_set(block.additional_approvers).map_err(|reason| {
            invalid(format!("block {name:?} additionalApprovers: {reason}"))
        })?;
        let block = FunctionalBlock {
            owners,
            additional_approvers,
        };
        if block.effective_owners().is_empty() {
            return Err(invalid(format!("block {name:?} has no owners")));
        }
        blocks.insert(name, block);
    }

    let mut spec = OwnershipSpec::default();
    for (index, entry) in raw.filemap.into_iter().enumerate() {
        if entry.len() != 1 {
            return Err(invalid(format!(
                "filemap entry {index} must map exactly one path, found {}",
                entry.len()
            )));
        }
        for (path, block_name) in entry.0 {
            if path.trim().is_empty() {
                return Err(invalid(format!("filemap entry {index} has an empty path")));
            }
            let block = blocks.get(&block_name).ok_or_else(|| {
                invalid(format!(
                    "path {path:?} refers to unknown functional block {block_name:?}"
                ))
            })?;
            if spec.paths.contains_key(&path) {
                return Err(invalid(format!(
                    "path {path:?} appears more than once in filemap"
                )));
            }
            spec.paths.insert(path, block.effective_owners());
        }
    }
    Ok(spec)
}

// ---------------------------------------------------------------------------
// 3. Helpers
// ---------------------------------------------------------------------------

fn read(path: &Path) -> Result<String, SpecError> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => SpecError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SpecError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn decode<T: DeserializeOwned>(
    contents: &str,
    format: SpecFormat,
    origin: &Path,
) -> Result<T, SpecError> {
    let path: PathBuf = origin.to_path_buf();
    match format {
        SpecFormat::Json => {
            serde_json::from_str(contents).map_err(|source| SpecError::Parse { path, source })
        }
        SpecFormat::Yaml => {
            serde_yaml::from_str(contents).map_err(|source| SpecError::ParseYaml { path, source })
        }
    }
}

/// Trim and deduplicate identity references; blanks are an error.
fn identity_set(raw: Vec<String>) -> Result<BTreeSet<IdentityRef>, String> {
    let mut out = BTreeSet::new();
    for r in raw {
        let trimmed = r.trim();
        if trimmed.is_empty() || trimmed == GROUP_MARKER {
            return Err(format!("empty identity reference {r:?}"));
        }
        out.insert(IdentityRef::from(trimmed));
    }
    Ok(out)
}
