//! Version lineage rules.
//!
//! A session's versions form a forest through their parent references:
//!
//! ```text
//! v1 "a red circle"
//! ├── v2 "make it blue"
//! │   └── v4 "thicker outline"
//! └── v3 (rollback)
//! ```
//!
//! Every mutation goes through [`Session::append`], which checks the new
//! version against the forest before pushing it. Nothing here ever edits or
//! removes an appended version.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{Session, SessionHistory, Version, VersionOrigin, VersionRecord};

/// Identifier of a version, derived from its session and number.
///
/// Deterministic and collision-free within a session because the backend
/// never hands out the same version number twice.
pub fn version_id(session_id: &str, version_number: u32) -> String {
    format!("{}-v{}", session_id, version_number)
}

/// A version that would break the forest if appended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("version {version} belongs to session {found}, expected {expected}")]
    ForeignVersion {
        expected: String,
        found: String,
        version: u32,
    },

    #[error("version {version} is not newer than version {latest}")]
    NotMonotonic { version: u32, latest: u32 },

    #[error("version {version} references missing parent version {parent}")]
    DanglingParent { version: u32, parent: u32 },

    #[error("first version {version} of a session cannot have a parent")]
    RootWithParent { version: u32 },

    #[error("version {version} has no parent but was not produced by generation")]
    OrphanRevision { version: u32 },

    #[error("version {version} references unknown parent id {parent_id}")]
    UnresolvedParentId { version: u32, parent_id: String },
}

/// A node of the version tree, borrowing from the session.
#[derive(Debug, Clone)]
pub struct VersionNode<'a> {
    pub version: &'a Version,
    pub children: Vec<VersionNode<'a>>,
}

impl Session {
    /// Look up a version by number.
    pub fn version(&self, version_number: u32) -> Option<&Version> {
        self.versions
            .iter()
            .find(|v| v.version_number == version_number)
    }

    pub fn contains(&self, version_number: u32) -> bool {
        self.version(version_number).is_some()
    }

    /// Most recently appended version.
    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Direct children of a version, in arrival order.
    pub fn children(&self, version_number: u32) -> impl Iterator<Item = &Version> {
        self.versions
            .iter()
            .filter(move |v| v.parent_version == Some(version_number))
    }

    /// Path from a version up to its root, starting with the version itself.
    /// Empty if the version does not exist.
    pub fn ancestry(&self, version_number: u32) -> Vec<u32> {
        let mut path = Vec::new();
        let mut cursor = self.version(version_number);
        while let Some(version) = cursor {
            path.push(version.version_number);
            cursor = version.parent_version.and_then(|p| self.version(p));
        }
        path
    }

    /// Check that `version` may be appended without breaking the forest.
    pub fn check_append(&self, version: &Version) -> Result<(), LineageError> {
        if version.session_id != self.id {
            return Err(LineageError::ForeignVersion {
                expected: self.id.clone(),
                found: version.session_id.clone(),
                version: version.version_number,
            });
        }

        if let Some(latest) = self.versions.iter().map(|v| v.version_number).max() {
            if version.version_number <= latest {
                return Err(LineageError::NotMonotonic {
                    version: version.version_number,
                    latest,
                });
            }
        }

        match version.parent_version {
            Some(_) if self.versions.is_empty() => Err(LineageError::RootWithParent {
                version: version.version_number,
            }),
            Some(parent) if !self.contains(parent) => Err(LineageError::DanglingParent {
                version: version.version_number,
                parent,
            }),
            None if !matches!(version.origin, VersionOrigin::Generated { .. }) => {
                Err(LineageError::OrphanRevision {
                    version: version.version_number,
                })
            }
            _ => Ok(()),
        }
    }

    /// Append a version after checking it against the forest.
    ///
    /// On success the session's `updated_at` advances to the version's
    /// creation time if that is later.
    pub fn append(&mut self, version: Version) -> Result<&Version, LineageError> {
        self.check_append(&version)?;
        if version.created_at > self.updated_at {
            self.updated_at = version.created_at;
        }
        self.versions.push(version);
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// Build a session from the backend's history response.
    ///
    /// Records are taken in version-number order. Backend parent identifiers
    /// are resolved to version numbers through the records themselves; derived
    /// identifiers (`{session}-v{n}`) are accepted too.
    pub fn from_history(history: SessionHistory) -> Result<Self, LineageError> {
        let SessionHistory {
            session_id,
            name,
            description,
            created_at,
            updated_at,
            mut versions,
        } = history;

        versions.sort_by_key(|record| record.version_number);

        let mut numbers_by_id: HashMap<String, u32> = HashMap::new();
        for record in &versions {
            numbers_by_id.insert(record.id.clone(), record.version_number);
            numbers_by_id.insert(
                version_id(&session_id, record.version_number),
                record.version_number,
            );
        }

        let created_at = created_at
            .or_else(|| versions.first().map(|r| r.created_at))
            .unwrap_or_else(chrono::Utc::now);
        let mut session = Session::new(session_id, created_at);
        session.name = name;
        session.description = description;
        if let Some(updated_at) = updated_at {
            session.updated_at = updated_at;
        }

        for record in versions {
            let version = Self::resolve_record(&session.id, record, &numbers_by_id)?;
            session.append(version)?;
        }

        Ok(session)
    }

    fn resolve_record(
        session_id: &str,
        record: VersionRecord,
        numbers_by_id: &HashMap<String, u32>,
    ) -> Result<Version, LineageError> {
        let parent_version = match record.parent_version_id {
            Some(parent_id) => Some(*numbers_by_id.get(&parent_id).ok_or(
                LineageError::UnresolvedParentId {
                    version: record.version_number,
                    parent_id: parent_id.clone(),
                },
            )?),
            None => None,
        };

        let origin = match (record.user_input, record.user_feedback) {
            (Some(user_input), _) => VersionOrigin::Generated { user_input },
            (None, Some(user_feedback)) => VersionOrigin::Feedback { user_feedback },
            (None, None) => VersionOrigin::Rollback,
        };

        Ok(Version {
            id: version_id(session_id, record.version_number),
            session_id: record.session_id,
            version_number: record.version_number,
            parent_version,
            origin,
            schema: record.schema,
            prompt: record.prompt,
            diff: record.diff,
            image_url: record.image_url,
            created_at: record.created_at,
        })
    }

    /// The version forest as trees, roots and children in arrival order.
    pub fn tree(&self) -> Vec<VersionNode<'_>> {
        let mut children: HashMap<u32, Vec<&Version>> = HashMap::new();
        let mut roots = Vec::new();
        for version in &self.versions {
            match version.parent_version {
                Some(parent) => children.entry(parent).or_default().push(version),
                None => roots.push(version),
            }
        }

        fn build<'a>(version: &'a Version, children: &HashMap<u32, Vec<&'a Version>>) -> VersionNode<'a> {
            VersionNode {
                version,
                children: children
                    .get(&version.version_number)
                    .map(|kids| kids.iter().map(|kid| build(*kid, children)).collect())
                    .unwrap_or_default(),
            }
        }

        roots.into_iter().map(|root| build(root, &children)).collect()
    }
}
