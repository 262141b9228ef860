//! Atom groups: the units of spatial summation.

use serde::{Deserialize, Serialize};

use super::SummationMode;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, SedError};

/// A sorted, duplicate-free set of atom indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtomGroup {
    indices: Vec<usize>,
}

impl AtomGroup {
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// Every atom of an `n_atoms` system.
    pub fn all(n_atoms: usize) -> Self {
        Self {
            indices: (0..n_atoms).collect(),
        }
    }

    /// All atoms whose type label is in `wanted`.
    pub fn with_types(types: &[u32], wanted: &[u32]) -> Self {
        Self {
            indices: types
                .iter()
                .enumerate()
                .filter(|(_, t)| wanted.contains(t))
                .map(|(i, _)| i)
                .collect(),
        }
    }

    /// Union of several groups.
    pub fn union(groups: &[AtomGroup]) -> Self {
        Self::from_indices(groups.iter().flat_map(|g| g.indices.iter().copied()).collect())
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// One flat list, or a list of lists.
///
/// In job files `atom_types = [1, 2]` is a flat list and
/// `atom_types = [[1], [2, 3]]` is nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupSpec<T> {
    Nested(Vec<Vec<T>>),
    Flat(Vec<T>),
}

/// Which atoms enter an SED calculation and how they are grouped.
///
/// Explicit indices and type labels are mutually exclusive; when both are
/// present, indices take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomSelector {
    #[serde(default)]
    pub atom_indices: Option<GroupSpec<usize>>,
    #[serde(default)]
    pub atom_types: Option<GroupSpec<u32>>,
}

impl AtomSelector {
    /// All atoms as a single group.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn indices(indices: Vec<usize>) -> Self {
        Self {
            atom_indices: Some(GroupSpec::Flat(indices)),
            atom_types: None,
        }
    }

    pub fn index_groups(groups: Vec<Vec<usize>>) -> Self {
        Self {
            atom_indices: Some(GroupSpec::Nested(groups)),
            atom_types: None,
        }
    }

    pub fn types(types: Vec<u32>) -> Self {
        Self {
            atom_indices: None,
            atom_types: Some(GroupSpec::Flat(types)),
        }
    }

    pub fn type_groups(groups: Vec<Vec<u32>>) -> Self {
        Self {
            atom_indices: None,
            atom_types: Some(GroupSpec::Nested(groups)),
        }
    }

    /// Resolve into concrete, non-empty atom groups.
    ///
    /// A flat type list forms one group under coherent summation and one
    /// group per type under incoherent summation. Groups matching no atoms
    /// are dropped; if none remain, all atoms form a single group.
    pub fn resolve(
        &self,
        types: &[u32],
        mode: SummationMode,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<AtomGroup>> {
        let n_atoms = types.len();
        let mut groups = Vec::new();
        let mut requested = false;

        if let Some(spec) = &self.atom_indices {
            if self.atom_types.is_some() {
                diagnostics.push(Diagnostic::ConflictingSelectors);
            }
            let lists = match spec {
                GroupSpec::Flat(v) if v.is_empty() => Vec::new(),
                GroupSpec::Flat(v) => vec![v.clone()],
                GroupSpec::Nested(v) => v.clone(),
            };
            requested = !lists.is_empty();
            for (i, list) in lists.into_iter().enumerate() {
                if let Some(&index) = list.iter().find(|&&idx| idx >= n_atoms) {
                    return Err(SedError::AtomIndexOutOfBounds { index, n_atoms });
                }
                let group = AtomGroup::from_indices(list);
                if group.is_empty() {
                    diagnostics.push(Diagnostic::EmptyGroup {
                        label: format!("index group {}", i),
                    });
                } else {
                    groups.push(group);
                }
            }
        } else if let Some(spec) = &self.atom_types {
            let lists = match (spec, mode) {
                (GroupSpec::Nested(v), _) => v.clone(),
                (GroupSpec::Flat(v), _) if v.is_empty() => Vec::new(),
                (GroupSpec::Flat(v), SummationMode::Coherent) => vec![v.clone()],
                (GroupSpec::Flat(v), SummationMode::Incoherent) => {
                    v.iter().map(|&t| vec![t]).collect()
                }
            };
            requested = !lists.is_empty();
            for list in lists {
                let group = AtomGroup::with_types(types, &list);
                if group.is_empty() {
                    diagnostics.push(Diagnostic::EmptyGroup {
                        label: format!("types {:?}", list),
                    });
                } else {
                    groups.push(group);
                }
            }
        }

        if groups.is_empty() {
            if requested {
                diagnostics.push(Diagnostic::AllGroupsEmpty);
            }
            log::debug!("Using all {} atoms as a single group", n_atoms);
            groups.push(AtomGroup::all(n_atoms));
        }
        Ok(groups)
    }
}
