// SPDX-License-Identifier: MPL-2.0

//! Publicly exported type aliases.

use std::collections::BTreeMap;

use crate::project::{ProjectProperties, ProjectRoot};

/// Concrete map type with a stable iteration order.
pub(crate) type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Constraints declared by a project on its dependencies, ordered by root
/// so that everything derived from them iterates deterministically.
pub type ProjectConstraints = BTreeMap<ProjectRoot, ProjectProperties>;
