// SPDX-License-Identifier: MPL-2.0

//! Deducing project roots and remote locations from import paths.

use crate::project::ProjectRoot;

/// Hosts where a project root is always `host/owner/repo`.
const KNOWN_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

/// The project root of an import path, when it follows a known layout.
///
/// Paths on well known hosts are rooted at `host/owner/repo`.
/// Elsewhere, the first path element carrying a `.git` or `.hg`
/// suffix marks the root.
pub fn deduce_root(import_path: &str) -> Option<ProjectRoot> {
    let path = import_path.trim_end_matches('/');
    let parts: Vec<&str> = path.split('/').collect();
    if KNOWN_HOSTS.contains(&parts[0]) {
        if parts.len() < 3 || parts[1].is_empty() || parts[2].is_empty() {
            return None;
        }
        return Some(ProjectRoot::new(parts[..3].join("/")));
    }
    parts
        .iter()
        .position(|p| p.ends_with(".git") || p.ends_with(".hg"))
        .filter(|&idx| idx > 0)
        .map(|idx| ProjectRoot::new(parts[..=idx].join("/")))
}

/// URL to clone a project from.
///
/// Locations that already carry a scheme are used as is, others get `https://`.
/// A `hg+` prefix selecting the Mercurial backend is removed.
pub fn remote_url(location: &str) -> String {
    let location = location.strip_prefix("hg+").unwrap_or(location);
    if location.contains("://") || location.starts_with("git@") {
        location.to_string()
    } else {
        format!("https://{}", location)
    }
}

/// A file system friendly name for the local copy of a remote.
pub(crate) fn cache_name(location: &str) -> String {
    location
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
