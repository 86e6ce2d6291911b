// SPDX-License-Identifier: MPL-2.0

//! Package trees of repository checkouts.

use crate::project::{PackageTree, ProjectRoot};

use super::SourceError;

/// Directories never considered as packages.
const SKIPPED_DIRS: [&str; 2] = ["vendor", "testdata"];

/// Finds the import paths of packages in their source files.
///
/// Backends reading a repository only see its files. Without a scanner every
/// package comes with no imports, and only manifests create requirements.
pub trait ImportScanner: Send + Sync {
    /// Whether a file, by name, is source code this scanner reads.
    fn is_source(&self, file_name: &str) -> bool;

    /// Import paths named in the contents of one source file.
    fn imports(&self, contents: &str) -> Vec<String>;
}

fn skipped(dir: &str) -> bool {
    dir.split('/')
        .any(|part| part.starts_with('.') || part.starts_with('_') || SKIPPED_DIRS.contains(&part))
}

/// Package tree of a project from the files of one revision, paths relative to the root.
///
/// Every directory holding a file is a package, the root one included.
/// Source files are only read when a scanner is given.
pub(crate) fn scan_packages<'a, I, F>(
    root: &ProjectRoot,
    files: I,
    scanner: Option<&dyn ImportScanner>,
    mut read: F,
) -> Result<PackageTree, SourceError>
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(&str) -> Result<Option<String>, SourceError>,
{
    let mut tree = PackageTree::new();
    tree.insert(root.as_str(), Vec::<String>::new());
    for file in files.into_iter().map(str::trim).filter(|f| !f.is_empty()) {
        let (package, name) = match file.rsplit_once('/') {
            Some((dir, _)) if skipped(dir) => continue,
            Some((dir, name)) => (format!("{}/{}", root, dir), name),
            None => (root.to_string(), file),
        };
        let imports = match scanner {
            Some(scanner) if scanner.is_source(name) => match read(file)? {
                Some(contents) => scanner.imports(&contents),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        tree.insert(package, imports);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    /// Reads `use path;` lines of `.src` files.
    struct UseLines;

    impl ImportScanner for UseLines {
        fn is_source(&self, file_name: &str) -> bool {
            file_name.ends_with(".src")
        }

        fn imports(&self, contents: &str) -> Vec<String> {
            contents
                .lines()
                .filter_map(|l| l.trim().strip_prefix("use "))
                .map(|l| l.trim_end_matches(';').to_string())
                .collect()
        }
    }

    fn files() -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("README", "use nothing;"),
            ("main.src", "use example.com/y;\n"),
            ("cmd/tool/tool.src", "use example.com/a/b/util;\nuse example.com/z/sub;"),
            ("util/util.src", ""),
            (".github/ci.src", "use example.com/hidden;"),
            ("vendor/x/x.src", "use example.com/vendored;"),
            ("internal/_tmp/t.src", "use example.com/tmp;"),
        ])
    }

    #[test]
    fn packages_skip_hidden_and_vendor() {
        let files = files();
        let tree = scan_packages(
            &ProjectRoot::new("example.com/a/b"),
            files.keys().copied(),
            None,
            |_| panic!("nothing to read without a scanner"),
        )
        .unwrap();
        assert_eq!(
            tree.packages().collect::<Vec<_>>(),
            [
                "example.com/a/b",
                "example.com/a/b/cmd/tool",
                "example.com/a/b/util"
            ]
        );
        assert!(tree.packages().all(|p| tree.imports(p).unwrap().is_empty()));
    }

    #[test]
    fn scanner_reads_source_files() {
        let files = files();
        let mut reads = Vec::new();
        let tree = scan_packages(
            &ProjectRoot::new("example.com/a/b"),
            files.keys().copied(),
            Some(&UseLines),
            |file| {
                reads.push(file.to_string());
                Ok(files.get(file).map(|c| c.to_string()))
            },
        )
        .unwrap();
        assert_eq!(reads, ["cmd/tool/tool.src", "main.src", "util/util.src"]);
        let imports = |p: &str| tree.imports(p).unwrap().iter().cloned().collect::<Vec<_>>();
        assert_eq!(imports("example.com/a/b"), ["example.com/y"]);
        assert_eq!(
            imports("example.com/a/b/cmd/tool"),
            ["example.com/a/b/util", "example.com/z/sub"]
        );
        assert_eq!(
            tree.external_imports(&tree.reachable(["example.com/a/b/cmd/tool"])),
            BTreeSet::from(["example.com/z/sub".to_string()])
        );
    }
}
