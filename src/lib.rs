// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dependency solving for projects fetched from version control.
//!
//! Solving consists in finding, for every project a root project transitively
//! requires, one revision that satisfies the constraints of all its dependents.
//! Projects are not published to a registry: their versions are the branches
//! and tags of their repositories, and their dependencies are read from a
//! manifest at each revision. When no solution exists, the solver explains
//! which requirements clash, and through which dependents.
//!
//! # Versions and constraints
//!
//! A listed [Version](version::Version) is a semantic version tag, a branch,
//! a plain tag or a bare revision, always paired with the immutable
//! [Revision](version::Revision) it points at.
//! Dependents restrict versions with a [Constraint](constraint::Constraint):
//! a semantic version range, an exact version, a branch, a tag or a revision.
//!
//! # Basic example
//!
//! Let's imagine a project depending on a `menu` project,
//! itself depending on `icons`.
//! An in-memory source is enough to model that scenario:
//! ```
//! # use std::sync::Arc;
//! # use revsolve::constraint::Constraint;
//! # use revsolve::manifest::Manifest;
//! # use revsolve::project::ProjectProperties;
//! # use revsolve::solver::{resolve, SolveParameters};
//! # use revsolve::source::{MemorySource, SourceBackend, SourceMgr, SourceMgrConfig};
//! # use revsolve::version::Version;
//! let memory = Arc::new(MemorySource::new());
//! memory.add_version(
//!     "example.com/menu",
//!     Version::from_tag("v1.2.0"),
//!     [("example.com/icons", "^2.0.0".parse::<Constraint>().unwrap())],
//! );
//! memory.add_version("example.com/icons", Version::from_tag("v2.3.1"), []);
//! memory.add_version("example.com/icons", Version::from_tag("v3.0.0"), []);
//!
//! let sm = SourceMgr::with_backends(
//!     SourceMgrConfig::default(),
//!     vec![memory as Arc<dyn SourceBackend>],
//! );
//! let mut manifest = Manifest::default();
//! manifest
//!     .dependencies
//!     .insert("example.com/menu".into(), ProjectProperties::default());
//!
//! let solution = resolve(&sm, &SolveParameters::new("example.com/app", manifest)).unwrap();
//! let icons = solution.lock.get(&"example.com/icons".into()).unwrap();
//! assert_eq!(icons.version.as_ref().unwrap().to_string(), "2.3.1");
//! ```
//!
//! # Sources
//!
//! The solver only talks to a [SourceManager](source::SourceManager).
//! [SourceMgr](source::SourceMgr) implements it on top of version control
//! backends ([GitSource](source::GitSource), [HgSource](source::HgSource))
//! and caches every listing and manifest it fetches,
//! so that concurrent requests for the same data trigger a single fetch.
//!
//! # Solution and error reporting
//!
//! When everything goes well, the solver returns a
//! [Solution](solution::Solution) holding a [Lock](lock::Lock)
//! with the revision of every required project.
//! Feeding that lock back to the next solve makes the solver
//! prefer the locked versions.
//!
//! Otherwise it returns a [SolveError](error::SolveError).
//! Search failures carry a [Diagnostic](report::Diagnostic):
//! the conflicts that explain the failure and, for each,
//! the requirements involved and the chain of dependents that led to them.
//! A [Reporter](report::Reporter) turns it into something readable,
//! for instance with the [DefaultStringReporter](report::DefaultStringReporter):
//! ```
//! # use revsolve::error::SolveError;
//! # use revsolve::report::{DefaultStringReporter, Reporter};
//! # fn explain(result: Result<(), SolveError>) {
//! match result {
//!     Ok(()) => {}
//!     Err(err) => match err.diagnostic() {
//!         Some(diagnostic) => eprintln!("{}", DefaultStringReporter::report(diagnostic)),
//!         None => eprintln!("{}", err),
//!     },
//! }
//! # }
//! ```
//! Failing to fetch a project is a different kind of error:
//! it may be transient, and retrying the whole solve may work.

#![warn(missing_docs)]

pub mod constraint;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod project;
pub mod report;
pub mod solution;
pub mod solver;
pub mod source;
pub mod type_aliases;
pub mod version;

mod internal;
