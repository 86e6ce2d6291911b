// SPDX-License-Identifier: MPL-2.0

mod common;

use common::{expected, init_logs, params, versions, Registry};
use revsolve::solver::resolve;

#[test]
/// https://github.com/dart-lang/pub/blob/master/doc/solver.md#no-conflicts
fn no_conflict() {
    init_logs();
    let registry = Registry::new();
    registry.add("foo", "1.0.0", &[("bar", ">=1.0.0, <2.0.0")]);
    registry.add("bar", "1.0.0", &[]);
    registry.add("bar", "2.0.0", &[]);

    let solution = resolve(&registry.manager(), &params(&[("foo", ">=1.0.0, <2.0.0")])).unwrap();

    assert_eq!(
        versions(&solution),
        expected(&[("foo", "1.0.0"), ("bar", "1.0.0")])
    );
}

#[test]
/// https://github.com/dart-lang/pub/blob/master/doc/solver.md#avoiding-conflict-during-decision-making
fn avoiding_conflict_during_decision_making() {
    init_logs();
    let registry = Registry::new();
    registry.add("foo", "1.1.0", &[("bar", ">=2.0.0, <3.0.0")]);
    registry.add("foo", "1.0.0", &[]);
    registry.add("bar", "1.0.0", &[]);
    registry.add("bar", "1.1.0", &[]);
    registry.add("bar", "2.0.0", &[]);

    let root = params(&[("foo", ">=1.0.0, <2.0.0"), ("bar", ">=1.0.0, <2.0.0")]);
    let solution = resolve(&registry.manager(), &root).unwrap();

    assert_eq!(
        versions(&solution),
        expected(&[("foo", "1.0.0"), ("bar", "1.1.0")])
    );
}

#[test]
/// https://github.com/dart-lang/pub/blob/master/doc/solver.md#performing-conflict-resolution
fn conflict_resolution() {
    init_logs();
    let registry = Registry::new();
    registry.add("foo", "2.0.0", &[("bar", ">=1.0.0, <2.0.0")]);
    registry.add("foo", "1.0.0", &[]);
    registry.add("bar", "1.0.0", &[("foo", ">=1.0.0, <2.0.0")]);

    let solution = resolve(&registry.manager(), &params(&[("foo", ">=1.0.0")])).unwrap();

    assert_eq!(versions(&solution), expected(&[("foo", "1.0.0")]));
}

#[test]
/// https://github.com/dart-lang/pub/blob/master/doc/solver.md#conflict-resolution-with-a-partial-satisfier
fn conflict_with_partial_satisfier() {
    init_logs();
    let registry = Registry::new();
    registry.add("foo", "1.1.0", &[("left", "^1.0.0"), ("right", "^1.0.0")]);
    registry.add("foo", "1.0.0", &[]);
    registry.add("left", "1.0.0", &[("shared", ">=1.0.0")]);
    registry.add("right", "1.0.0", &[("shared", "<2.0.0")]);
    registry.add("shared", "2.0.0", &[]);
    registry.add("shared", "1.0.0", &[("target", "^1.0.0")]);
    registry.add("target", "2.0.0", &[]);
    registry.add("target", "1.0.0", &[]);

    let root = params(&[("foo", "^1.0.0"), ("target", "^2.0.0")]);
    let solution = resolve(&registry.manager(), &root).unwrap();

    assert_eq!(
        versions(&solution),
        expected(&[("foo", "1.0.0"), ("target", "2.0.0")])
    );
}

#[test]
/// https://github.com/dart-lang/pub/blob/master/doc/solver.md#linear-error-reporting
fn linear_error_reporting() {
    init_logs();
    let registry = Registry::new();
    registry.add("foo", "1.0.0", &[("bar", "^2.0.0")]);
    registry.add("bar", "2.0.0", &[("baz", "^3.0.0")]);
    registry.add("baz", "1.0.0", &[]);
    registry.add("baz", "3.0.0", &[]);

    let root = params(&[("foo", "^1.0.0"), ("baz", "^1.0.0")]);
    let err = resolve(&registry.manager(), &root).unwrap_err();

    let diagnostic = err.diagnostic().unwrap();
    let dependents: Vec<String> = diagnostic
        .dependents()
        .iter()
        .map(|atom| atom.id.root.to_string())
        .collect();
    assert!(dependents.contains(&"bar".to_string()), "{:?}", dependents);
}
