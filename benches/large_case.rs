// SPDX-License-Identifier: MPL-2.0
use std::sync::Arc;
use std::time::Duration;

extern crate criterion;
use self::criterion::*;

use revsolve::constraint::Constraint;
use revsolve::manifest::Manifest;
use revsolve::project::{ProjectProperties, ProjectRoot};
use revsolve::solver::{resolve, SolveParameters};
use revsolve::source::{MemorySource, SourceBackend, SourceMgr, SourceMgrConfig};
use revsolve::version::Version;

/// `width` projects with `depth` minor versions each.
/// Every version of a project requires the following two projects,
/// capped at their middle version.
fn layered(width: usize, depth: u64) -> Arc<MemorySource> {
    let memory = Arc::new(MemorySource::new());
    for project in 0..width {
        for minor in 0..depth {
            let mut deps: Vec<(String, Constraint)> = Vec::new();
            if project + 1 < width {
                deps.push((
                    format!("p{}", project + 1),
                    Constraint::Version(semver::Version::new(1, minor.min(depth / 2), 0)),
                ));
            }
            if project + 2 < width {
                deps.push((
                    format!("p{}", project + 2),
                    format!("<=1.{}.0", depth / 2).parse().unwrap(),
                ));
            }
            memory.add_version(
                &format!("p{}", project),
                Version::Semver(semver::Version::new(1, minor, 0)),
                deps.iter().map(|(dep, c)| (dep.as_str(), c.clone())),
            );
        }
    }
    memory
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_cases");
    group.measurement_time(Duration::from_secs(20));

    for (width, depth) in [(10, 10), (30, 20), (60, 30)] {
        let memory = layered(width, depth);
        let mut manifest = Manifest::default();
        manifest
            .dependencies
            .insert(ProjectRoot::new("p0"), ProjectProperties::default());
        let params = SolveParameters::new("root", manifest);

        group.bench_function(format!("layered_{}x{}", width, depth), |b| {
            b.iter(|| {
                // A fresh manager, so that fetches are not cached between runs.
                let sm = SourceMgr::with_backends(
                    SourceMgrConfig::default(),
                    vec![memory.clone() as Arc<dyn SourceBackend>],
                );
                let _ = resolve(&sm, &params);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_nested);
criterion_main!(benches);
