// SPDX-License-Identifier: MPL-2.0

use revsolve::constraint::Constraint;
use revsolve::manifest::{validate_manifest, Manifest, ManifestError, ManifestWarning};
use revsolve::project::{ProjectProperties, ProjectRoot};

const GOLDEN: &str = include_str!("testdata/manifest/golden.toml");

fn golden_manifest() -> Manifest {
    let mut manifest = Manifest {
        ignored: vec!["github.com/foo/bar".to_string()],
        ..Manifest::default()
    };
    manifest.dependencies.insert(
        ProjectRoot::new("github.com/golang/dep/internal/gps"),
        ProjectProperties::from(">=0.12.0, <1.0.0".parse::<Constraint>().unwrap()),
    );
    manifest.dependencies.insert(
        ProjectRoot::new("github.com/babble/brook"),
        ProjectProperties::from(Constraint::Revision(
            "d05d5aca9f895d19e9265839bffeadd74a2d2ecb".into(),
        )),
    );
    manifest.overrides.insert(
        ProjectRoot::new("github.com/golang/dep/internal/gps"),
        ProjectProperties {
            source: Some("https://github.com/golang/dep/internal/gps".to_string()),
            constraint: Constraint::Branch("master".to_string()),
        },
    );
    manifest
}

#[test]
fn read_golden() {
    let manifest = Manifest::from_toml_str(GOLDEN).unwrap();
    assert_eq!(manifest, golden_manifest());
}

#[test]
fn write_golden() {
    assert_eq!(golden_manifest().to_toml_string(), GOLDEN);
}

#[test]
fn multiple_constraints_are_rejected() {
    let err = Manifest::from_toml_str(include_str!("testdata/manifest/error1.toml")).unwrap_err();
    assert!(matches!(err, ManifestError::MultipleConstraints { .. }), "{}", err);
    assert_eq!(
        err.to_string(),
        "multiple constraints specified for github.com/golang/dep/internal/gps, can only specify one"
    );
}

#[test]
fn duplicate_dependencies_are_rejected() {
    let err = Manifest::from_toml_str(include_str!("testdata/manifest/error2.toml")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "multiple dependencies specified for github.com/golang/dep/internal/gps, can only specify one"
    );
}

#[test]
fn validate_warnings() {
    let cases: Vec<(&str, Vec<ManifestWarning>)> = vec![
        (
            r#"
            [[dependencies]]
              name = "github.com/foo/bar"
            "#,
            vec![],
        ),
        (
            r#"
            foo = "some-value"
            version = 14

            [[bar]]
              author = "xyz"
            "#,
            vec![
                ManifestWarning::UnknownField("bar".to_string()),
                ManifestWarning::UnknownField("foo".to_string()),
                ManifestWarning::UnknownField("version".to_string()),
            ],
        ),
        (
            r#"
            metadata = "project-name"
            "#,
            vec![ManifestWarning::MetadataNotTable],
        ),
        (
            r#"
            dependencies = "foo"
            overrides = "bar"
            "#,
            vec![
                ManifestWarning::NotArrayOfTables("dependencies".to_string()),
                ManifestWarning::NotArrayOfTables("overrides".to_string()),
            ],
        ),
        (
            r#"
            [[dependencies]]
              name = "github.com/foo/bar"
              location = "some-value"
              link = "some-other-value"
              metadata = "foo"
            "#,
            vec![
                ManifestWarning::InvalidKey {
                    key: "link".to_string(),
                    section: "dependencies".to_string(),
                },
                ManifestWarning::InvalidKey {
                    key: "location".to_string(),
                    section: "dependencies".to_string(),
                },
                ManifestWarning::ProjectMetadataNotTable("dependencies".to_string()),
            ],
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(validate_manifest(input).unwrap(), expected, "{}", input);
    }
}

#[test]
fn validate_rejects_invalid_toml() {
    assert!(validate_manifest("[[dependencies]\nname = ").is_err());
}
