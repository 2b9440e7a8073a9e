mod common;

use chart_streams as cs;
use std::collections::HashSet;
use tempfile::tempdir;

#[test]
fn builds_index_across_branches_and_scenarios() {
    let origin = tempdir().unwrap();
    common::build_fixture_repo(origin.path());

    let workdir = tempdir().unwrap();
    let cfg = common::config_for(origin.path(), workdir.path().join("clone"), 0);
    let backend = cs::git::Backend::open(&cfg).unwrap();
    let index =
        cs::index::build(&backend, cfg.normalized_relative_dir(), cfg.clone_depth).unwrap();

    // Primary-HEAD precedence (testable property 2): master's HEAD declares
    // 1.0.0, so it wins the plain version even though an older commit on
    // master also declared 1.0.0.
    assert!(index.lookup("one", "1.0.0").is_some());
    let one_versions: Vec<&str> = index.entries["one"]
        .iter()
        .map(|r| r.version.as_str())
        .collect();
    assert!(one_versions.contains(&"1.0.0"));
    assert!(one_versions.iter().any(|v| v.starts_with("1.0.0-master-")));

    // `two` is introduced on `feature`: both the branch-tip alias and the
    // short8 derivative are published.
    let two_versions: Vec<&str> = index.entries["two"]
        .iter()
        .map(|r| r.version.as_str())
        .collect();
    assert!(two_versions.contains(&"0.1.0-feature"));
    assert!(two_versions.iter().any(|v| v.starts_with("0.1.0-feature-")));

    // Uniqueness (testable property 1).
    let mut seen = HashSet::new();
    for (name, records) in &index.entries {
        for record in records {
            assert!(seen.insert((name.clone(), record.version.clone())));
        }
    }

    // Newest-first ordering: the declared stable version sorts ahead of its
    // `-branch-short8` derivative within the same chart.
    assert_eq!(index.entries["one"][0].version, "1.0.0");
}

#[test]
fn idempotent_rebuild_on_unchanged_repo() {
    let origin = tempdir().unwrap();
    common::build_fixture_repo(origin.path());

    let workdir = tempdir().unwrap();
    let cfg = common::config_for(origin.path(), workdir.path().join("clone"), 0);
    let backend = cs::git::Backend::open(&cfg).unwrap();

    let first = cs::index::build(&backend, cfg.normalized_relative_dir(), cfg.clone_depth).unwrap();
    let second =
        cs::index::build(&backend, cfg.normalized_relative_dir(), cfg.clone_depth).unwrap();

    let summarize = |idx: &cs::index::IndexCache| -> Vec<(String, String, String)> {
        let mut out: Vec<_> = idx
            .entries
            .iter()
            .flat_map(|(name, records)| {
                records
                    .iter()
                    .map(move |r| (name.clone(), r.version.clone(), r.digest.clone()))
            })
            .collect();
        out.sort();
        out
    };

    assert_eq!(summarize(&first), summarize(&second));
}

#[test]
fn relative_dir_scopes_discovery_to_a_subdirectory() {
    let origin = tempdir().unwrap();
    let repo = git2::Repository::init(origin.path()).unwrap();
    repo.set_head("refs/heads/master").unwrap();
    common::commit(
        &repo,
        "charts under stable/, plus an unrelated top-level dir",
        &[
            ("stable/one/Chart.yaml", "name: one\nversion: 1.0.0\n"),
            ("docs/README.md", "not a chart\n"),
        ],
    );

    let workdir = tempdir().unwrap();
    let mut cfg = common::config_for(origin.path(), workdir.path().join("clone"), 0);
    cfg.relative_dir = "stable".to_owned();

    let backend = cs::git::Backend::open(&cfg).unwrap();
    let index =
        cs::index::build(&backend, cfg.normalized_relative_dir(), cfg.clone_depth).unwrap();

    assert!(index.entries.contains_key("one"));
    assert!(!index.entries.contains_key("docs"));
}
