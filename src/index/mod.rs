//! The Index Builder (spec §4.4): drives branch/commit iteration, invokes
//! the Tree Walker and Chart Loader, synthesizes versions, and emits a
//! sorted, rendered index document plus the lookup table backing tarball
//! requests.

mod cache;
mod version;

pub use cache::{CommitBinding, EntryRecord, IndexCache, SharedCache};
pub use version::synthesize_versions;

use anyhow::{Context as _, Error};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

use crate::chart;
use crate::error::{content_digest, short_id};
use crate::git::Backend;
use crate::walker;

/// Rebuilds the full index from scratch by walking every configured branch.
/// Any Git-level failure aborts the whole build (spec §4.4, §7); per-chart
/// parse/validation failures are logged and skipped.
pub fn build(backend: &Backend, base: &str, clone_depth: u32) -> Result<IndexCache, Error> {
    let primary = backend.primary_branch().to_owned();
    let mut bindings: HashMap<(String, String), CommitBinding> = HashMap::new();
    let mut entries_by_chart: HashMap<String, Vec<EntryRecord>> = HashMap::new();

    for branch in backend.branches() {
        let is_primary = *branch == primary;
        let commits = backend
            .branch_commits(branch, clone_depth)
            .with_context(|| format!("listing commits on branch '{}'", branch))?;

        for (idx, &commit) in commits.iter().enumerate() {
            let is_head = idx == 0;

            let dirs = if is_primary && is_head {
                walker::all_dirs(backend, commit, base)
            } else {
                walker::modified_dirs(backend, commit, base)
            }
            .with_context(|| format!("walking tree at commit {}", commit))?;

            for dir in dirs {
                let loaded = match chart::load(backend, base, &dir, commit) {
                    Ok(chart) => chart,
                    Err(err) => {
                        tracing::warn!(
                            chart_dir = %dir,
                            branch = %branch,
                            commit = %commit,
                            error = %err,
                            "skipping invalid chart"
                        );
                        continue;
                    }
                };

                let commit_time = backend
                    .commit_time(commit)
                    .with_context(|| format!("reading commit time for {}", commit))?;
                let short = short_id(&commit);
                let digest = content_digest(
                    loaded
                        .files
                        .iter()
                        .map(|f| (f.path.as_str(), f.data.as_slice())),
                );
                let already_bound =
                    bindings.contains_key(&(loaded.name.clone(), loaded.version.clone()));

                let versions = synthesize_versions(
                    &loaded.version,
                    branch,
                    &short,
                    is_primary,
                    is_head,
                    already_bound,
                );

                for version in versions {
                    let key = (loaded.name.clone(), version.clone());
                    if bindings.contains_key(&key) {
                        // Earlier-produced binding wins (spec §3's tie-break).
                        continue;
                    }

                    bindings.insert(
                        key,
                        CommitBinding {
                            commit_id: commit.to_string(),
                            commit_time,
                            branch: branch.clone(),
                            digest: digest.clone(),
                            chart_dir: dir.clone(),
                        },
                    );

                    entries_by_chart
                        .entry(loaded.name.clone())
                        .or_default()
                        .push(EntryRecord {
                            name: loaded.name.clone(),
                            version: version.clone(),
                            api_version: loaded.api_version.clone(),
                            description: loaded.description.clone(),
                            urls: vec![format!("/chart/{}/{}", loaded.name, version)],
                            digest: digest.clone(),
                        });
                }
            }
        }
    }

    let mut entries: BTreeMap<String, Vec<EntryRecord>> = BTreeMap::new();
    for (name, mut records) in entries_by_chart {
        records.sort_by(compare_versions_desc);
        entries.insert(name, records);
    }

    let generated = Utc::now();
    let rendered = cache::render(&entries, generated)?;

    Ok(IndexCache {
        generated,
        entries,
        bindings,
        rendered,
    })
}

/// Newest-first ordering for one chart's version list: valid semver compares
/// numerically (which also ranks stable releases above same-numbered
/// prereleases, i.e. the `-branch-short8` derivatives, for free); anything
/// that fails to parse falls back to a reverse lexical compare.
fn compare_versions_desc(a: &EntryRecord, b: &EntryRecord) -> std::cmp::Ordering {
    match (
        semver::Version::parse(&a.version),
        semver::Version::parse(&b.version),
    ) {
        (Ok(va), Ok(vb)) => vb.cmp(&va),
        _ => b.version.cmp(&a.version),
    }
}
