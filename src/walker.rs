//! The Tree Walker (spec §4.2): given a commit, yield the chart directory
//! names relevant to that commit — either every chart directory (used only
//! at primary-branch HEAD) or just the ones a commit actually touched.

use anyhow::Error;
use git2::Oid;

use crate::git::Backend;

/// All-dirs mode: the immediate subdirectories of `base`, dot-files
/// excluded, sorted and deduplicated. Used only at the primary branch's
/// HEAD (spec §4.4).
pub fn all_dirs(backend: &Backend, commit: Oid, base: &str) -> Result<Vec<String>, Error> {
    backend.top_level_dirs(commit, base)
}

/// Modified-dirs mode: the chart directories touched by `commit`, derived
/// from its modified-files union, projected to their first path segment
/// after `base` (spec §4.2).
pub fn modified_dirs(backend: &Backend, commit: Oid, base: &str) -> Result<Vec<String>, Error> {
    let modified = backend.modified_files(commit)?;
    Ok(project_modified_dirs(&modified, base))
}

/// The pure projection step of [`modified_dirs`], split out so it can be
/// exercised directly without a repository fixture.
pub fn project_modified_dirs(modified: &[String], base: &str) -> Vec<String> {
    let base = base.trim_matches('/');

    let mut dirs: Vec<String> = modified
        .iter()
        .filter_map(|path| {
            let rest = if base.is_empty() {
                Some(path.as_str())
            } else {
                path.strip_prefix(base).and_then(|r| r.strip_prefix('/'))
            }?;
            let first_segment_end = rest.find('/')?;
            Some(rest[..first_segment_end].to_owned())
        })
        .collect();

    dirs.sort();
    dirs.dedup();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_first_segment_under_base() {
        let modified = vec![
            "stable/one/Chart.yaml".to_owned(),
            "stable/one/templates/deployment.yaml".to_owned(),
            "stable/two/Chart.yaml".to_owned(),
            "README.md".to_owned(),
            "stable/Chart.yaml".to_owned(),
        ];

        assert_eq!(
            project_modified_dirs(&modified, "stable"),
            vec!["one".to_owned(), "two".to_owned()]
        );
    }

    #[test]
    fn empty_base_matches_repo_root() {
        let modified = vec!["one/Chart.yaml".to_owned(), "two/values.yaml".to_owned()];

        assert_eq!(
            project_modified_dirs(&modified, "/"),
            vec!["one".to_owned(), "two".to_owned()]
        );
    }

    #[test]
    fn dedups_and_sorts() {
        let modified = vec![
            "stable/b/x".to_owned(),
            "stable/a/x".to_owned(),
            "stable/a/y".to_owned(),
        ];

        assert_eq!(
            project_modified_dirs(&modified, "stable"),
            vec!["a".to_owned(), "b".to_owned()]
        );
    }
}
