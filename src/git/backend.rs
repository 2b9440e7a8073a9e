use anyhow::{Context as _, Error};
use chrono::{DateTime, Utc};
use git2::{BranchType, Oid, Repository};
use std::path::{Path, PathBuf};

use crate::config::{Config, PRIMARY_BRANCH};
use crate::error::CoreError;

use super::auth::with_fetch_options;

/// A single file's contents, rooted relative to the subpath it was read
/// under (spec §4.1's `FilesAt`).
pub struct FileEntry {
    pub path: String,
    pub data: Vec<u8>,
}

/// Abstracts the Git repository as a stream of (branch, commit) pairs and
/// random access to commits/trees/blobs (spec §4.1).
///
/// Deliberately holds no open `git2::Repository` handle: libgit2 handles
/// are not `Sync`, and the spec calls for "no on-disk working tree" reads
/// that many concurrent requests can perform without serializing on a
/// shared mutable checkout. Each operation opens its own short-lived
/// `Repository` against the same bare clone on disk, which is cheap (no
/// checkout, just object-database access) and trivially thread-safe.
pub struct Backend {
    workdir: PathBuf,
    primary_branch: String,
    branches: Vec<String>,
}

impl Backend {
    /// Clones `cfg.repo_url` into `cfg.working_dir` as a bare repository,
    /// or opens it in place if it already exists and its `origin` matches.
    pub fn open(cfg: &Config) -> Result<Self, Error> {
        if cfg.force_clone && cfg.working_dir.exists() {
            std::fs::remove_dir_all(&cfg.working_dir)
                .context("failed to clear working directory for force-clone")?;
        }

        let repo = match clone_bare(&cfg.repo_url, &cfg.working_dir) {
            Ok(repo) => repo,
            Err(clone_err) => match reopen_matching(&cfg.working_dir, &cfg.repo_url) {
                Some(repo) => repo,
                None => {
                    return Err(Error::new(CoreError::Clone {
                        url: cfg.repo_url.clone(),
                        reason: format!("{:#}", clone_err),
                    }))
                }
            },
        };

        let branches = discover_branches(&repo, PRIMARY_BRANCH)?;

        if !branches.iter().any(|b| b == PRIMARY_BRANCH) {
            anyhow::bail!(CoreError::BranchMissing {
                branch: PRIMARY_BRANCH.to_owned(),
            });
        }

        Ok(Self {
            workdir: cfg.working_dir.clone(),
            primary_branch: PRIMARY_BRANCH.to_owned(),
            branches,
        })
    }

    /// Branches in traversal order: the primary branch first, then all
    /// others in discovery order (spec §4.1, §4.4).
    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    pub fn primary_branch(&self) -> &str {
        &self.primary_branch
    }

    fn repo(&self) -> Result<Repository, Error> {
        Repository::open_bare(&self.workdir).context("failed to open repository")
    }

    /// Resolves the tip commit of `branch`.
    pub fn branch_head(&self, branch: &str) -> Result<Oid, Error> {
        let repo = self.repo()?;
        let reference = lookup_branch_ref(&repo, branch)?;
        let oid = reference
            .target()
            .context("branch reference has no direct target")?;
        Ok(oid)
    }

    /// Validates and returns the oid for a commit id string.
    pub fn lookup_commit(&self, id: &str) -> Result<Oid, Error> {
        let oid = Oid::from_str(id).map_err(|_| CoreError::CommitNotFound(id.to_owned()))?;
        let repo = self.repo()?;
        repo.find_commit(oid)
            .map_err(|_| CoreError::CommitNotFound(id.to_owned()))?;
        Ok(oid)
    }

    pub fn commit_time(&self, id: Oid) -> Result<DateTime<Utc>, Error> {
        let repo = self.repo()?;
        let commit = repo
            .find_commit(id)
            .map_err(|_| CoreError::CommitNotFound(id.to_string()))?;
        // Author time, not committer time: matches `register()` in the
        // original `index_builder.go`, which binds `c.Author().When`. These
        // diverge on amended/rebased commits.
        let time = commit.author().when();
        let naive = DateTime::from_timestamp(time.seconds(), 0)
            .context("commit timestamp out of range")?;
        Ok(naive)
    }

    /// Commits reachable from `branch`'s tip, HEAD first, capped at `depth`
    /// commits total (0 means unbounded) — spec §4.4, §8 property 7.
    pub fn branch_commits(&self, branch: &str, depth: u32) -> Result<Vec<Oid>, Error> {
        let repo = self.repo()?;
        let head = self.branch_head(branch)?;

        let mut walk = repo.revwalk()?;
        walk.push(head)?;
        walk.set_sorting(git2::Sort::TIME)?;

        let mut oids = Vec::new();
        for oid in walk {
            let oid = oid?;
            oids.push(oid);
            if depth > 0 && oids.len() as u32 >= depth {
                break;
            }
        }
        Ok(oids)
    }

    /// Every blob under `{subpath}/` in `commit`'s tree, with `subpath`
    /// stripped from the returned relative names. Non-blob entries
    /// (subtrees, submodule gitlinks) are skipped (spec §4.1).
    pub fn files_at(&self, commit: Oid, subpath: &str) -> Result<Vec<FileEntry>, Error> {
        let repo = self.repo()?;
        let commit = repo
            .find_commit(commit)
            .map_err(|_| CoreError::CommitNotFound(commit.to_string()))?;
        let tree = commit.tree()?;

        let subtree_entry = if subpath.is_empty() {
            None
        } else {
            match tree.get_path(Path::new(subpath)) {
                Ok(entry) => Some(entry),
                Err(_) => return Ok(Vec::new()),
            }
        };

        let root = match &subtree_entry {
            Some(entry) => {
                let obj = entry.to_object(&repo)?;
                match obj.into_tree() {
                    Ok(t) => t,
                    Err(_) => return Ok(Vec::new()),
                }
            }
            None => tree,
        };

        let mut files = Vec::new();
        collect_blobs(&repo, &root, "", &mut files)?;
        Ok(files)
    }

    /// The union of paths added, modified, or deleted between `commit` and
    /// each of its parents. A root commit (no parents) yields every path in
    /// its tree (spec §4.1).
    pub fn modified_files(&self, commit: Oid) -> Result<Vec<String>, Error> {
        let repo = self.repo()?;
        let commit = repo
            .find_commit(commit)
            .map_err(|_| CoreError::CommitNotFound(commit.to_string()))?;
        let tree = commit.tree()?;

        let mut modified = Vec::new();
        if commit.parent_count() == 0 {
            collect_all_paths(&repo, &tree, "", &mut modified)?;
            return Ok(modified);
        }

        for i in 0..commit.parent_count() {
            let parent = commit.parent(i)?;
            let parent_tree = parent.tree()?;
            let diff = repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
            diff.foreach(
                &mut |delta, _| {
                    if let Some(path) = delta.old_file().path() {
                        modified.push(path.to_string_lossy().into_owned());
                    }
                    if let Some(path) = delta.new_file().path() {
                        modified.push(path.to_string_lossy().into_owned());
                    }
                    true
                },
                None,
                None,
                None,
            )?;
        }
        modified.sort();
        modified.dedup();
        Ok(modified)
    }

    /// The immediate subdirectory names of `base` in `commit`'s tree,
    /// excluding dot-files (spec §4.2's all-dirs mode).
    pub fn top_level_dirs(&self, commit: Oid, base: &str) -> Result<Vec<String>, Error> {
        let repo = self.repo()?;
        let commit = repo
            .find_commit(commit)
            .map_err(|_| CoreError::CommitNotFound(commit.to_string()))?;
        let tree = commit.tree()?;

        let root = if base.is_empty() {
            tree
        } else {
            match tree.get_path(Path::new(base)) {
                Ok(entry) => match entry.to_object(&repo)?.into_tree() {
                    Ok(t) => t,
                    Err(_) => return Ok(Vec::new()),
                },
                Err(_) => return Ok(Vec::new()),
            }
        };

        let mut dirs: Vec<String> = root
            .iter()
            .filter(|e| e.kind() == Some(git2::ObjectType::Tree))
            .filter_map(|e| e.name().map(str::to_owned))
            .filter(|name| !name.starts_with('.'))
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(dirs)
    }

    /// Runs a remote fetch for `origin`, updating the local remote-tracking
    /// reference for `branch` (spec §4.1's `FetchBranch`, used by the
    /// webhook path).
    pub fn fetch_branch(&self, branch: &str) -> Result<(), Error> {
        let repo = self.repo()?;
        let git_config = match repo.config() {
            Ok(cfg) => cfg,
            Err(_) => git2::Config::open_default().context("failed to open default git config")?,
        };

        let mut remote = repo
            .find_remote("origin")
            .context("repository has no 'origin' remote")?;
        let url = remote.url().unwrap_or_default().to_owned();

        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);

        with_fetch_options(&git_config, &url, &mut |mut opts| {
            opts.download_tags(git2::AutotagOption::All);
            remote
                .fetch(&[&refspec], Some(&mut opts), None)
                .map_err(|source| {
                    anyhow::Error::new(CoreError::Fetch {
                        branch: branch.to_owned(),
                        source,
                    })
                })
        })
        .with_context(|| format!("failed to fetch branch '{}'", branch))
    }
}

fn collect_blobs(
    repo: &Repository,
    tree: &git2::Tree<'_>,
    prefix: &str,
    out: &mut Vec<FileEntry>,
) -> Result<(), Error> {
    for entry in tree.iter() {
        let name = match entry.name() {
            Some(n) => n,
            None => continue,
        };
        let rel = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{}", prefix, name)
        };

        match entry.kind() {
            Some(git2::ObjectType::Blob) => {
                let blob = entry.to_object(repo)?.peel_to_blob()?;
                out.push(FileEntry {
                    path: rel,
                    data: blob.content().to_vec(),
                });
            }
            Some(git2::ObjectType::Tree) => {
                let subtree = entry.to_object(repo)?.peel_to_tree()?;
                collect_blobs(repo, &subtree, &rel, out)?;
            }
            _ => continue,
        }
    }
    Ok(())
}

fn collect_all_paths(
    repo: &Repository,
    tree: &git2::Tree<'_>,
    prefix: &str,
    out: &mut Vec<String>,
) -> Result<(), Error> {
    for entry in tree.iter() {
        let name = match entry.name() {
            Some(n) => n,
            None => continue,
        };
        let rel = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{}", prefix, name)
        };

        match entry.kind() {
            Some(git2::ObjectType::Blob) => out.push(rel),
            Some(git2::ObjectType::Tree) => {
                let subtree = entry.to_object(repo)?.peel_to_tree()?;
                collect_all_paths(repo, &subtree, &rel, out)?;
            }
            _ => continue,
        }
    }
    Ok(())
}

fn lookup_branch_ref<'repo>(
    repo: &'repo Repository,
    branch: &str,
) -> Result<git2::Reference<'repo>, Error> {
    if let Ok(b) = repo.find_branch(&format!("origin/{}", branch), BranchType::Remote) {
        return Ok(b.into_reference());
    }
    let b = repo
        .find_branch(branch, BranchType::Local)
        .with_context(|| format!("branch '{}' not found", branch))?;
    Ok(b.into_reference())
}

fn discover_branches(repo: &Repository, primary: &str) -> Result<Vec<String>, Error> {
    let mut seen = std::collections::BTreeSet::new();
    let mut ordered = Vec::new();

    let mut push = |name: String, seen: &mut std::collections::BTreeSet<String>| {
        if seen.insert(name.clone()) {
            ordered.push(name);
        }
    };

    // Primary branch goes first, regardless of discovery order, but only if
    // it actually exists: `Backend::open` relies on its absence from this
    // list to raise *branch-missing*.
    if lookup_branch_ref(repo, primary).is_ok() {
        push(primary.to_owned(), &mut seen);
    }

    let branches = repo.branches(Some(BranchType::Remote))?;
    for item in branches {
        let (branch, _) = item?;
        let name = branch.name()?.unwrap_or_default();
        let stripped = name.strip_prefix("origin/").unwrap_or(name);
        if stripped == "HEAD" {
            continue;
        }
        push(stripped.to_owned(), &mut seen);
    }

    let locals = repo.branches(Some(BranchType::Local))?;
    for item in locals {
        let (branch, _) = item?;
        let name = branch.name()?.unwrap_or_default();
        push(name.to_owned(), &mut seen);
    }

    Ok(ordered)
}

fn clone_bare(url: &str, target: &Path) -> Result<Repository, Error> {
    let git_config = git2::Config::open_default().context("failed to open default git config")?;

    with_fetch_options(&git_config, url, &mut |mut opts| {
        opts.download_tags(git2::AutotagOption::All);
        let mut builder = git2::build::RepoBuilder::new();
        builder.bare(true).fetch_options(opts);
        builder
            .clone(url, target)
            .map(drop)
            .map_err(anyhow::Error::from)
    })?;

    Repository::open_bare(target).context("failed to open freshly cloned repository")
}

/// If `workdir` already holds a Git repository whose `origin` remote
/// matches `url`, return it so it can be used in place of a fresh clone
/// (spec §4.1's fallback-to-existing-repo rule).
fn reopen_matching(workdir: &Path, url: &str) -> Option<Repository> {
    let repo = Repository::open_bare(workdir).ok()?;
    let remote = repo.find_remote("origin").ok()?;
    if remote.url() == Some(url) {
        Some(repo)
    } else {
        None
    }
}
