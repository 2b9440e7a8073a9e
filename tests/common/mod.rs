//! Shared fixtures: build a small local Git repository with a couple of
//! branches and chart directories, without touching the network.

use chart_streams::config::Config;
use git2::{Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};

pub fn commit(repo: &Repository, message: &str, files: &[(&str, &str)]) -> git2::Oid {
    let workdir = repo.workdir().expect("fixture repo must not be bare").to_path_buf();
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();

    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("fixture", "fixture@example.com").unwrap();

    let parent_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Lays out:
///
/// - master: one commit adding `one/` at version `1.0.0`, then a second
///   commit touching `one/Chart.yaml` without bumping the version.
/// - feature: branched off the first master commit, adds `two/` at
///   version `0.1.0`.
///
/// Returns the repo rooted at `dir`, ready to be used as a clone source.
pub fn build_fixture_repo(dir: &Path) -> Repository {
    let repo = Repository::init(dir).unwrap();
    repo.set_head("refs/heads/master").unwrap();

    commit(
        &repo,
        "add chart one at 1.0.0",
        &[
            ("one/Chart.yaml", "name: one\nversion: 1.0.0\ndescription: first chart\n"),
            ("one/templates/deployment.yaml", "kind: Deployment\n"),
        ],
    );

    let first_tip = repo.head().unwrap().peel_to_commit().unwrap();
    repo.branch("feature", &first_tip, false).unwrap();

    commit(
        &repo,
        "carry version 1.0.0 forward unchanged",
        &[("one/Chart.yaml", "name: one\nversion: 1.0.0\ndescription: same version, new text\n")],
    );

    repo.set_head("refs/heads/feature").unwrap();
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
        .unwrap();

    commit(
        &repo,
        "add chart two at 0.1.0 on feature",
        &[
            ("two/Chart.yaml", "name: two\nversion: 0.1.0\n"),
            ("two/values.yaml", "replicas: 1\n"),
        ],
    );

    repo.set_head("refs/heads/master").unwrap();
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
        .unwrap();

    repo
}

/// A `Config` pointing `repo_url` at a local path, so `Backend::open` clones
/// over the filesystem transport rather than the network.
pub fn config_for(origin: &Path, working_dir: PathBuf, clone_depth: u32) -> Config {
    Config {
        repo_url: origin.to_string_lossy().into_owned(),
        clone_depth,
        relative_dir: "/".to_owned(),
        listen_addr: "127.0.0.1:0".to_owned(),
        working_dir,
        force_clone: false,
        github_webhook_secret: String::new(),
    }
}
