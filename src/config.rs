//! The process-lifetime configuration record (spec §3, §6).
//!
//! This is kept as a plain data record rather than threaded through as
//! individual arguments everywhere, matching the teacher's `Ctx` pattern in
//! `lib.rs`: one struct built once in `main`, then passed by reference.

use std::path::PathBuf;

/// The conventional name of the canonical, specially-treated branch.
pub const PRIMARY_BRANCH: &str = "master";

#[derive(Clone, Debug)]
pub struct Config {
    /// Source Git URL (http/https/file scheme).
    pub repo_url: String,
    /// Shallow-clone depth; 0 means full history. Also caps per-branch
    /// ancestor traversal during indexing.
    pub clone_depth: u32,
    /// Base directory inside the repository under which chart directories
    /// live. `"/"` means the repository root.
    pub relative_dir: String,
    /// `host:port` HTTP bind address.
    pub listen_addr: String,
    /// Local filesystem path used for the bare clone.
    pub working_dir: PathBuf,
    /// If true, the working directory is erased before cloning.
    pub force_clone: bool,
    /// HMAC secret for the GitHub webhook; empty means unauthenticated.
    pub github_webhook_secret: String,
}

impl Config {
    /// The base path, normalized so chart-directory prefix comparisons are
    /// straightforward: `"/"` (the repository root) becomes `""`, anything
    /// else becomes `"relative/dir"` with no leading or trailing slash.
    pub fn normalized_relative_dir(&self) -> &str {
        self.relative_dir.trim_matches('/')
    }
}
