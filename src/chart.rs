//! The Chart Loader (spec §4.3): turn the raw blobs of one chart directory
//! at one commit into a validated, in-memory chart value.

use git2::Oid;

use crate::error::CoreError;
use crate::git::{Backend, FileEntry};

const CHART_MANIFEST: &str = "Chart.yaml";
const DEFAULT_API_VERSION: &str = "v1";

/// The parsed, validated contents of one chart directory at one commit.
pub struct Chart {
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub description: Option<String>,
    /// Every file under the chart directory, in tree-walk order, including
    /// `Chart.yaml` itself — this is exactly what the Package Builder tars up.
    pub files: Vec<FileEntry>,
}

/// The subset of `Chart.yaml` this crate cares about; other Helm-defined
/// fields are opaque and simply not represented (spec §3's "further
/// Helm-defined fields opaque to indexing").
#[derive(serde::Deserialize, Default)]
struct Manifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default, rename = "apiVersion")]
    api_version: String,
    #[serde(default)]
    description: Option<String>,
}

/// Reads `{base}/{dir}` at `commit` and produces a validated [`Chart`].
/// Failures here are local to one chart: the caller logs and skips rather
/// than aborting the index build (spec §4.3, §7's *chart-invalid*).
pub fn load(backend: &Backend, base: &str, dir: &str, commit: Oid) -> Result<Chart, CoreError> {
    let subpath = join_path(base, dir);
    let files = backend
        .files_at(commit, &subpath)
        .map_err(|source| CoreError::ChartInvalid {
            path: subpath.clone(),
            reason: source.to_string(),
        })?;

    let manifest_entry = files
        .iter()
        .find(|f| f.path == CHART_MANIFEST)
        .ok_or_else(|| CoreError::ChartInvalid {
            path: subpath.clone(),
            reason: "missing Chart.yaml".to_owned(),
        })?;

    let mut manifest: Manifest =
        serde_yaml::from_slice(&manifest_entry.data).map_err(|source| CoreError::ChartInvalid {
            path: subpath.clone(),
            reason: format!("Chart.yaml is not valid YAML: {}", source),
        })?;

    if manifest.api_version.is_empty() {
        manifest.api_version = DEFAULT_API_VERSION.to_owned();
    }

    if manifest.name.is_empty() || manifest.version.is_empty() {
        return Err(CoreError::ChartInvalid {
            path: subpath,
            reason: "Chart.yaml must declare a non-empty name and version".to_owned(),
        });
    }

    Ok(Chart {
        name: manifest.name,
        version: manifest.version,
        api_version: manifest.api_version,
        description: manifest.description,
        files,
    })
}

fn join_path(base: &str, dir: &str) -> String {
    let base = base.trim_matches('/');
    if base.is_empty() {
        dir.to_owned()
    } else {
        format!("{}/{}", base, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_missing_api_version() {
        let manifest: Manifest = serde_yaml::from_str("name: one\nversion: 1.0.0\n").unwrap();
        assert_eq!(manifest.api_version, "");
        assert_eq!(manifest.name, "one");
    }

    #[test]
    fn join_path_handles_root_base() {
        assert_eq!(join_path("/", "one"), "one");
        assert_eq!(join_path("stable", "one"), "stable/one");
        assert_eq!(join_path("", "one"), "one");
    }
}
