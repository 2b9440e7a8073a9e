//! The Package Builder (spec §4.5): tar a loaded chart's raw files into a
//! gzip-wrapped archive with deterministic headers and ordering.

use anyhow::{Context as _, Error};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::chart::Chart;

const FILE_MODE: u32 = 0o644;

/// Builds the gzip+tar archive for `chart`, rooting every entry under
/// `{chart.name}/` and stamping every header with `commit_time` (spec
/// §4.5). The whole buffer is fully materialized before returning: the
/// HTTP layer needs the final length before it can write headers.
pub fn build(chart: &Chart, commit_time: DateTime<Utc>) -> Result<Vec<u8>, Error> {
    let mtime = commit_time.timestamp().max(0) as u64;

    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(gz);

    for file in &chart.files {
        let mut header = tar::Header::new_gnu();
        header.set_mode(FILE_MODE);
        header.set_mtime(mtime);
        header.set_size(file.data.len() as u64);
        header.set_entry_type(tar::EntryType::Regular);

        let entry_name = format!("{}/{}", chart.name, file.path);
        header
            .set_path(&entry_name)
            .with_context(|| format!("invalid tar entry path '{}'", entry_name))?;
        header.set_cksum();

        tar.append(&header, file.data.as_slice())
            .with_context(|| format!("writing tar entry '{}'", entry_name))?;
    }

    let gz = tar.into_inner().context("flushing tar trailer")?;
    let bytes = gz.finish().context("flushing gzip footer")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::FileEntry;
    use std::io::Read;

    fn sample_chart() -> Chart {
        Chart {
            name: "one".to_owned(),
            version: "1.0.0".to_owned(),
            api_version: "v1".to_owned(),
            description: None,
            files: vec![
                FileEntry {
                    path: "Chart.yaml".to_owned(),
                    data: b"name: one\nversion: 1.0.0\n".to_vec(),
                },
                FileEntry {
                    path: "templates/deployment.yaml".to_owned(),
                    data: b"kind: Deployment\n".to_vec(),
                },
            ],
        }
    }

    fn commit_time() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn packages_entries_rooted_under_chart_name() {
        let chart = sample_chart();
        let bytes = build(&chart, commit_time()).unwrap();

        let gz = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut archive = tar::Archive::new(gz);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec![
                "one/Chart.yaml".to_owned(),
                "one/templates/deployment.yaml".to_owned()
            ]
        );
    }

    #[test]
    fn is_deterministic_for_the_same_inputs() {
        let chart = sample_chart();
        let first = build(&chart, commit_time()).unwrap();
        let second = build(&chart, commit_time()).unwrap();

        let decode = |bytes: &[u8]| -> Vec<u8> {
            let gz = flate2::read::GzDecoder::new(bytes);
            let mut archive = tar::Archive::new(gz);
            let mut out = Vec::new();
            for entry in archive.entries().unwrap() {
                let mut entry = entry.unwrap();
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).unwrap();
                out.extend(buf);
            }
            out
        };

        assert_eq!(decode(&first), decode(&second));
    }

    #[test]
    fn sets_mode_and_mtime_on_every_entry() {
        let chart = sample_chart();
        let bytes = build(&chart, commit_time()).unwrap();

        let gz = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut archive = tar::Archive::new(gz);
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            assert_eq!(entry.header().mode().unwrap(), FILE_MODE);
            assert_eq!(entry.header().mtime().unwrap(), commit_time().timestamp() as u64);
        }
    }
}
