//! Chart metadata extraction from packaged archives and provenance files.
//!
//! A packaged chart is a gzipped tarball whose top-level directory holds a
//! `Chart.yaml`. A provenance file is a PGP clear-signed document whose body
//! starts with the same YAML block, terminated by a `...` line.

use crate::MAX_MANIFEST_SIZE;
use crate::asset::AssetKind;
use crate::attributes::{Maintainer, PackageAttributes, normalize};
use flate2::read::GzDecoder;
use serde::{Deserialize, Deserializer};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Component, Path};

/// Name of the manifest entry inside a chart archive.
pub const CHART_MANIFEST: &str = "Chart.yaml";

const PGP_SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const PGP_SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";
const YAML_DOCUMENT_END: &str = "...";

/// Extract package attributes from an asset of the given kind.
pub fn extract<R: Read>(reader: R, kind: AssetKind) -> crate::Result<PackageAttributes> {
    match kind {
        AssetKind::PrimaryArchive => extract_chart_archive(reader),
        AssetKind::DetachedSignature => extract_provenance(reader),
    }
}

/// Read `Chart.yaml` out of a packaged chart.
pub fn extract_chart_archive<R: Read>(reader: R) -> crate::Result<PackageAttributes> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(archive_error)?;

    for entry in entries {
        let mut entry = entry.map_err(archive_error)?;
        let is_manifest = {
            let path = entry.path().map_err(archive_error)?;
            is_top_level_manifest(&path)
        };
        if !is_manifest {
            continue;
        }

        let size = entry.header().size().map_err(archive_error)?;
        if size > MAX_MANIFEST_SIZE {
            return Err(crate::Error::MalformedPackage(format!(
                "{CHART_MANIFEST} is {size} bytes (max: {MAX_MANIFEST_SIZE})"
            )));
        }
        let mut text = String::new();
        entry
            .take(MAX_MANIFEST_SIZE)
            .read_to_string(&mut text)
            .map_err(archive_error)?;
        return parse_manifest(&text);
    }

    Err(crate::Error::MalformedPackage(format!(
        "archive does not contain {CHART_MANIFEST}"
    )))
}

/// Read the chart YAML block out of a clear-signed provenance file.
pub fn extract_provenance<R: Read>(reader: R) -> crate::Result<PackageAttributes> {
    let mut lines = BufReader::new(reader.take(MAX_MANIFEST_SIZE)).lines();

    let first = next_line(&mut lines)?;
    if first.as_deref().map(str::trim_end) != Some(PGP_SIGNED_HEADER) {
        return Err(crate::Error::MalformedPackage(
            "provenance is not a PGP signed message".to_string(),
        ));
    }

    // Armor headers ("Hash: SHA512") run until the first blank line.
    loop {
        match next_line(&mut lines)? {
            Some(line) if line.trim().is_empty() => break,
            Some(_) => continue,
            None => {
                return Err(crate::Error::MalformedPackage(
                    "provenance ends inside armor headers".to_string(),
                ));
            }
        }
    }

    let mut body = String::new();
    let mut terminated = false;
    while let Some(line) = next_line(&mut lines)? {
        let line = line.trim_end_matches('\r');
        if line == YAML_DOCUMENT_END || line.starts_with(PGP_SIGNATURE_HEADER) {
            terminated = true;
            break;
        }
        // RFC 4880 dash-escaping
        let line = line.strip_prefix("- ").unwrap_or(line);
        body.push_str(line);
        body.push('\n');
    }
    if !terminated {
        return Err(crate::Error::MalformedPackage(
            "provenance has no signed chart block".to_string(),
        ));
    }

    parse_manifest(&body)
}

fn next_line<B: BufRead>(lines: &mut std::io::Lines<B>) -> crate::Result<Option<String>> {
    lines.next().transpose().map_err(archive_error)
}

/// Whether an archive entry is `<chart>/Chart.yaml` (or a bare `Chart.yaml`).
///
/// Manifests of bundled subcharts under `<chart>/charts/` are skipped.
fn is_top_level_manifest(path: &Path) -> bool {
    let components: Vec<_> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    match components.as_slice() {
        [Component::Normal(file)] | [Component::Normal(_), Component::Normal(file)] => {
            *file == CHART_MANIFEST
        }
        _ => false,
    }
}

fn archive_error(e: std::io::Error) -> crate::Error {
    match e.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
            crate::Error::MalformedPackage(e.to_string())
        }
        _ => crate::Error::Io(e),
    }
}

/// Chart manifest fields consulted during ingestion.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartManifest {
    #[serde(default, deserialize_with = "scalar")]
    name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    version: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    description: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    app_version: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    api_version: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    home: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    icon: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    sources: Option<Vec<String>>,
    #[serde(default)]
    maintainers: Option<Vec<Maintainer>>,
}

/// YAML scalars such as `version: 1.0` parse as numbers; keep their text.
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_yaml::Value;
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn parse_manifest(text: &str) -> crate::Result<PackageAttributes> {
    let manifest: ChartManifest = if text.trim().is_empty() {
        ChartManifest::default()
    } else {
        serde_yaml::from_str(text).map_err(|e| {
            crate::Error::MalformedPackage(format!("invalid {CHART_MANIFEST}: {e}"))
        })?
    };

    Ok(PackageAttributes {
        name: normalize(manifest.name.as_deref()),
        version: normalize(manifest.version.as_deref()),
        description: normalize(manifest.description.as_deref()),
        app_version: normalize(manifest.app_version.as_deref()),
        api_version: normalize(manifest.api_version.as_deref()),
        home: normalize(manifest.home.as_deref()),
        icon: normalize(manifest.icon.as_deref()),
        keywords: manifest.keywords.unwrap_or_default(),
        sources: manifest.sources.unwrap_or_default(),
        maintainers: manifest.maintainers.unwrap_or_default(),
    })
}
