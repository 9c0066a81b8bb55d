//! Test fixtures for generating chart packages and upload requests.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

/// Multipart boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "chartvault-test-boundary";

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Build a gzipped tarball from `(path, contents)` entries.
#[allow(dead_code)]
pub fn tgz(entries: &[(&str, &str)]) -> Bytes {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let encoder = builder.into_inner().unwrap();
    Bytes::from(encoder.finish().unwrap())
}

/// Chart.yaml contents with the given identity.
#[allow(dead_code)]
pub fn chart_manifest(name: &str, version: &str) -> String {
    format!(
        "apiVersion: v2\nname: {name}\nversion: \"{version}\"\ndescription: A test chart\nappVersion: \"1.16.0\"\nkeywords:\n  - test\n"
    )
}

/// A packaged chart as produced by `helm package`.
#[allow(dead_code)]
pub fn chart_archive(name: &str, version: &str) -> Bytes {
    let chart_dir = if name.is_empty() { "chart" } else { name };
    let manifest = chart_manifest(name, version);
    let manifest_path = format!("{chart_dir}/Chart.yaml");
    let values_path = format!("{chart_dir}/values.yaml");
    let template_path = format!("{chart_dir}/templates/deployment.yaml");
    tgz(&[
        (manifest_path.as_str(), manifest.as_str()),
        (values_path.as_str(), "replicaCount: 1\n"),
        (template_path.as_str(), "kind: Deployment\n"),
    ])
}

/// A clear-signed provenance file for a chart.
#[allow(dead_code)]
pub fn provenance(name: &str, version: &str) -> Bytes {
    Bytes::from(format!(
        "-----BEGIN PGP SIGNED MESSAGE-----\n\
         Hash: SHA512\n\
         \n\
         {manifest}\
         ...\n\
         files:\n  {name}-{version}.tgz: sha256:0000\n\
         -----BEGIN PGP SIGNATURE-----\n\
         \n\
         wsBcBAEBCgAQBQJc\n\
         -----END PGP SIGNATURE-----\n",
        manifest = chart_manifest(name, version),
    ))
}

/// Encode a single-part multipart/form-data body.
///
/// Returns the content type header value and the body.
#[allow(dead_code)]
pub fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> (String, Vec<u8>) {
    multipart_parts(&[(field, filename, data)])
}

/// Encode several parts into one multipart/form-data body.
#[allow(dead_code)]
pub fn multipart_parts(parts: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (field, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match filename {
            Some(filename) => {
                format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            }
            None => format!("Content-Disposition: form-data; name=\"{field}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}
