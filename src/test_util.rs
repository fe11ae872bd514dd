use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::Settings;

/// Builds a zip archive in memory. Entries ending in `/` are directories.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
        } else {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
    }

    zip.finish().unwrap().into_inner()
}

/// A zipball the way the release host lays it out: one root folder named
/// after the repository and commit.
pub fn template_zipball() -> Vec<u8> {
    zip_archive(&[
        ("acme-starter-1a2b3c/", ""),
        ("acme-starter-1a2b3c/README.md", "# starter\n"),
        ("acme-starter-1a2b3c/src/", ""),
        ("acme-starter-1a2b3c/src/main.rs", "fn main() {}\n"),
    ])
}

pub fn settings(server: &MockServer) -> Settings {
    Settings::builder()
        .api_url(server.uri())
        .repository("acme/starter")
        .timeout_secs(10_u64)
        .build()
        .unwrap()
}

pub fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

pub fn release_json(server: &MockServer, tag: &str, published_at: &str) -> serde_json::Value {
    serde_json::json!({
        "tag_name": tag,
        "published_at": published_at,
        "zipball_url": format!("{}/archive/{tag}.zip", server.uri()),
    })
}

/// Mounts `GET /archive/<tag>.zip`, expected to be hit `times` times.
pub async fn mock_archive(server: &MockServer, tag: &str, body: Vec<u8>, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/archive/{tag}.zip")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(times)
        .mount(server)
        .await;
}
