//! Zip packaging of a single flow for the `deploy` call.

use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::core::manifest;

/// Build a deflate-compressed archive holding the flow and its `package.xml`.
pub fn build_archive(flow_name: &str, document: &str, api_version: &str) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (path, contents) in manifest::archive_entries(flow_name, document, api_version) {
        writer
            .start_file(path.as_str(), options)
            .with_context(|| format!("start archive entry {path}"))?;
        writer
            .write_all(contents.as_bytes())
            .with_context(|| format!("write archive entry {path}"))?;
    }
    let cursor = writer.finish().context("finish deploy archive")?;
    Ok(cursor.into_inner())
}
