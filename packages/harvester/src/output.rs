//! Serialization of harvested and reconciled records.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;

use crate::error::Result;

/// Serialization format of command output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML document.
    Yaml,
}

impl OutputFormat {
    /// Conventional file extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Render records in `format`, always ending with a newline.
pub fn render<T: Serialize + ?Sized>(records: &T, format: OutputFormat) -> Result<String> {
    let mut content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(records)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(records)?),
    };
    if !content.ends_with('\n') {
        content.push('\n');
    }
    Ok(content)
}

/// Write records to `path`, or to stdout when no path is given.
///
/// Files are written to a temporary sibling, synced and renamed into place,
/// so an interrupted run never leaves a truncated file behind. Parent
/// directories are created as needed.
///
/// # Returns
/// The path written to, if any.
pub fn write_records<T: Serialize + ?Sized>(
    records: &T,
    format: OutputFormat,
    path: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let content = render(records, format)?;

    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(content.as_bytes())?;
        stdout.flush()?;
        return Ok(None);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("output.{}", format.extension()));
    let temp_file = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut file = File::create(&temp_file)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)?;
    }

    fs::rename(&temp_file, path)?;
    Ok(Some(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_render_json() {
        let rendered = render(&json!([{"title": "Hamlet"}]), OutputFormat::Json).unwrap();
        assert!(rendered.contains("\"title\": \"Hamlet\""));
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn test_render_yaml() {
        let rendered = render(&json!([{"title": "Hamlet"}]), OutputFormat::Yaml).unwrap();
        assert!(rendered.starts_with("---\n"));
        assert!(rendered.contains("title: Hamlet"));
    }

    #[test]
    fn test_write_records_creates_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("sheets.yaml");

        let written = write_records(&vec!["a", "b"], OutputFormat::Yaml, Some(&path)).unwrap();

        assert_eq!(written.as_deref(), Some(path.as_path()));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("- a"));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_records_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_records(&json!({"n": 1}), OutputFormat::Json, Some(&path)).unwrap();
        write_records(&json!({"n": 2}), OutputFormat::Json, Some(&path)).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["n"], 2);
    }
}
