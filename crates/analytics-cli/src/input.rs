//! Reading queries and JSON documents named on the command line.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const STDIN_NAME: &str = "<stdin>";

/// One query to optimize and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSource {
    pub name: String,
    pub content: String,
}

impl SqlSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self {
            name: path.display().to_string(),
            content: read_file(path)?,
        })
    }

    pub fn from_reader(name: impl Into<String>, mut reader: impl Read) -> Result<Self> {
        let name = name.into();
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read from {name}"))?;
        Ok(Self { name, content })
    }

    /// The query with surrounding whitespace and trailing semicolons removed.
    pub fn query(&self) -> &str {
        self.content.trim().trim_end_matches(';').trim_end()
    }
}

/// The given files in order, or stdin when there are none.
///
/// Sources without a query are dropped.
pub fn read_input(files: &[PathBuf]) -> Result<Vec<SqlSource>> {
    let sources = if files.is_empty() {
        vec![SqlSource::from_reader(STDIN_NAME, io::stdin().lock())?]
    } else {
        files
            .iter()
            .map(|path| SqlSource::from_path(path))
            .collect::<Result<Vec<_>>>()?
    };
    Ok(sources
        .into_iter()
        .filter(|source| !source.query().is_empty())
        .collect())
}

/// Reads and deserializes a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    serde_json::from_str(&read_file(path)?)
        .with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhis_analytics_core::outlier::OutlierDetectionQuery;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_files_are_read_in_order() {
        let mut first = NamedTempFile::new().unwrap();
        let mut second = NamedTempFile::new().unwrap();
        writeln!(first, "select * from analytics_event_ur1edk5oe2n;").unwrap();
        writeln!(second, "select 2").unwrap();

        let sources =
            read_input(&[first.path().to_path_buf(), second.path().to_path_buf()]).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, first.path().display().to_string());
        assert_eq!(sources[0].query(), "select * from analytics_event_ur1edk5oe2n");
        assert_eq!(sources[1].query(), "select 2");
    }

    #[test]
    fn test_blank_file_is_skipped() {
        let mut blank = NamedTempFile::new().unwrap();
        writeln!(blank, "  ;\n").unwrap();

        assert!(read_input(&[blank.path().to_path_buf()]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = read_input(&[PathBuf::from("/nonexistent/file.sql")]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/file.sql"));
    }

    #[test]
    fn test_from_reader() {
        let source = SqlSource::from_reader(STDIN_NAME, "select 1;\n".as_bytes()).unwrap();
        assert_eq!(source.name, "<stdin>");
        assert_eq!(source.query(), "select 1");
    }

    #[test]
    fn test_read_json_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = read_json::<OutlierDetectionQuery>(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid JSON"));
    }
}
