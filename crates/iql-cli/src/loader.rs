//! The concrete source loader: HTTP(S) GET via `ureq` and filesystem
//! globbing.

use std::io::Read;

use iql_core::source::loader::{LoadedDocument, SourceLoader};
use iql_core::{Error, Result};

/// Loads documents from the network and the local filesystem.
#[derive(Debug, Default)]
pub struct HttpLoader;

impl SourceLoader for HttpLoader {
    fn fetch(&self, url: &str) -> Result<LoadedDocument> {
        tracing::debug!(url, "GET");
        match ureq::get(url).call() {
            Ok(response) => {
                let media_type = Some(response.content_type().to_string());
                let mut data = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut data)
                    .map_err(Error::Io)?;
                Ok(LoadedDocument {
                    name: url.to_string(),
                    media_type,
                    data,
                })
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(Error::NotFound(format!("{url}: HTTP {code}")))
            }
            Err(e) => Err(Error::NotFound(format!("{url}: {e}"))),
        }
    }

    fn glob(&self, pattern: &str) -> Result<Vec<LoadedDocument>> {
        let paths =
            glob::glob(pattern).map_err(|e| Error::NotFound(format!("{pattern}: {e}")))?;
        let mut documents = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| Error::NotFound(format!("{pattern}: {e}")))?;
            if !path.is_file() {
                continue;
            }
            documents.push(LoadedDocument {
                name: path.display().to_string(),
                media_type: None,
                data: std::fs::read(&path)?,
            });
        }
        if documents.is_empty() {
            return Err(Error::NotFound(pattern.to_string()));
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_reads_matching_files() {
        let dir = std::env::temp_dir().join("iql-loader-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.csv"), "X\n1\n").unwrap();
        std::fs::write(dir.join("b.csv"), "X\n2\n").unwrap();

        let pattern = dir.join("*.csv").display().to_string();
        let docs = HttpLoader.glob(&pattern).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.name.ends_with(".csv")));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_glob_without_matches_is_not_found() {
        let err = HttpLoader.glob("/nonexistent/dir/*.nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
