//! Source acquisition: URL / path / data-URI classification and format
//! resolution.
//!
//! Network fetching and filesystem globbing live behind [`SourceLoader`];
//! `data:` URIs are decoded here so the engine can run without either.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use url::Url;

use crate::error::{Error, Result};

/// Document formats the engine can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
    Html,
}

impl Format {
    /// Resolves a format from a path suffix.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        match path.rsplit('.').next() {
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            Some("html") => Some(Self::Html),
            _ => None,
        }
    }

    /// Resolves a format from a media type, ignoring parameters.
    #[must_use]
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.split(';').next().map(str::trim) {
            Some("text/csv") => Some(Self::Csv),
            Some("application/json") => Some(Self::Json),
            Some("text/html") => Some(Self::Html),
            _ => None,
        }
    }
}

/// A fetched byte stream plus the metadata format resolution needs.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// URL or path the bytes came from.
    pub name: String,
    /// Media type reported by the transport, when any.
    pub media_type: Option<String>,
    /// The document bytes. Ownership passes to the format adapter.
    pub data: Vec<u8>,
}

impl LoadedDocument {
    fn format(&self) -> Option<Format> {
        Format::from_path(&self.name)
            .or_else(|| self.media_type.as_deref().and_then(Format::from_media_type))
    }
}

/// External collaborator that turns URLs and glob patterns into byte
/// streams. The engine core only decodes `data:` URIs itself.
pub trait SourceLoader {
    /// Performs an HTTP(S) GET. Non-200 responses are `NotFound`.
    fn fetch(&self, url: &str) -> Result<LoadedDocument>;

    /// Expands a filesystem glob. No matches is `NotFound`.
    fn glob(&self, pattern: &str) -> Result<Vec<LoadedDocument>>;
}

/// A loader for environments without network or filesystem access; every
/// acquisition fails with `NotFound`. `data:` URIs still resolve.
#[derive(Debug, Default)]
pub struct NullLoader;

impl SourceLoader for NullLoader {
    fn fetch(&self, url: &str) -> Result<LoadedDocument> {
        Err(Error::NotFound(url.to_string()))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<LoadedDocument>> {
        Err(Error::NotFound(pattern.to_string()))
    }
}

/// Fetches every document named by `input`: an `http(s)` URL, a `data:`
/// URI, or a filesystem glob.
pub fn fetch_documents(input: &str, loader: &dyn SourceLoader) -> Result<Vec<LoadedDocument>> {
    if let Ok(url) = Url::parse(input) {
        match url.scheme() {
            "http" | "https" => {
                tracing::debug!(url = input, "fetching remote document");
                return Ok(vec![loader.fetch(input)?]);
            }
            "data" => return Ok(vec![parse_data_uri(input)?]),
            _ => {}
        }
    }
    tracing::debug!(pattern = input, "expanding local documents");
    loader.glob(input)
}

/// Resolves a FROM clause's URL list into byte streams plus the format
/// tag that selects the adapter. The first document that resolves a
/// format decides it.
pub fn resolve(inputs: &[String], loader: &dyn SourceLoader) -> Result<(Vec<Vec<u8>>, Format)> {
    let mut streams = Vec::new();
    let mut format = None;
    for input in inputs {
        for doc in fetch_documents(input, loader)? {
            if format.is_none() {
                format = doc.format();
            }
            streams.push(doc.data);
        }
    }
    match format {
        Some(format) => Ok((streams, format)),
        None => Err(Error::UnresolvedFormat(inputs.join(", "))),
    }
}

/// Decodes `data:<media-type>[;base64],<payload>`.
pub fn parse_data_uri(uri: &str) -> Result<LoadedDocument> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::NotFound(uri.to_string()))?;
    let (head, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Format(format!("data URI without payload: {uri}")))?;

    let (media_type, encoded) = match head.strip_suffix(";base64") {
        Some(mt) => (mt, true),
        None => (head, false),
    };

    let data = if encoded {
        BASE64
            .decode(payload.trim())
            .map_err(|e| Error::Format(format!("invalid base64 payload: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(LoadedDocument {
        name: "data".to_string(),
        media_type: if media_type.is_empty() {
            None
        } else {
            Some(media_type.to_string())
        },
        data,
    })
}
