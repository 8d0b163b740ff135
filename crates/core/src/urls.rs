use crate::model::SourceKind;
use std::path::Path;
use url::Url;

pub fn source_kind(url: &Url) -> SourceKind {
    if url.scheme() == "file" {
        SourceKind::File
    } else {
        SourceKind::Stream
    }
}

/// Name shown when a source carries no title: the file name for local files, the whole URL
/// otherwise.
pub fn display_name(url: &Url) -> String {
    if source_kind(url) == SourceKind::File {
        let name = url
            .to_file_path()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
        if let Some(name) = name {
            return name;
        }
    }
    url.as_str().to_string()
}

/// Accepts either an absolute URL or a filesystem path.
pub fn parse_source(input: &str) -> Option<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        if url.scheme().len() > 1 {
            return Some(url);
        }
    }
    let path = Path::new(trimmed);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Url::from_file_path(absolute).ok()
}
