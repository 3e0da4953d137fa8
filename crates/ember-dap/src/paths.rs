use std::collections::HashMap;
use std::path::Path;

/// Turns a client-supplied source path into a plain filesystem path.
///
/// Anything containing `://` is treated as a URI and reduced to its percent-decoded path;
/// other input, and URIs that fail to parse or have an empty path, are returned unchanged.
pub fn normalize_source_path(path: &str) -> String {
    if !path.contains("://") {
        return path.to_string();
    }
    match url::Url::parse(path) {
        Ok(uri) if !uri.path().is_empty() => {
            percent_decode(uri.path()).unwrap_or_else(|| uri.path().to_string())
        }
        _ => path.to_string(),
    }
}

fn percent_decode(s: &str) -> Option<String> {
    if !s.contains('%') {
        return Some(s.to_string());
    }
    let hex = |b: u8| char::from(b).to_digit(16).map(|d| d as u8);
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex(*bytes.get(i + 1)?)?;
            let lo = hex(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Last path component, or the whole input when it has none.
pub fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Remembers the absolute paths the client set breakpoints in, keyed by file name, so short
/// script names reported by the engine resolve to something the client can open.
///
/// When two absolute paths share a file name the later one wins.
#[derive(Debug, Default)]
pub struct SourcePathMap {
    by_name: HashMap<String, String>,
}

impl SourcePathMap {
    pub fn record(&mut self, path: &str) {
        if Path::new(path).is_absolute() {
            self.by_name.insert(base_name(path), path.to_string());
        }
    }

    pub fn resolve(&self, filename: &str) -> String {
        if Path::new(filename).is_absolute() {
            return filename.to_string();
        }
        self.by_name
            .get(&base_name(filename))
            .cloned()
            .unwrap_or_else(|| filename.to_string())
    }
}
