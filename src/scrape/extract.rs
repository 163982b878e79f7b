//! Pull URL candidates out of an HTML document and resolve them against the
//! page they were found on.

use scraper::{Html, Selector};
use url::Url;

/// Collect the raw `href` and `src` attribute values from a document, in
/// document order.
pub fn find_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("[href], [src]").unwrap();

    let mut candidates = Vec::new();
    for element in document.select(&sel) {
        for attr in ["href", "src"] {
            if let Some(value) = element.value().attr(attr) {
                let value = value.trim();
                if !value.is_empty() {
                    candidates.push(value.to_string());
                }
            }
        }
    }
    candidates
}

/// Resolve a raw candidate against the page it came from.
///
/// Absolute URLs pass through. A candidate missing its scheme or host
/// borrows them from the target; a relative path is joined onto the target's
/// path, keeping any trailing slash. `data:` URIs and unparseable candidates
/// are dropped.
pub fn resolve(target: &Url, raw: &str) -> Option<String> {
    let candidate = raw.trim();
    if candidate.is_empty() || candidate.starts_with("data:") {
        return None;
    }

    if let Ok(absolute) = Url::parse(candidate) {
        return Some(absolute.to_string());
    }

    // Scheme-relative: //host/path borrows the target's scheme.
    if let Some(rest) = candidate.strip_prefix("//") {
        return Url::parse(&format!("{}://{}", target.scheme(), rest))
            .ok()
            .map(|u| u.to_string());
    }

    // Relative reference: path, then optional query and fragment.
    let (path_part, query, fragment) = split_reference(candidate);

    let path = if path_part.starts_with('/') {
        path_part.to_string()
    } else {
        join_paths(target.path(), path_part)
    };

    let mut resolved = target.clone();
    resolved.set_path(&path);
    resolved.set_query(query);
    resolved.set_fragment(fragment);
    Some(resolved.to_string())
}

/// Split a relative reference into (path, query, fragment).
fn split_reference(candidate: &str) -> (&str, Option<&str>, Option<&str>) {
    let (without_fragment, fragment) = match candidate.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (candidate, None),
    };
    let (path, query) = match without_fragment.split_once('?') {
        Some((head, q)) => (head, Some(q)),
        None => (without_fragment, None),
    };
    (path, query, fragment)
}

/// Join a relative path onto a base path, cleaning `.`/`..` segments and
/// preserving the relative path's trailing slash.
fn join_paths(base: &str, relative: &str) -> String {
    let trailing_slash = relative.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut joined = String::from("/");
    joined.push_str(&segments.join("/"));
    if trailing_slash && joined.len() > 1 {
        joined.push('/');
    }
    joined
}
