//! MIME heuristics used to decide whether a discovered URL is worth fetching.

use url::Url;

/// Guess the content type of a URL from its path extension.
///
/// A path without an extension is assumed to be an HTML page; an unknown
/// extension yields an empty string (unknown).
pub fn guess_mime_by_extension(u: &str) -> &'static str {
    let path = match Url::parse(u) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => {
            tracing::debug!(url = %u, "mime guess failed to parse URL");
            return "";
        }
    };

    let ext = match path.rsplit_once('/') {
        Some((_, last)) => match last.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => String::new(),
        },
        None => String::new(),
    };

    match ext.as_str() {
        "gif" => "image/gif",
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "css" => "text/css",
        "js" => "text/javascript",
        // A path without an extension is usually a page.
        "" => "text/html",
        _ => "",
    }
}

/// Content that gets recorded as a result but never queued for crawling.
pub fn can_skip_mime(mime: &str) -> bool {
    mime.starts_with("image") || mime == "text/css" || mime == "text/javascript"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_by_extension() {
        assert_eq!(guess_mime_by_extension("http://a/x.gif"), "image/gif");
        assert_eq!(guess_mime_by_extension("http://a/x.JPG"), "image/jpeg");
        assert_eq!(guess_mime_by_extension("http://a/x.jpeg"), "image/jpeg");
        assert_eq!(guess_mime_by_extension("http://a/x.png"), "image/png");
        assert_eq!(guess_mime_by_extension("http://a/style.css"), "text/css");
        assert_eq!(guess_mime_by_extension("http://a/app.js"), "text/javascript");
    }

    #[test]
    fn no_extension_is_html() {
        assert_eq!(guess_mime_by_extension("http://a/"), "text/html");
        assert_eq!(guess_mime_by_extension("http://a/page"), "text/html");
        assert_eq!(guess_mime_by_extension("http://a/page?x=1.png"), "text/html");
    }

    #[test]
    fn unknown_extension_is_empty() {
        assert_eq!(guess_mime_by_extension("http://a/file.pdf"), "");
        assert_eq!(guess_mime_by_extension("http://a/archive.tar.gz"), "");
    }

    #[test]
    fn dotfile_has_no_extension() {
        assert_eq!(guess_mime_by_extension("http://a/.hidden"), "text/html");
    }

    #[test]
    fn skippable_mimes() {
        assert!(can_skip_mime("image/png"));
        assert!(can_skip_mime("image/svg+xml"));
        assert!(can_skip_mime("text/css"));
        assert!(can_skip_mime("text/javascript"));
        assert!(!can_skip_mime("text/html"));
        assert!(!can_skip_mime(""));
        assert!(!can_skip_mime("application/octet-stream"));
    }
}
