use reqwest::Url;

use crate::constants::NOT_SET;

/// Reduce a landing page or search-console URL to `path[?query]`.
///
/// Unknown pages (`None`, empty, `"(not set)"`) stay unknown rather than becoming
/// `/`, which would fold untracked traffic into the homepage. Absolute URLs lose
/// scheme and host; anything else gets a leading slash. Applying this to its own
/// output returns it unchanged.
pub fn normalize_path(url: Option<&str>) -> Option<String> {
    let raw = url?;
    if raw.is_empty() || raw == NOT_SET {
        return None;
    }

    if !raw.starts_with('/') {
        if let Ok(parsed) = Url::parse(raw) {
            if parsed.has_host() {
                let mut path = parsed.path().to_string();
                if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
                    path.push('?');
                    path.push_str(query);
                }
                return Some(path);
            }
        }
    }

    if raw.starts_with('/') {
        Some(raw.to_string())
    } else {
        Some(format!("/{}", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_pages_are_none() {
        assert_eq!(normalize_path(None), None);
        assert_eq!(normalize_path(Some("")), None);
        assert_eq!(normalize_path(Some("(not set)")), None);
    }

    #[test]
    fn test_absolute_urls_keep_path_and_query() {
        assert_eq!(
            normalize_path(Some("https://shop.example/shoes")),
            Some("/shoes".into())
        );
        assert_eq!(
            normalize_path(Some("https://shop.example/shoes?color=red")),
            Some("/shoes?color=red".into())
        );
        assert_eq!(normalize_path(Some("https://shop.example")), Some("/".into()));
        assert_eq!(normalize_path(Some("https://shop.example/a?")), Some("/a".into()));
        // Fragments are not part of the page
        assert_eq!(
            normalize_path(Some("http://shop.example/faq#returns")),
            Some("/faq".into())
        );
    }

    #[test]
    fn test_relative_values_get_leading_slash() {
        assert_eq!(normalize_path(Some("/shoes")), Some("/shoes".into()));
        assert_eq!(normalize_path(Some("shoes")), Some("/shoes".into()));
        assert_eq!(normalize_path(Some("/?utm=x")), Some("/?utm=x".into()));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "https://shop.example/shoes?x=1",
            "https://shop.example",
            "/blog/post",
            "blog/post",
            "/",
            "localhost:8080/x",
            "https://shop.example/a%20b",
        ];
        for input in inputs {
            let once = normalize_path(Some(input)).unwrap();
            assert_eq!(normalize_path(Some(&once)), Some(once.clone()), "input {}", input);
        }
    }
}
