use url::Url;

/// URL helpers used by the download path.
pub struct UrlUtil;

impl UrlUtil {
    /// Parse `raw` as an absolute URL. Returns `None` when the string has no
    /// scheme (`"test.phar"`, `"/tmp/file"`) or is otherwise malformed.
    pub fn parse_with_scheme(raw: &str) -> Option<Url> {
        let url = Url::parse(raw.trim()).ok()?;
        if url.scheme().is_empty() {
            return None;
        }
        Some(url)
    }

    /// Whether the URL is served over HTTP or HTTPS.
    pub fn is_http(url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    /// Whether the URL points at the local filesystem.
    pub fn is_file(url: &Url) -> bool {
        url.scheme() == "file"
    }

    /// The URL without any embedded username or password, safe for logs.
    pub fn without_credentials(url: &Url) -> Url {
        if url.username().is_empty() && url.password().is_none() {
            return url.clone();
        }

        let mut result = url.clone();
        // Both setters only fail for cannot-be-a-base URLs, which carry no
        // credentials in the first place.
        let _ = result.set_username("");
        let _ = result.set_password(None);
        result
    }
}
