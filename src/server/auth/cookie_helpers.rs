use axum::http::HeaderMap;

/// Parse cookies from a Cookie header value
///
/// This implements RFC 6265 cookie parsing:
/// - Cookies are separated by semicolons
/// - Leading/trailing whitespace is trimmed
/// - Cookie format is "name=value"
fn parse_cookies(cookie_header: &str) -> impl Iterator<Item = (&str, &str)> {
    cookie_header.split(';').filter_map(|cookie| {
        let cookie = cookie.trim();
        cookie.split_once('=')
    })
}

/// Extract a named cookie value from request headers
///
/// All `Cookie` headers are searched; empty values count as absent.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(parse_cookies)
        .find(|(cookie_name, _)| *cookie_name == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
