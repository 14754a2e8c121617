use crate::config::Scheme;

/// Build `https://{host}{path}` from a raw domain string.
///
/// A leading `http://` or `https://` is dropped and trailing slashes are
/// trimmed from the host. The host itself is not validated; a malformed one
/// simply fails later as a transport error.
pub fn build_url(domain: &str, path: &str) -> String {
    build_url_with_scheme(Scheme::Https, domain, path)
}

pub fn build_url_with_scheme(scheme: Scheme, domain: &str, path: &str) -> String {
    format!("{}://{}{}", scheme, normalize_host(domain), path)
}

/// Strip scheme and trailing slashes from a domain string.
pub fn normalize_host(domain: &str) -> &str {
    let trimmed = domain.trim();
    let host = strip_prefix_ci(trimmed, "https://")
        .or_else(|| strip_prefix_ci(trimmed, "http://"))
        .unwrap_or(trimmed);
    host.trim_end_matches('/')
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
