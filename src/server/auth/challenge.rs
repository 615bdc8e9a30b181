use axum::http::Method;

/// Response header carrying the registry API version
pub const API_VERSION_HEADER: &str = "Docker-Distribution-API-Version";

/// Value of [`API_VERSION_HEADER`]
pub const API_VERSION: &str = "registry/2.0";

/// Path segments that open a repository endpoint (`<name>/<endpoint>/...`)
const ENDPOINT_SEGMENTS: [&str; 3] = ["tags", "manifests", "blobs"];

/// Builds the `WWW-Authenticate` challenge returned on 401 responses
#[derive(Debug, Clone)]
pub struct ChallengeIssuer {
    realm: String,
    service: String,
}

impl ChallengeIssuer {
    pub fn new(realm: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            service: service.into(),
        }
    }

    /// `Bearer realm="..",service=".."[,scope=".."]` for the given request
    pub fn challenge(&self, method: &Method, path: &str) -> String {
        let mut header = format!(
            r#"Bearer realm="{}",service="{}""#,
            self.realm, self.service
        );
        if let Some(scope) = scope_for(method, path) {
            header.push_str(&format!(r#",scope="{}""#, scope));
        }
        header
    }
}

/// Split a path below `/v2/` into repository name and endpoint.
///
/// `library/nginx/tags/list` gives `("library/nginx", "tags/list")`, and
/// `a/b/blobs/uploads/<uuid>` gives `("a/b", "uploads/<uuid>")`. Paths that
/// match no known endpoint shape treat the last segment as the endpoint.
pub fn split_repository_path(path: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = path.split('/').collect();
    let n = segments.len();
    if n < 2 {
        return None;
    }

    // Upload sessions: <name>/blobs/uploads/ or <name>/blobs/uploads/<uuid>
    for uploads_at in [n - 1, n - 2] {
        if uploads_at >= 2
            && segments[uploads_at] == "uploads"
            && segments[uploads_at - 1] == "blobs"
        {
            return Some((
                segments[..uploads_at - 1].join("/"),
                segments[uploads_at..].join("/"),
            ));
        }
    }

    if n >= 3 && ENDPOINT_SEGMENTS.contains(&segments[n - 2]) {
        return Some((segments[..n - 2].join("/"), segments[n - 2..].join("/")));
    }

    Some((segments[..n - 1].join("/"), segments[n - 1].to_string()))
}

/// Action implied by an endpoint and method
pub fn action_for(endpoint: &str, method: &Method) -> &'static str {
    let is = |name: &str| endpoint == name || endpoint.starts_with(&format!("{}/", name));

    if is("tags") {
        "pull"
    } else if endpoint.starts_with("manifests/") {
        match *method {
            Method::PUT => "push",
            Method::DELETE => "delete",
            _ => "pull",
        }
    } else if endpoint.starts_with("blobs/") {
        match *method {
            Method::DELETE => "delete",
            _ => "pull",
        }
    } else if is("uploads") {
        "push"
    } else {
        "pull"
    }
}

/// Scope for a request path (with or without the `/v2/` prefix), if any
pub fn scope_for(method: &Method, path: &str) -> Option<String> {
    let path = path.strip_prefix("/v2/").unwrap_or(path);

    if path == "_catalog" {
        return Some("registry:catalog:*".to_string());
    }

    let (name, endpoint) = split_repository_path(path)?;
    if name.is_empty() {
        return None;
    }
    Some(format!(
        "repository:{}:{}",
        name,
        action_for(&endpoint, method)
    ))
}
