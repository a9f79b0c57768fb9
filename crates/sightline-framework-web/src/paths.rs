pub const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

pub(crate) fn is_http_method(method: &str) -> bool {
    HTTP_METHODS.contains(&method)
}

/// Joins a base route and a handler route with exactly one `/` between them.
pub fn join_paths(base: Option<&str>, path: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(base) = base {
        out.push_str(base.trim());
    }
    if let Some(path) = path {
        let path = path.trim();
        if !path.is_empty() {
            if !out.ends_with('/') && !path.starts_with('/') {
                out.push('/');
            }
            if out.ends_with('/') && path.starts_with('/') {
                out.pop();
            }
            out.push_str(path);
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else if !out.starts_with('/') {
        format!("/{out}")
    } else {
        out
    }
}

/// Cartesian product of base routes and handler routes; an empty list means "no route".
pub(crate) fn combine_routes(bases: &[String], paths: &[String]) -> Vec<String> {
    let bases: Vec<Option<&str>> = if bases.is_empty() {
        vec![None]
    } else {
        bases.iter().map(|p| Some(p.as_str())).collect()
    };
    let paths: Vec<Option<&str>> = if paths.is_empty() {
        vec![None]
    } else {
        paths.iter().map(|p| Some(p.as_str())).collect()
    };
    let mut out = Vec::new();
    for base in &bases {
        for path in &paths {
            let joined = join_paths(*base, *path);
            if !out.contains(&joined) {
                out.push(joined);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_single_separator() {
        assert_eq!(join_paths(Some("/api/"), Some("/x")), "/api/x");
        assert_eq!(join_paths(Some("api"), Some("x")), "/api/x");
        assert_eq!(join_paths(None, Some("x")), "/x");
        assert_eq!(join_paths(Some("/api"), None), "/api");
        assert_eq!(join_paths(None, None), "/");
    }

    #[test]
    fn combines_every_base_with_every_path() {
        let bases = vec!["/a".to_string(), "/b".to_string()];
        let paths = vec!["/x".to_string()];
        assert_eq!(combine_routes(&bases, &paths), vec!["/a/x", "/b/x"]);
        assert_eq!(combine_routes(&[], &[]), vec!["/"]);
    }
}
