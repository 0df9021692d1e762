use std::collections::HashMap;

/// Binding of an inbound route template to a dependency.
///
/// Templates use axum's `{param}` syntax. Parameters captured from the
/// inbound path are substituted into `upstream` by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    /// Inbound template, e.g. `/api/origamis/{id}`.
    pub template: String,
    /// Dependency name the route forwards to.
    pub dependency: String,
    /// Upstream path template, e.g. `/api/origamis/{id}`.
    pub upstream: String,
}

impl ProxyRoute {
    pub fn new(template: &str, dependency: &str, upstream: &str) -> Self {
        Self {
            template: template.to_string(),
            dependency: dependency.to_string(),
            upstream: upstream.to_string(),
        }
    }

    /// The route table used when none is configured.
    pub fn defaults() -> Vec<ProxyRoute> {
        // ---
        vec![
            ProxyRoute::new("/api/products", "catalogue", "/api/products"),
            ProxyRoute::new("/api/origamis", "voting", "/api/origamis"),
            ProxyRoute::new("/api/origamis/{id}", "voting", "/api/origamis/{id}"),
            ProxyRoute::new("/daily-origami", "recommendation", "/api/origami-of-the-day"),
        ]
    }

    /// Parses one `template=dependency[:upstream]` entry.
    ///
    /// Without an explicit upstream the inbound template is reused.
    pub fn parse(entry: &str) -> Option<ProxyRoute> {
        // ---
        let (template, target) = entry.trim().split_once('=')?;
        let template = template.trim();
        if !template.starts_with('/') {
            return None;
        }

        let (dependency, upstream) = match target.split_once(':') {
            Some((dependency, upstream)) => (dependency.trim(), upstream.trim()),
            None => (target.trim(), template),
        };
        if dependency.is_empty() || !upstream.starts_with('/') {
            return None;
        }

        Some(ProxyRoute::new(template, dependency, upstream))
    }

    /// Builds the upstream path and query for one inbound request.
    ///
    /// Parameters arrive percent-decoded, so each value is re-encoded as a
    /// single path segment: a value can never add segments, a query or a
    /// fragment to the upstream path. Returns `None` for `.` and `..`, which
    /// would otherwise be resolved as dot segments.
    pub fn upstream_path(
        &self,
        params: &HashMap<String, String>,
        query: Option<&str>,
    ) -> Option<String> {
        // ---
        if params.values().any(|value| value == "." || value == "..") {
            return None;
        }

        let mut path = self.upstream.clone();
        for (name, value) in params {
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }

        let path = match query {
            Some(query) if !query.is_empty() => format!("{path}?{query}"),
            _ => path,
        };
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn parse_with_and_without_upstream() {
        // ---
        assert_eq!(
            ProxyRoute::parse("/api/products=catalogue"),
            Some(ProxyRoute::new("/api/products", "catalogue", "/api/products"))
        );
        assert_eq!(
            ProxyRoute::parse(" /daily-origami = recommendation:/api/origami-of-the-day "),
            Some(ProxyRoute::new(
                "/daily-origami",
                "recommendation",
                "/api/origami-of-the-day"
            ))
        );
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        // ---
        assert_eq!(ProxyRoute::parse("api/products=catalogue"), None);
        assert_eq!(ProxyRoute::parse("/api/products"), None);
        assert_eq!(ProxyRoute::parse("/api/products="), None);
        assert_eq!(ProxyRoute::parse("/api/products=catalogue:products"), None);
    }

    #[test]
    fn upstream_path_substitutes_params_and_query() {
        // ---
        let route = ProxyRoute::new("/api/origamis/{id}", "voting", "/api/origamis/{id}");
        let params = HashMap::from([("id".to_string(), "42".to_string())]);

        assert_eq!(
            route.upstream_path(&params, None).as_deref(),
            Some("/api/origamis/42")
        );
        assert_eq!(
            route.upstream_path(&params, Some("vote=up")).as_deref(),
            Some("/api/origamis/42?vote=up")
        );
        assert_eq!(
            route.upstream_path(&params, Some("")).as_deref(),
            Some("/api/origamis/42")
        );
    }

    #[test]
    fn upstream_path_keeps_each_param_in_one_segment() {
        // ---
        let route = ProxyRoute::new("/api/origamis/{id}", "voting", "/api/origamis/{id}");
        let with = |value: &str| {
            let params = HashMap::from([("id".to_string(), value.to_string())]);
            route.upstream_path(&params, None)
        };

        assert_eq!(
            with("../../admin/secrets").as_deref(),
            Some("/api/origamis/..%2F..%2Fadmin%2Fsecrets")
        );
        assert_eq!(
            with("1?drop=all").as_deref(),
            Some("/api/origamis/1%3Fdrop%3Dall")
        );
        assert_eq!(with("1#frag").as_deref(), Some("/api/origamis/1%23frag"));
        assert_eq!(with("{id}").as_deref(), Some("/api/origamis/%7Bid%7D"));
        assert_eq!(with(".."), None);
        assert_eq!(with("."), None);
    }
}
