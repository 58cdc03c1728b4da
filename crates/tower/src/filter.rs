// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use http::request::Parts;

/// Paths skipped by [`Filter::health_check`]
pub const HEALTH_CHECK_PATHS: [&str; 6] = [
    "/health", "/healthz", "/ping", "/ready", "/live", "/metrics",
];

/// A predicate deciding whether a request gets traced.
///
/// Returning `false` lets the request through to the inner handler untouched:
/// no span is started and the response is not observed.
#[derive(Clone)]
pub struct Filter(Arc<dyn Fn(&Parts) -> bool + Send + Sync>);

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter").finish_non_exhaustive()
    }
}

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Whether the request should be traced
    #[must_use]
    pub fn should_trace(&self, request: &Parts) -> bool {
        (self.0)(request)
    }

    /// Skip the usual operational endpoints, see [`HEALTH_CHECK_PATHS`].
    ///
    /// Paths are matched exactly, so `/health/db` is still traced.
    #[must_use]
    pub fn health_check() -> Self {
        Self::new(|request| !HEALTH_CHECK_PATHS.contains(&request.uri.path()))
    }

    /// Skip requests whose path starts with `prefix`
    #[must_use]
    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |request| !request.uri.path().starts_with(prefix.as_str()))
    }

    /// Skip requests whose path ends with `suffix`
    #[must_use]
    pub fn path_suffix(suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self::new(move |request| !request.uri.path().ends_with(suffix.as_str()))
    }

    /// Trace only the requests all the given filters agree to trace.
    ///
    /// Evaluation stops at the first filter returning `false`. With no filters,
    /// every request is traced.
    #[must_use]
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        let filters: Vec<Filter> = filters.into_iter().collect();
        Self::new(move |request| filters.iter().all(|filter| filter.should_trace(request)))
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request};

    use super::*;

    fn parts(method: Method, uri: &str) -> Parts {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_health_check() {
        let filter = Filter::health_check();
        for path in HEALTH_CHECK_PATHS {
            assert!(!filter.should_trace(&parts(Method::GET, path)), "{path}");
        }

        assert!(filter.should_trace(&parts(Method::GET, "/api/users")));
        assert!(filter.should_trace(&parts(Method::GET, "/health/db")));
        assert!(filter.should_trace(&parts(Method::GET, "/")));
    }

    #[test]
    fn test_path_prefix_and_suffix() {
        let prefix = Filter::path_prefix("/static/");
        assert!(!prefix.should_trace(&parts(Method::GET, "/static/app.js")));
        assert!(prefix.should_trace(&parts(Method::GET, "/api/static/app.js")));

        let suffix = Filter::path_suffix(".css");
        assert!(!suffix.should_trace(&parts(Method::GET, "/assets/site.css")));
        // The query string is not part of the path
        assert!(suffix.should_trace(&parts(Method::GET, "/assets/site.js?v=.css")));
    }

    #[test]
    fn test_all() {
        let filter = Filter::all([Filter::health_check(), Filter::path_prefix("/internal")]);
        assert!(!filter.should_trace(&parts(Method::GET, "/healthz")));
        assert!(!filter.should_trace(&parts(Method::GET, "/internal/debug")));
        assert!(filter.should_trace(&parts(Method::POST, "/api/users")));

        let empty = Filter::all([]);
        assert!(empty.should_trace(&parts(Method::GET, "/healthz")));
    }

    #[test]
    fn test_all_short_circuits() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counting = {
            let calls = Arc::clone(&calls);
            Filter::new(move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
                true
            })
        };

        let filter = Filter::all([Filter::new(|_| false), counting]);
        assert!(!filter.should_trace(&parts(Method::GET, "/")));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
