//! Fragment bounce.
//!
//! Some IdPs return to the sign-in URL with the parameters in the URL
//! fragment, which never reaches the server. A bare `GET` therefore gets a tiny
//! page that moves `location.hash` into the query string and reloads. A `POST`
//! with neither a query nor a form body gets the same page.

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderValue, Method, header::CACHE_CONTROL},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use tracing::debug;

/// Matches the default body limit of the axum `Form` extractor.
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

pub const BOUNCE_PAGE: &str = r"<!DOCTYPE html>
<html>
<head>
<meta charset='utf-8'>
<script>
(function () {
    var here = window.location;
    var fragment = here.hash.substring(1);
    var target = here.pathname + here.search;
    if (fragment.length !== 0) {
        var glue = here.search.length > 1 ? '&' : '?';
        target = here.pathname + (here.search === '?' ? '' : here.search) + glue + fragment;
    }
    if (target === here.pathname) {
        target = '/';
    }
    window.location.replace(target);
})();
</script>
</head>
<body></body>
</html>
";

pub async fn promote_fragment(request: Request, next: Next) -> Response {
    let no_query = request
        .uri()
        .query()
        .is_none_or(|query| query.trim().is_empty());

    if no_query && request.method() == Method::GET {
        return bounce_page();
    }

    if no_query && request.method() == Method::POST {
        let (parts, body) = request.into_parts();
        let body = match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => return bounce_page(),
            Ok(bytes) => Body::from(bytes),
            Err(err) => {
                // The handler sees an empty form and degrades like any other
                // unparseable sign-in.
                debug!(error = %err, "unreadable sign-in form body");
                Body::empty()
            }
        };
        return next.run(Request::from_parts(parts, body)).await;
    }

    next.run(request).await
}

fn bounce_page() -> Response {
    let mut response = Html(BOUNCE_PAGE).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
