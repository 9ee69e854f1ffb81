//! Bearer-token guard for the protected route group.
//!
//! The expected token digest is resolved once at startup from the env
//! var named by `server.api_token_env` (see [`AppState::build`]); when
//! none is configured the gateway runs open (dev mode). Verification
//! itself lives on [`AppState::bearer_token_matches`].

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::api_error;
use crate::state::AppState;

/// Middleware attached to every protected route via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.bearer_token_matches(bearer_of(&req)) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid or missing API token");
    }
    next.run(req).await
}

fn bearer_of(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_of(&req), Some("abc123"));

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_of(&req), None);

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_of(&req), None);
    }
}
