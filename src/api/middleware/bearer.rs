use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::api::server::RouteError;

/// Access token lifted from `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct BearerToken(pub String);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    Some(token.trim()).filter(|t| !t.is_empty())
}

pub async fn require_bearer(mut req: Request, next: Next) -> Result<Response, RouteError> {
    let token = bearer_token(req.headers())
        .ok_or(RouteError::MissingToken)?
        .to_string();

    req.extensions_mut().insert(BearerToken(token));
    Ok(next.run(req).await)
}
