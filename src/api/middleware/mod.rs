pub mod bearer;

use http::header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue};
use http::{HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub type MiddlewareResult<T> = core::result::Result<T, MiddlewareErr>;

#[derive(Debug, Error)]
pub enum MiddlewareErr {
    #[error("invalid CORS origin ({0})")]
    InvalidOrigin(#[from] InvalidHeaderValue),
}

/// `*` anywhere in `origins` allows any origin, otherwise only the listed ones.
pub fn cors(origins: &[String]) -> MiddlewareResult<CorsLayer> {
    let allowed = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let list = origins
            .iter()
            .map(|o| HeaderValue::from_str(o.trim_end_matches('/')))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(list)
    };

    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_origin(allowed))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cors_origins() {
        assert!(cors(&["*".into()]).is_ok());
        assert!(cors(&[]).is_ok());
        assert!(cors(&["https://quiz.example.com".into(), "http://localhost:3000/".into()]).is_ok());
        assert!(matches!(
            cors(&["bad\norigin".into()]),
            Err(MiddlewareErr::InvalidOrigin(_))
        ));
    }
}
