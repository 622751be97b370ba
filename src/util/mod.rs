pub mod env;
pub mod identity;
pub mod telemetry;

use std::time::Duration;

use crate::util::env::Env;

/// Shared client for every outbound call (identity lookups and the REST store).
pub fn http_client(env: &Env) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(env.http_timeout_secs))
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_http_client_builds() {
        let env = crate::util::env::from_iter::<_, Env>(Vec::<(String, String)>::new()).unwrap();
        assert!(http_client(&env).is_ok());
    }
}
