//! The HTTP plumbing shared by the remote backends.

use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

pub fn client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::unavailable(format!("cannot build HTTP client: {e}")))
}

/// Send a request, turning transport failures and credential, rate limit
/// and server errors into `SourceUnavailable`. Other statuses are left for
/// the caller.
pub async fn send(req: RequestBuilder) -> Result<Response> {
    let res = req.send().await.map_err(|e| {
        let reason = if e.is_timeout() {
            "request timed out"
        } else if e.is_connect() {
            "cannot connect"
        } else {
            "request failed"
        };
        Error::unavailable(format!("{reason}: {e}"))
    })?;

    let status = res.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::unavailable(format!("credentials rejected ({status})")));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::unavailable("rate limited by content API"));
    }
    if status.is_server_error() {
        let body = res.text().await.unwrap_or_default();
        return Err(Error::unavailable(format!("content API error {status}: {body}")));
    }
    Ok(res)
}

/// Fail with `SourceUnavailable` on any status that isn't a success.
pub async fn expect_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(Error::unavailable(format!("content API error {status}: {body}")))
}
