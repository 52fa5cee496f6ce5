//! Shared plumbing for the REST provisioning adapters.

use crate::controller::error::ConnectorError;
use crate::observability::metrics;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// HTTP client with the adapter timeout applied to every request
///
/// # Errors
///
/// Fails if the TLS backend cannot be initialised.
pub fn client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// `base` with `segments` appended, each percent-encoded as one path segment
///
/// # Errors
///
/// `InfrastructureProblem` if `base` is not an absolute URL.
pub fn endpoint(
    service: &'static str,
    base: &str,
    segments: &[&str],
) -> Result<Url, ConnectorError> {
    let mut url = Url::parse(base).map_err(|e| {
        ConnectorError::infrastructure(service, format!("invalid API url `{base}`: {e}"))
    })?;
    url.path_segments_mut()
        .map_err(|()| {
            ConnectorError::infrastructure(service, format!("API url `{base}` cannot be a base"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Send and decode the JSON body; 404 reads as `None`
///
/// # Errors
///
/// `InfrastructureProblem` for transport errors, other non-success statuses
/// and undecodable bodies.
pub async fn fetch_optional<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
) -> Result<Option<T>, ConnectorError> {
    let response = send(service, request).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let response = check_status(service, response).await?;
    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| ConnectorError::infrastructure(service, e))
}

/// Send and decode the JSON body of a required response
///
/// # Errors
///
/// As [`fetch_optional`], plus `InfrastructureProblem` on 404.
pub async fn fetch<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
) -> Result<T, ConnectorError> {
    let response = send(service, request).await?;
    let response = check_status(service, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ConnectorError::infrastructure(service, e))
}

/// Send and discard the body
///
/// # Errors
///
/// `InfrastructureProblem` for transport errors and non-success statuses.
pub async fn execute(service: &'static str, request: RequestBuilder) -> Result<(), ConnectorError> {
    let response = send(service, request).await?;
    check_status(service, response).await?;
    Ok(())
}

/// Send the request and record its latency by origin, method and status
async fn send(service: &'static str, request: RequestBuilder) -> Result<Response, ConnectorError> {
    let (client, request) = request.build_split();
    let request = request.map_err(|e| ConnectorError::infrastructure(service, e))?;
    let uri = format!("{}/", request.url().origin().ascii_serialization());
    let method = request.method().to_string();

    let started = Instant::now();
    let result = client.execute(request).await;
    let seconds = started.elapsed().as_secs_f64();

    let (status_code, exception) = match &result {
        Ok(response) => (Some(response.status().as_u16()), None),
        Err(e) => (None, Some(exception_name(e))),
    };
    metrics::observe_client_request(&uri, &method, status_code, exception, seconds);
    result.map_err(|e| ConnectorError::infrastructure(service, e))
}

fn exception_name(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "TimeoutError"
    } else if error.is_connect() {
        "ConnectError"
    } else if error.is_redirect() {
        "RedirectError"
    } else {
        "RequestError"
    }
}

async fn check_status(
    service: &'static str,
    response: Response,
) -> Result<Response, ConnectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::infrastructure(
        service,
        format!("API call {} returned {status}: {body}", url.path()),
    ))
}
