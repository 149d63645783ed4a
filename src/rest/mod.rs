//! REST side channel
//!
//! The service also answers plain HTTPS requests on the same host as the
//! real-time endpoint. Only the address book is used here.

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{Credential, Endpoint};
use crate::utils::{ClientError, Result};

pub const ADDRESS_BOOK_PATH: &str = "addressbook";

/// Maps a real-time base URL onto its REST counterpart and appends `path`.
pub fn rest_url(base_url: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
    let joined = format!("{}/{path}", url.path().trim_end_matches('/'));
    url.set_path(&joined);
    url.set_query(None);
    Ok(url)
}

/// `GET {endpoint}/addressbook` with basic auth; returns the JSON document.
pub async fn fetch_address_book(endpoint: &Endpoint, credential: &Credential) -> Result<Value> {
    let url = rest_url(&endpoint.base_url, ADDRESS_BOOK_PATH)?;
    debug!("fetching {url}");

    let response = reqwest::Client::new()
        .get(url)
        .basic_auth(&credential.username, Some(&credential.password))
        .send()
        .await?
        .error_for_status()?;

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests;
