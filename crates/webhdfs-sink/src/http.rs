// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use std::error::Error;

use reqwest::redirect::Policy;
use tracing::error;

use crate::config::SinkConfig;

/// Builds the shared HTTP client. An unusable proxy setting is logged and
/// the client falls back to a direct connection.
#[must_use]
pub fn get_client(config: &SinkConfig) -> reqwest::Client {
    match build_client(
        config.https_proxy.as_deref(),
        config.open_timeout_duration(),
        config.read_timeout_duration(),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "WEBHDFS | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(
                None,
                config.open_timeout_duration(),
                config.read_timeout_duration(),
            ) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "WEBHDFS | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

/// Redirects are never followed automatically: WebHDFS writes are a two-step
/// exchange where the body must only go to the datanode named in `Location`.
pub fn build_client(
    https_proxy: Option<&str>,
    open_timeout: Duration,
    read_timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(open_timeout)
        .timeout(read_timeout)
        .redirect(Policy::none())
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));
    if let Some(proxy) = https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_without_proxy() {
        assert!(build_client(None, Duration::from_secs(1), Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_bad_proxy_falls_back() {
        let config = SinkConfig {
            https_proxy: Some("not a url".to_string()),
            ..Default::default()
        };
        // still returns a usable client
        let _client = get_client(&config);
    }
}
