// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`RemoteStore`] over the WebHDFS / HttpFS REST API.
//!
//! WebHDFS writes are two requests: the namenode answers the first (bodiless)
//! request with `307 Temporary Redirect` pointing at a datanode, and the data
//! is then sent there. HttpFS gateways accept the data directly when the
//! request carries `data=true`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::SinkConfig;
use crate::errors::{SinkError, StoreError};
use crate::http::get_client;
use crate::store::RemoteStore;

const API_PREFIX: [&str; 2] = ["webhdfs", "v1"];
const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy)]
enum Op {
    ListStatus,
    Append,
    Create,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::ListStatus => "LISTSTATUS",
            Op::Append => "APPEND",
            Op::Create => "CREATE",
        }
    }

    fn method(self) -> Method {
        match self {
            Op::ListStatus => Method::GET,
            Op::Append => Method::POST,
            Op::Create => Method::PUT,
        }
    }
}

#[derive(Deserialize)]
struct RemoteExceptionBody {
    #[serde(rename = "RemoteException")]
    remote_exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    exception: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct WebHdfsClient {
    client: reqwest::Client,
    base_url: Url,
    user: String,
    httpfs: bool,
}

impl WebHdfsClient {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        Self::with_client(
            get_client(config),
            &config.base_url(),
            &config.user,
            config.use_httpfs,
        )
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        user: &str,
        httpfs: bool,
    ) -> Result<Self, SinkError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SinkError::Client(format!("invalid WebHDFS url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SinkError::Client(format!(
                "invalid WebHDFS url '{base_url}'"
            )));
        }
        Ok(Self {
            client,
            base_url,
            user: user.to_string(),
            httpfs,
        })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            let mut parts = path.split('/').filter(|s| !s.is_empty()).peekable();
            segments.pop_if_empty().extend(API_PREFIX);
            if parts.peek().is_none() {
                // root directory keeps its trailing slash
                segments.push("");
            } else {
                segments.extend(parts);
            }
        }
        url
    }

    fn request(&self, op: Op, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(op.method(), self.url(path))
            .query(&[("op", op.as_str()), ("user.name", self.user.as_str())])
    }

    async fn write(&self, op: Op, path: &str, data: Bytes) -> Result<(), StoreError> {
        if self.httpfs {
            let response = self
                .request(op, path)
                .query(&[("data", "true")])
                .header(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM))
                .body(data)
                .send()
                .await?;
            return check(path, response).await;
        }

        let response = self.request(op, path).send().await?;
        let status = response.status();
        if !status.is_redirection() {
            // Some gateways answer the first request directly.
            return check(path, response).await;
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Url::parse(value).ok())
            .ok_or(StoreError::Redirect(status))?;
        trace!("WEBHDFS | {} {path} redirected to {location}", op.as_str());

        let response = self
            .client
            .request(op.method(), location)
            .header(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM))
            .body(data)
            .send()
            .await?;
        check(path, response).await
    }
}

async fn check(path: &str, response: Response) -> Result<(), StoreError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(error_from_response(path, response).await)
}

async fn error_from_response(path: &str, response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let remote = serde_json::from_str::<RemoteExceptionBody>(&body)
        .ok()
        .map(|parsed| parsed.remote_exception);

    let not_found = status == StatusCode::NOT_FOUND
        || remote
            .as_ref()
            .is_some_and(|r| r.exception == "FileNotFoundException");
    if not_found {
        return StoreError::NotFound {
            path: path.to_string(),
        };
    }

    match remote {
        Some(remote) => StoreError::Remote {
            status,
            exception: remote.exception,
            message: remote.message,
        },
        None => StoreError::Remote {
            status,
            exception: "HttpError".to_string(),
            message: body,
        },
    }
}

#[async_trait]
impl RemoteStore for WebHdfsClient {
    async fn list(&self, path: &str) -> Result<(), StoreError> {
        let response = self.request(Op::ListStatus, path).send().await?;
        check(path, response).await
    }

    async fn append(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        debug!("WEBHDFS | Appending {} bytes to {path}", data.len());
        self.write(Op::Append, path, data).await
    }

    async fn create(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        debug!("WEBHDFS | Creating {path} with {} bytes", data.len());
        self.write(Op::Create, path, data).await
    }

    fn endpoint(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            _ => self.base_url.to_string(),
        }
    }
}
