// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Append-with-create-fallback commits to the remote store.
//!
//! For every destination path of a flush the writer appends the framed
//! payload; a missing file is created instead (with the framing header when
//! the format has one). Other failures are retried with linear backoff and
//! finally reported as lost without stopping the sink. Re-appending after a
//! crash may duplicate data: delivery is at-least-once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::accumulator::{group_by_path, FlushHandler, FlushReport};
use crate::config::SinkConfig;
use crate::errors::WriteError;
use crate::framing::Framing;
use crate::record::Record;
use crate::store::RemoteStore;
use crate::template::Template;

pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type SleepFn = Arc<dyn Fn(Duration) -> SleepFuture + Send + Sync>;

/// Backoff used by default: a tokio timer.
#[must_use]
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|delay: Duration| -> SleepFuture { Box::pin(tokio::time::sleep(delay)) })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Single attempt
    Never,
    /// Up to `attempts` tries, sleeping `interval * n` after the n-th failure
    LinearBackoff { attempts: u32, interval: Duration },
}

impl RetryStrategy {
    #[must_use]
    pub fn from_config(config: &SinkConfig) -> Self {
        if config.retry_known_errors {
            RetryStrategy::LinearBackoff {
                attempts: config.retry_times.max(1),
                interval: config.retry_interval_duration(),
            }
        } else {
            RetryStrategy::Never
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryStrategy::Never => 1,
            RetryStrategy::LinearBackoff { attempts, .. } => (*attempts).max(1),
        }
    }

    /// Delay after the `attempt`-th failed try (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Never => Duration::ZERO,
            RetryStrategy::LinearBackoff { interval, .. } => interval.saturating_mul(attempt),
        }
    }
}

pub struct BatchWriter {
    store: Arc<dyn RemoteStore>,
    template: Template,
    framing: Framing,
    retry: RetryStrategy,
    sleep: SleepFn,
    // one flush cycle at a time, so per-path appends keep cycle order
    cycle: Mutex<()>,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        template: Template,
        framing: Framing,
        retry: RetryStrategy,
    ) -> Self {
        Self {
            store,
            template,
            framing,
            retry,
            sleep: tokio_sleep(),
            cycle: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    /// Groups, frames and commits one batch. Paths are committed
    /// concurrently; each path is written by exactly one task.
    pub async fn write_batch(&self, records: Vec<Record>) -> FlushReport {
        let mut report = FlushReport {
            records: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return report;
        }

        let _cycle = self.cycle.lock().await;
        let grouped = group_by_path(&records, &self.template, Utc::now());
        drop(records);
        report.paths = grouped.len();

        let commits = grouped.into_groups().into_iter().map(|(path, raw)| async move {
            let path = format!("{path}{}", self.framing.path_suffix());
            let payload = self.framing.encode(&raw).map_err(|source| WriteError::Encode {
                path: path.clone(),
                source,
            })?;
            let len = payload.len();
            self.commit(&path, Bytes::from(payload)).await.map(|()| len)
        });

        for result in join_all(commits).await {
            match result {
                Ok(len) => report.bytes += len,
                Err(e) => {
                    error!("WEBHDFS | Data dropped: {e}");
                    report.lost_paths.push(e.path().to_string());
                }
            }
        }

        if report.is_complete() {
            debug!(
                "WEBHDFS | Flushed {} records to {} paths ({} bytes)",
                report.records, report.paths, report.bytes
            );
        } else {
            error!(
                "WEBHDFS | Flush lost data for {} of {} paths",
                report.lost_paths.len(),
                report.paths
            );
        }
        report
    }

    /// Appends `payload` to `path`, creating the file if it does not exist.
    pub async fn commit(&self, path: &str, payload: Bytes) -> Result<(), WriteError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.store.append(path, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.is_not_found() {
                return self.create(path, &payload).await;
            }

            if attempt >= max_attempts {
                error!("WEBHDFS | Max write retries reached for {path}. Exception: {err}");
                return Err(WriteError::RetriesExhausted {
                    path: path.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.retry.delay(attempt);
            warn!(
                "WEBHDFS | Retrying write to {path} in {} ms (attempt {attempt}/{max_attempts}): {err}. Maybe increase retry_interval or reduce the number of writers.",
                delay.as_millis()
            );
            (self.sleep)(delay).await;
        }
    }

    async fn create(&self, path: &str, payload: &Bytes) -> Result<(), WriteError> {
        let header = self.framing.create_header();
        let data = if header.is_empty() {
            payload.clone()
        } else {
            let mut data = BytesMut::with_capacity(header.len() + payload.len());
            data.extend_from_slice(header);
            data.extend_from_slice(payload);
            data.freeze()
        };
        debug!("WEBHDFS | {path} does not exist, creating it");
        self.store
            .create(path, data)
            .await
            .map_err(|source| WriteError::Create {
                path: path.to_string(),
                source,
            })
    }
}

#[async_trait]
impl FlushHandler for BatchWriter {
    async fn flush(&self, records: Vec<Record>) -> FlushReport {
        self.write_batch(records).await
    }
}
