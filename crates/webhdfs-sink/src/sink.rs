// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::accumulator::{Accumulator, FlushReport};
use crate::config::SinkConfig;
use crate::errors::SinkError;
use crate::record::{FormatEncoder, JsonEncoder, Record, RecordEncoder};
use crate::store::RemoteStore;
use crate::template::Template;
use crate::webhdfs::WebHdfsClient;
use crate::writer::{BatchWriter, RetryStrategy};

/// Decides whether a record is handled by this sink.
pub type Admission = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

#[must_use]
pub fn accept_all() -> Admission {
    Arc::new(|_: &Record| true)
}

/// Entry point for producers: buffers records and ships them to WebHDFS.
pub struct WebHdfsSink {
    accumulator: Arc<Accumulator<BatchWriter>>,
    encoder: Arc<dyn RecordEncoder>,
    admission: Admission,
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
    // read by submissions for their whole admission, written once by shutdown
    closed: RwLock<bool>,
}

impl WebHdfsSink {
    /// Connects to the namenode described by `config` and starts the idle
    /// flush timer. Fails when the `LISTSTATUS /` probe fails.
    pub async fn start(config: SinkConfig) -> Result<Self, SinkError> {
        config.validate()?;
        let store = Arc::new(WebHdfsClient::new(&config)?);
        Self::start_with_store(config, store, accept_all()).await
    }

    pub async fn start_with_store(
        config: SinkConfig,
        store: Arc<dyn RemoteStore>,
        admission: Admission,
    ) -> Result<Self, SinkError> {
        config.validate()?;

        if let Err(source) = store.list("/").await {
            error!(
                "WEBHDFS | Check of WebHDFS server failed (namenode: {}): {source}",
                store.endpoint()
            );
            return Err(SinkError::HealthCheck {
                endpoint: store.endpoint(),
                source,
            });
        }

        let encoder: Arc<dyn RecordEncoder> = match &config.message_format {
            Some(format) => Arc::new(FormatEncoder::new(format)),
            None => Arc::new(JsonEncoder {
                remove_at_timestamp: config.remove_at_timestamp,
            }),
        };

        let writer = BatchWriter::new(
            Arc::clone(&store),
            Template::parse(&config.path),
            config.framing(),
            RetryStrategy::from_config(&config),
        );
        let accumulator = Arc::new(Accumulator::new(
            Arc::new(writer),
            config.flush_size,
            config.idle_flush_interval(),
        ));

        let cancel = CancellationToken::new();
        let timer = tokio::spawn(Arc::clone(&accumulator).run_idle_flush(cancel.clone()));

        info!(
            "WEBHDFS | Sink started (namenode: {}, path: {}, compression: {})",
            store.endpoint(),
            config.path,
            config.compression
        );

        Ok(Self {
            accumulator,
            encoder,
            admission,
            cancel,
            timer: Mutex::new(Some(timer)),
            closed: RwLock::new(false),
        })
    }

    /// Admits `record` unless the admission check rejects it. Returns the
    /// report of the flush this record triggered, if any.
    pub async fn submit(&self, record: Record) -> Result<Option<FlushReport>, SinkError> {
        let closed = self.closed.read().await;
        if *closed {
            return Err(SinkError::AlreadyShutdown);
        }
        if !(self.admission)(&record) {
            debug!("WEBHDFS | Record rejected by admission check");
            return Ok(None);
        }
        Ok(self.accumulator.admit(record).await)
    }

    /// Encodes `fields` with the configured encoder and submits the result.
    pub async fn submit_fields(
        &self,
        fields: Map<String, Value>,
    ) -> Result<Option<FlushReport>, SinkError> {
        let record = Record::encoded(fields, self.encoder.as_ref());
        self.submit(record).await
    }

    /// Parses a JSON object line into a record and submits it. Lines that
    /// are not JSON objects are logged and skipped.
    pub async fn submit_json_line(&self, line: &str) -> Result<Option<FlushReport>, SinkError> {
        match Record::from_json_line(line, self.encoder.as_ref()) {
            Ok(record) => self.submit(record).await,
            Err(e) => {
                error!("WEBHDFS | Skipping malformed record: {e}");
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.accumulator.pending_len()
    }

    /// Stops the idle timer and flushes what is still buffered. Waits for
    /// submissions already in progress; later ones are rejected.
    pub async fn shutdown(&self) -> Result<Option<FlushReport>, SinkError> {
        {
            let mut closed = self.closed.write().await;
            if *closed {
                return Err(SinkError::AlreadyShutdown);
            }
            *closed = true;
        }
        self.cancel.cancel();
        if let Some(timer) = self.timer.lock().await.take() {
            if let Err(e) = timer.await {
                error!("WEBHDFS | Idle flush task failed: {e}");
            }
        }
        let report = self.accumulator.drain().await;
        info!("WEBHDFS | Sink shut down");
        Ok(report)
    }
}
