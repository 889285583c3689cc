// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record buffering with count and idle-time flush triggers.
//!
//! The buffer lives behind a mutex that is only held to push a record or to
//! swap the whole pending batch out; the flush itself (path resolution,
//! encoding, network I/O) runs after the lock is released, so admissions
//! keep flowing while a batch is being written.
//!
//! Swapping a batch out and flushing it both happen under a second, async
//! lock. Batches therefore reach the handler in the order they were taken.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use tokio::sync::Mutex as FlushOrder;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::record::Record;
use crate::template::Template;

/// Summary of one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub records: usize,
    pub paths: usize,
    pub bytes: usize,
    /// Destination paths whose data was dropped in this cycle
    pub lost_paths: Vec<String>,
}

impl FlushReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.lost_paths.is_empty()
    }
}

/// Receives every batch taken out of the accumulator.
#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn flush(&self, records: Vec<Record>) -> FlushReport;
}

/// Concatenated payloads keyed by destination path, in first-seen order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GroupedPayload {
    index: HashMap<String, usize>,
    groups: Vec<(String, Vec<u8>)>,
}

impl GroupedPayload {
    /// Appends `payload` to the group for `path`, adding a trailing newline
    /// unless the payload already ends with one.
    pub fn push(&mut self, path: String, payload: &[u8]) {
        let slot = match self.index.get(&path) {
            Some(&slot) => slot,
            None => {
                self.index.insert(path.clone(), self.groups.len());
                self.groups.push((path, Vec::new()));
                self.groups.len() - 1
            }
        };
        let buffer = &mut self.groups[slot].1;
        buffer.extend_from_slice(payload);
        if !payload.ends_with(b"\n") {
            buffer.push(b'\n');
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.index
            .get(path)
            .map(|&slot| self.groups[slot].1.as_slice())
    }

    pub fn into_groups(self) -> Vec<(String, Vec<u8>)> {
        self.groups
    }
}

/// Resolves each record's destination and folds the batch into one payload
/// per path, keeping arrival order within a path.
#[must_use]
pub fn group_by_path(
    records: &[Record],
    template: &Template,
    flush_time: DateTime<Utc>,
) -> GroupedPayload {
    let mut grouped = GroupedPayload::default();
    for record in records {
        grouped.push(template.resolve(record, flush_time), record.payload());
    }
    grouped
}

struct Pending {
    records: Vec<Record>,
    last_flush: Instant,
}

pub struct Accumulator<H: FlushHandler> {
    pending: Mutex<Pending>,
    flush_order: FlushOrder<()>,
    handler: Arc<H>,
    flush_size: usize,
    idle_flush_time: Duration,
}

impl<H: FlushHandler> Accumulator<H> {
    pub fn new(handler: Arc<H>, flush_size: usize, idle_flush_time: Duration) -> Self {
        Self {
            pending: Mutex::new(Pending {
                records: Vec::with_capacity(flush_size),
                last_flush: Instant::now(),
            }),
            flush_order: FlushOrder::new(()),
            handler,
            flush_size: flush_size.max(1),
            idle_flush_time,
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().records.len()
    }

    /// Buffers `record`; reaching `flush_size` flushes the whole buffer.
    pub async fn admit(&self, record: Record) -> Option<FlushReport> {
        {
            let mut pending = self.lock();
            pending.records.push(record);
            if pending.records.len() < self.flush_size {
                return None;
            }
        }

        let _order = self.flush_order.lock().await;
        let records = {
            let mut pending = self.lock();
            // an earlier flush may have taken the buffer while we queued
            if pending.records.len() < self.flush_size {
                return None;
            }
            self.take(&mut pending)
        };
        Some(self.handler.flush(records).await)
    }

    /// Flushes when `idle_flush_time` has passed since the last flush. An
    /// empty buffer only restarts the idle window.
    pub async fn tick(&self) -> Option<FlushReport> {
        let _order = self.flush_order.lock().await;
        let batch = {
            let mut pending = self.lock();
            if pending.last_flush.elapsed() < self.idle_flush_time {
                None
            } else if pending.records.is_empty() {
                pending.last_flush = Instant::now();
                None
            } else {
                Some(self.take(&mut pending))
            }
        };
        match batch {
            Some(records) => {
                debug!("WEBHDFS | Idle flush of {} records", records.len());
                Some(self.handler.flush(records).await)
            }
            None => None,
        }
    }

    /// Flushes whatever is buffered, used on shutdown.
    pub async fn drain(&self) -> Option<FlushReport> {
        let _order = self.flush_order.lock().await;
        let records = {
            let mut pending = self.lock();
            if pending.records.is_empty() {
                return None;
            }
            self.take(&mut pending)
        };
        debug!("WEBHDFS | Draining {} records", records.len());
        Some(self.handler.flush(records).await)
    }

    /// Runs the idle-flush timer until `cancel` fires.
    pub async fn run_idle_flush(self: Arc<Self>, cancel: CancellationToken) {
        debug!("WEBHDFS | Idle flush timer started");
        loop {
            let deadline = self.lock().last_flush + self.idle_flush_time;
            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep_until(deadline) => {
                    self.tick().await;
                }
            }
        }
        debug!("WEBHDFS | Idle flush timer stopped");
    }

    fn take(&self, pending: &mut Pending) -> Vec<Record> {
        pending.last_flush = Instant::now();
        std::mem::replace(&mut pending.records, Vec::with_capacity(self.flush_size))
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().expect("lock poisoned")
    }
}
