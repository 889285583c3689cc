// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered batch writer that ships records to HDFS through WebHDFS or HttpFS.
//!
//! Records are buffered by an [`accumulator::Accumulator`] until either
//! `flush_size` records are pending or `idle_flush_time` has passed. Each
//! flush groups the records by their resolved destination path, frames every
//! group with the configured codec and appends it to the remote file,
//! creating the file on first write. See [`sink::WebHdfsSink`] for the
//! producer-facing API.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod accumulator;
pub mod config;
pub mod errors;
pub mod framing;
pub mod http;
pub mod record;
pub mod sink;
pub mod store;
pub mod template;
pub mod webhdfs;
pub mod writer;

pub use config::SinkConfig;
pub use errors::{ConfigError, SinkError, StoreError, WriteError};
pub use record::Record;
pub use sink::WebHdfsSink;
