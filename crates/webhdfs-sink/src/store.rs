// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::StoreError;

/// The three remote operations the writer relies on.
///
/// `append` must report a missing target as [`StoreError::NotFound`] so the
/// caller can fall back to `create`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap existence probe, only used as a startup health check.
    async fn list(&self, path: &str) -> Result<(), StoreError>;

    async fn append(&self, path: &str, data: Bytes) -> Result<(), StoreError>;

    async fn create(&self, path: &str, data: Bytes) -> Result<(), StoreError>;

    /// Human readable location used in log lines.
    fn endpoint(&self) -> String;
}
