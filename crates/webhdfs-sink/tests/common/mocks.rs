// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory remote store with failure injection

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use webhdfs_sink::store::RemoteStore;
use webhdfs_sink::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum StoreCall {
    List(String),
    Append(String, usize),
    Create(String, usize),
}

#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<StoreCall>>,
    /// Every append fails with a lease conflict while set
    pub failing: std::sync::atomic::AtomicBool,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn file_string(&self, path: &str) -> Option<String> {
        self.file(path).map(|f| String::from_utf8(f).unwrap())
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Append or create calls that reached the store
    pub fn writes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, StoreCall::List(_)))
            .count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, path: &str) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::List(path.to_string()));
        Ok(())
    }

    async fn append(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Append(path.to_string(), data.len()));
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Remote {
                status: StatusCode::FORBIDDEN,
                exception: "AlreadyBeingCreatedException".to_string(),
                message: format!("failed to append {path}"),
            });
        }
        match self.files.lock().unwrap().get_mut(path) {
            Some(file) => {
                file.extend_from_slice(&data);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn create(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Create(path.to_string(), data.len()));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn endpoint(&self) -> String {
        "memory:50070".to_string()
    }
}
