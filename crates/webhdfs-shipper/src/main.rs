// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use webhdfs_sink::{SinkConfig, WebHdfsSink};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("WEBHDFS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match SinkConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("WEBHDFS | Invalid configuration: {e}");
            return;
        }
    };

    let sink = match WebHdfsSink::start(config).await {
        Ok(sink) => sink,
        Err(e) => {
            error!("WEBHDFS | Unable to start: {e}");
            return;
        }
    };

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(e) = sink.submit_json_line(&line).await {
                        error!("WEBHDFS | Failed to submit record: {e}");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("WEBHDFS | Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("WEBHDFS | Failed to read input: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("WEBHDFS | Interrupted, flushing pending records");
                break;
            }
        }
    }

    match sink.shutdown().await {
        Ok(Some(report)) if !report.is_complete() => {
            error!(
                "WEBHDFS | Final flush lost data for {:?}",
                report.lost_paths
            );
        }
        Ok(_) => {}
        Err(e) => error!("WEBHDFS | Shutdown failed: {e}"),
    }
}
