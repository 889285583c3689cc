// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::io::Read;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use mockito::{Matcher, Server};
use serde_json::{json, Map, Value};

use common::mocks::{MemoryStore, StoreCall};
use webhdfs_sink::framing::{decompress_snappy_stream, Compression};
use webhdfs_sink::sink::accept_all;
use webhdfs_sink::{SinkConfig, WebHdfsSink};

fn config(path: &str, flush_size: usize) -> SinkConfig {
    SinkConfig {
        host: "namenode".to_string(),
        user: "hadoop".to_string(),
        path: path.to_string(),
        flush_size,
        idle_flush_time: 600.0,
        retry_interval: 0.0,
        ..Default::default()
    }
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[tokio::test]
async fn test_single_record_lands_in_resolved_path() {
    let store = Arc::new(MemoryStore::default());
    let sink = WebHdfsSink::start_with_store(
        SinkConfig {
            message_format: Some("%{message}".to_string()),
            ..config("/logs/%{host}.log", 1)
        },
        Arc::clone(&store) as _,
        accept_all(),
    )
    .await
    .unwrap();

    let report = sink
        .submit_fields(fields(json!({"host": "localhost", "message": "hello"})))
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(store.file_string("/logs/localhost.log").unwrap(), "hello\n");
    assert_eq!(store.calls()[0], StoreCall::List("/".to_string()));
    sink.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_five_hundred_records_make_fifty_flushes() {
    let store = Arc::new(MemoryStore::default());
    let sink = WebHdfsSink::start_with_store(
        config("/logs/batch.log", 10),
        Arc::clone(&store) as _,
        accept_all(),
    )
    .await
    .unwrap();

    let mut reports = Vec::new();
    for i in 0..500 {
        if let Some(report) = sink.submit_fields(fields(json!({ "n": i }))).await.unwrap() {
            reports.push(report);
        }
    }
    assert_eq!(reports.len(), 50);
    assert!(reports.iter().all(|r| r.records == 10 && r.is_complete()));
    assert!(sink.shutdown().await.unwrap().is_none());

    let content = store.file_string("/logs/batch.log").unwrap();
    let numbers: Vec<i64> = content
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, (0..500).collect::<Vec<_>>());

    let creates = store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::Create(..)))
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn test_lost_batch_does_not_stop_the_sink() {
    let store = Arc::new(MemoryStore::default());
    let sink = WebHdfsSink::start_with_store(
        SinkConfig {
            retry_times: 3,
            ..config("/logs/%{host}.log", 2)
        },
        Arc::clone(&store) as _,
        accept_all(),
    )
    .await
    .unwrap();

    sink.submit_fields(fields(json!({"host": "a", "n": 1})))
        .await
        .unwrap();
    let warmup = sink
        .submit_fields(fields(json!({"host": "a", "n": 2})))
        .await
        .unwrap()
        .unwrap();
    assert!(warmup.is_complete());

    store.set_failing(true);
    let writes_before = store.writes();
    sink.submit_fields(fields(json!({"host": "a", "n": 3})))
        .await
        .unwrap();
    let lost = sink
        .submit_fields(fields(json!({"host": "a", "n": 4})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lost.lost_paths, vec!["/logs/a.log".to_string()]);
    assert_eq!(store.writes() - writes_before, 3);

    store.set_failing(false);
    sink.submit_fields(fields(json!({"host": "a", "n": 5})))
        .await
        .unwrap();
    let report = sink.shutdown().await.unwrap().unwrap();
    assert!(report.is_complete());
    assert_eq!(
        store.file_string("/logs/a.log").unwrap().lines().count(),
        3
    );
}

#[tokio::test]
async fn test_gzip_members_are_appended() {
    let store = Arc::new(MemoryStore::default());
    let sink = WebHdfsSink::start_with_store(
        SinkConfig {
            compression: Compression::Gzip,
            ..config("/logs/app.log", 1)
        },
        Arc::clone(&store) as _,
        accept_all(),
    )
    .await
    .unwrap();

    sink.submit_json_line(r#"{"msg":"one"}"#).await.unwrap();
    sink.submit_json_line(r#"{"msg":"two"}"#).await.unwrap();
    sink.shutdown().await.unwrap();

    let compressed = store.file("/logs/app.log.gz").unwrap();
    let mut text = String::new();
    MultiGzDecoder::new(compressed.as_slice())
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "{\"msg\":\"one\"}\n{\"msg\":\"two\"}\n");
}

#[tokio::test]
async fn test_snappy_stream_survives_appends() {
    let store = Arc::new(MemoryStore::default());
    let sink = WebHdfsSink::start_with_store(
        SinkConfig {
            compression: Compression::Snappy,
            snappy_bufsize: 8,
            ..config("/logs/app.log", 2)
        },
        Arc::clone(&store) as _,
        accept_all(),
    )
    .await
    .unwrap();

    for msg in ["alpha", "beta", "gamma"] {
        sink.submit_fields(fields(json!({ "msg": msg })))
            .await
            .unwrap();
    }
    sink.shutdown().await.unwrap();

    let raw = decompress_snappy_stream(&store.file("/logs/app.log.snappy").unwrap()).unwrap();
    assert_eq!(
        String::from_utf8(raw).unwrap(),
        "{\"msg\":\"alpha\"}\n{\"msg\":\"beta\"}\n{\"msg\":\"gamma\"}\n"
    );
}

#[tokio::test]
async fn test_webhdfs_round_trip_creates_missing_file() {
    let mut server = Server::new_async().await;
    let address = server.host_with_port();
    let (host, port) = address.rsplit_once(':').unwrap();

    let probe = server
        .mock("GET", "/webhdfs/v1/")
        .match_query(Matcher::UrlEncoded("op".into(), "LISTSTATUS".into()))
        .with_status(200)
        .with_body(r#"{"FileStatuses":{"FileStatus":[]}}"#)
        .create_async()
        .await;
    let append = server
        .mock("POST", "/webhdfs/v1/logs/web.log")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("op".into(), "APPEND".into()),
            Matcher::UrlEncoded("user.name".into(), "hadoop".into()),
        ]))
        .with_status(404)
        .with_body(
            r#"{"RemoteException":{"exception":"FileNotFoundException","javaClassName":"java.io.FileNotFoundException","message":"File does not exist: /logs/web.log"}}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let create = server
        .mock("PUT", "/webhdfs/v1/logs/web.log")
        .match_query(Matcher::UrlEncoded("op".into(), "CREATE".into()))
        .with_status(307)
        .with_header(
            "location",
            &format!("{}/datanode/logs/web.log?op=CREATE", server.url()),
        )
        .expect(1)
        .create_async()
        .await;
    let datanode = server
        .mock("PUT", "/datanode/logs/web.log")
        .match_query(Matcher::Any)
        .match_body("{\"app\":\"web\",\"msg\":\"x\"}\n")
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let sink = WebHdfsSink::start(SinkConfig {
        host: host.to_string(),
        port: port.parse().unwrap(),
        ..config("/logs/%{app}.log", 1)
    })
    .await
    .unwrap();

    let report = sink
        .submit_json_line(r#"{"app":"web","msg":"x"}"#)
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_complete());
    sink.shutdown().await.unwrap();

    probe.assert_async().await;
    append.assert_async().await;
    create.assert_async().await;
    datanode.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_namenode_fails_start() {
    let mut server = Server::new_async().await;
    let address = server.host_with_port();
    let (host, port) = address.rsplit_once(':').unwrap();
    let _probe = server
        .mock("GET", "/webhdfs/v1/")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let result = WebHdfsSink::start(SinkConfig {
        host: host.to_string(),
        port: port.parse().unwrap(),
        ..config("/logs/x.log", 1)
    })
    .await;
    assert!(matches!(
        result,
        Err(webhdfs_sink::SinkError::HealthCheck { .. })
    ));
}
