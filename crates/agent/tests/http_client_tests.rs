//! HTTP 컨트롤 플레인 클라이언트 테스트
//!
//! 로컬 TCP 리스너로 최소한의 HTTP/1.1 서버를 띄워 요청 경로, 압축,
//! 응답 디코딩, 상태 코드 처리를 확인합니다.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;

use befw_agent::{AgentError, ControlPlane, HttpControlPlane};
use befw_core::types::{RuleStat, StatsReport};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// 서버가 받은 요청
#[derive(Debug)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// 본문을 JSON으로 해석 (gzip이면 먼저 해제)
    fn json(&self) -> serde_json::Value {
        let raw = if self.header("content-encoding") == Some("gzip") {
            gunzip(&self.body)
        } else {
            self.body.clone()
        };
        serde_json::from_slice(&raw).expect("request body should be JSON")
    }
}

/// 서버가 돌려줄 응답
struct Reply {
    status: u16,
    body: Vec<u8>,
    gzip: bool,
    delay: Duration,
}

impl Reply {
    fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.as_bytes().to_vec(),
            gzip: false,
            delay: Duration::ZERO,
        }
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// 요청 하나를 받아 기록하고 `reply`로 응답하는 서버를 띄웁니다.
async fn serve_once(reply: Reply) -> (String, JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api/v1", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.unwrap();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_owned();
        let path = parts.next().unwrap_or_default().to_owned();

        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
            }
        }

        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await.unwrap();

        tokio::time::sleep(reply.delay).await;

        let payload = if reply.gzip {
            gzip(&reply.body)
        } else {
            reply.body.clone()
        };
        let mut head = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
            reply.status,
            payload.len()
        );
        if reply.gzip {
            head.push_str("Content-Encoding: gzip\r\n");
        }
        head.push_str("\r\n");

        let mut stream = reader.into_inner();
        // 클라이언트가 타임아웃으로 끊었을 수 있으므로 쓰기 실패는 무시
        let _ = stream.write_all(head.as_bytes()).await;
        let _ = stream.write_all(&payload).await;
        let _ = stream.shutdown().await;

        Recorded {
            method,
            path,
            headers,
            body,
        }
    });

    (base_url, handle)
}

fn client(base_url: &str, compress: bool) -> HttpControlPlane {
    HttpControlPlane::new(
        base_url,
        compress,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn fetch_posts_compressed_query_to_rule_path() {
    let (base_url, server) = serve_once(Reply::ok(
        r#"{"tenant":"edge-01","rules":[{"id":"r1","table":"filter","chain":"BEFW","dst-port":"443","jump":"ACCEPT"}],"address-lists":null}"#,
    ))
    .await;

    let doc = client(&base_url, true)
        .fetch_policy("edge-01", "filter")
        .await
        .unwrap();
    assert_eq!(doc.tenant, "edge-01");
    assert_eq!(doc.rules.len(), 1);
    assert_eq!(doc.rules[0].dst_port, "443");
    assert!(doc.address_lists.is_empty());

    let request = server.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/rule");
    assert_eq!(request.header("content-encoding"), Some("gzip"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(
        request.json(),
        serde_json::json!({"tenant": "edge-01", "rules": [{"table": "filter"}]})
    );
}

#[tokio::test]
async fn uncompressed_request_has_plain_body() {
    let (base_url, server) = serve_once(Reply::ok(r#"{"tenant":"edge-01","rules":[]}"#)).await;

    let doc = client(&base_url, false)
        .fetch_policy("edge-01", "nat")
        .await
        .unwrap();
    assert!(doc.rules.is_empty());

    let request = server.await.unwrap();
    assert!(request.header("content-encoding").is_none());
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["rules"][0]["table"], "nat");
}

#[tokio::test]
async fn gzip_response_is_decoded() {
    let (base_url, server) = serve_once(Reply {
        gzip: true,
        ..Reply::ok(r#"{"tenant":"edge-01","rules":[{"id":"r9","table":"filter","chain":"INPUT"}]}"#)
    })
    .await;

    let doc = client(&base_url, true)
        .fetch_policy("edge-01", "filter")
        .await
        .unwrap();
    assert_eq!(doc.rules[0].id, "r9");
    server.await.unwrap();
}

#[tokio::test]
async fn report_posts_to_stat_path() {
    let (base_url, server) = serve_once(Reply::ok("")).await;

    let report = StatsReport::new(
        "edge-01",
        vec![RuleStat {
            id: "r1".to_owned(),
            packets: 3,
            bytes: 180,
        }],
    );
    client(&base_url, true).report_stats(&report).await.unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.path, "/api/v1/rule/stat");
    assert_eq!(
        request.json(),
        serde_json::json!({"tenant": "edge-01", "stats": [{"id": "r1", "pkts": 3, "bytes": 180}]})
    );
}

#[tokio::test]
async fn non_ok_status_is_an_error() {
    let (base_url, server) = serve_once(Reply {
        status: 503,
        ..Reply::ok("unavailable")
    })
    .await;

    let err = client(&base_url, true)
        .fetch_policy("edge-01", "filter")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Status(503)), "{err:?}");
    server.await.unwrap();
}

#[tokio::test]
async fn created_status_is_not_accepted() {
    // 200만 성공으로 취급
    let (base_url, server) = serve_once(Reply {
        status: 201,
        ..Reply::ok("")
    })
    .await;

    let err = client(&base_url, true)
        .report_stats(&StatsReport::new("edge-01", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Status(201)));
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let (base_url, server) = serve_once(Reply::ok("{not json")).await;

    let err = client(&base_url, true)
        .fetch_policy("edge-01", "filter")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Decode(_)), "{err:?}");
    server.await.unwrap();
}

#[tokio::test]
async fn slow_server_times_out() {
    let (base_url, server) = serve_once(Reply {
        delay: Duration::from_secs(2),
        ..Reply::ok(r#"{"tenant":"edge-01"}"#)
    })
    .await;

    let plane = HttpControlPlane::new(
        base_url,
        true,
        Duration::from_millis(200),
        Duration::from_millis(200),
    )
    .unwrap();
    let err = plane.fetch_policy("edge-01", "filter").await.unwrap_err();
    assert!(matches!(err, AgentError::Request(_)), "{err:?}");
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_server_is_a_request_error() {
    // 바인드 후 바로 닫아 비어 있는 포트를 얻음
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"), true)
        .fetch_policy("edge-01", "filter")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Request(_)));
}
