//! Testes de integração do gateway HTTP.
//!
//! Sobe o roteador real em 127.0.0.1:0 com um avaliador falso (script de
//! shell) e conversa com ele via reqwest.

#![cfg(unix)]

use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use evalgate::executors::JsonnetExecutor;
use evalgate::gateway::{router, AppState, Gateway};
use evalgate::telemetry::{serve_metrics, PrometheusTelemetry};
use evalgate::types::config::Config;
use tokio::sync::oneshot;

/// Diretório com o avaliador falso, criado uma única vez por processo.
///
/// Criar o script antes de qualquer spawn evita ETXTBSY quando os testes
/// rodam em paralelo.
fn fixture_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir()
            .expect("Failed to create temp dir")
            .into_path();
        let log = dir.join("calls.log");
        let script = format!(
            r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -e) shift; code="$1" ;;
  esac
  shift
done
printf '%s\n' "$code" >> "{log}"
case "$code" in
  1+1) printf 2 ;;
  sleep-*)
    sleep 30 &
    echo $! > "{dir}/$code.grandchild"
    echo $$ > "{dir}/$code.child"
    wait
    ;;
  error-*) echo "RUNTIME ERROR: $code" >&2; exit 1 ;;
  *) printf '%s' "$code" ;;
esac
"#,
            log = log.display(),
            dir = dir.display(),
        );
        let path = dir.join("fake-jsonnet");
        fs::write(&path, script).expect("Failed to write fake evaluator");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod fake evaluator");
        dir
    })
}

/// Quantas vezes o avaliador falso recebeu exatamente `code`.
fn invocations(code: &str) -> usize {
    fs::read_to_string(fixture_dir().join("calls.log"))
        .unwrap_or_default()
        .lines()
        .filter(|line| *line == code)
        .count()
}

fn test_config() -> Config {
    let mut config = Config::default_config();
    config.evaluator.command = fixture_dir().join("fake-jsonnet").display().to_string();
    config.evaluator.timeout_secs = 5;
    config.limiter.rate_per_sec = 20.0;
    config.limiter.burst = 30;
    config
}

struct TestServer {
    addr: SocketAddr,
    telemetry: Arc<PrometheusTelemetry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let telemetry = Arc::new(PrometheusTelemetry::new().unwrap());
        let evaluator = Arc::new(JsonnetExecutor::from_config(&config.evaluator));
        let gateway = Arc::new(Gateway::from_config(
            &config,
            evaluator,
            telemetry.clone(),
        ));
        let state = AppState::new(gateway, &config.server).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router(state))
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            telemetry,
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    async fn post(&self, body: impl Into<reqwest::Body>) -> (u16, String) {
        let response = reqwest::Client::new()
            .post(self.url())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap();
    }
}

fn code_body(code: &str) -> String {
    serde_json::json!({ "code": code }).to_string()
}

fn process_alive(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Zumbi conta como morto
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .map(|rest| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[tokio::test]
async fn test_success_then_cache_hit() {
    let server = TestServer::start(test_config()).await;
    let body = code_body("1+1");

    let (status, text) = server.post(body.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(text, r#"{"output":"2"}"#);

    let (status, text) = server.post(body).await;
    assert_eq!(status, 200);
    assert_eq!(text, r#"{"output":"2"}"#);

    // Avaliador rodou uma vez; o segundo pedido veio do cache
    assert_eq!(invocations("1+1"), 1);
    let metrics = String::from_utf8(server.telemetry.encode().unwrap()).unwrap();
    assert!(metrics.contains("evalgate_cache_hits_total 1"));

    server.stop().await;
}

#[tokio::test]
async fn test_burst_exhaustion_returns_busy() {
    let mut config = test_config();
    config.limiter.rate_per_sec = 0.5;
    config.limiter.burst = 5;
    let server = Arc::new(TestServer::start(config).await);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            server.post(code_body(&format!("burst-{i}"))).await
        }));
    }

    let mut ok = 0;
    let mut busy = 0;
    for task in tasks {
        let (status, text) = task.await.unwrap();
        match status {
            200 => ok += 1,
            429 => {
                assert_eq!(text, r#"{"error":"Server is busy, please try again"}"#);
                busy += 1;
            }
            other => panic!("unexpected status {other}: {text}"),
        }
    }

    assert_eq!(ok, 5);
    assert_eq!(busy, 3);
    let evaluated: usize = (0..8).map(|i| invocations(&format!("burst-{i}"))).sum();
    assert_eq!(evaluated, 5);
}

#[tokio::test]
async fn test_timeout_kills_process_tree() {
    let mut config = test_config();
    config.evaluator.timeout_secs = 1;
    let server = TestServer::start(config).await;

    let started = Instant::now();
    let (status, text) = server.post(code_body("sleep-tree")).await;
    let elapsed = started.elapsed();

    assert_eq!(status, 504);
    assert!(text.contains("timed out"), "unexpected body: {text}");
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");

    let dir = fixture_dir();
    for name in ["sleep-tree.child", "sleep-tree.grandchild"] {
        let pid: i32 = fs::read_to_string(dir.join(name))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = process_alive(pid);
        for _ in 0..20 {
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            alive = process_alive(pid);
        }
        assert!(!alive, "{name} ({pid}) survived the deadline");
    }

    // Timeout não é cacheado: o mesmo corpo avalia de novo
    let (status, _) = server.post(code_body("sleep-tree")).await;
    assert_eq!(status, 504);
    assert_eq!(invocations("sleep-tree"), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_side_effects() {
    let server = TestServer::start(test_config()).await;

    let (status, text) = server.post("{\"code\": ").await;
    assert_eq!(status, 400);
    assert!(text.starts_with(r#"{"error":"#), "unexpected body: {text}");

    let metrics = String::from_utf8(server.telemetry.encode().unwrap()).unwrap();
    assert!(metrics.contains("evalgate_cache_hits_total 0"));
    assert!(metrics.contains("evalgate_request_duration_seconds_count{outcome=\"invalid\"} 1"));

    server.stop().await;
}

#[tokio::test]
async fn test_evaluation_error_reports_output() {
    let server = TestServer::start(test_config()).await;

    let (status, text) = server.post(code_body("error-syntax")).await;
    assert_eq!(status, 400);

    let envelope: serde_json::Value = serde_json::from_str(&text).unwrap();
    let message = envelope["error"].as_str().unwrap();
    assert!(message.contains("RUNTIME ERROR: error-syntax"), "{message}");
    assert!(envelope.get("output").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = test_config();
    config.server.max_body_bytes = 64;
    let server = TestServer::start(config).await;

    let code = "x".repeat(200);
    let (status, text) = server.post(code_body(&code)).await;

    assert_eq!(status, 413);
    assert!(text.contains("64 bytes"), "unexpected body: {text}");
    assert_eq!(invocations(&code), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_options_preflight_sets_cors_headers() {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, server.url())
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );

    let response = client
        .post(server.url())
        .header("origin", "https://evil.example.com")
        .body(code_body("cors-check"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_endpoint_serves_registry() {
    let telemetry = Arc::new(PrometheusTelemetry::new().unwrap());
    let (addr, handle) = serve_metrics("127.0.0.1:0", telemetry.clone())
        .await
        .unwrap();

    let text = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("evalgate_requests_total 0"));
    assert!(text.contains("evalgate_running_evaluations 0"));

    handle.abort();
}
