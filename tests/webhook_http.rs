//! Webhook listener over real HTTP.

mod common;

use common::{BrokenHook, LabelHook, TestBot};
use modbot::bot::UNHANDLED_WEBHOOK_BODY;
use modbot::http::WebhookServer;
use modbot::metrics;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Listener {
    base: String,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
    _bot: TestBot,
}

impl Listener {
    async fn start() -> Self {
        metrics::init();
        let bot = TestBot::start(vec![
            LabelHook::new("github", "/github"),
            LabelHook::new("push", "/github/push"),
            BrokenHook::new(),
        ])
        .await;

        let server = WebhookServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind");
        let base = format!("http://{}", server.local_addr());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve(bot.dispatcher().clone(), shutdown.clone()));

        Self {
            base,
            shutdown,
            task,
            _bot: bot,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_unregistered_path_is_acknowledged() {
    let listener = Listener::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(listener.url("/webhook/unregistered"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), UNHANDLED_WEBHOOK_BODY);

    listener.stop().await;
}

#[tokio::test]
async fn test_longest_registered_prefix_wins() {
    let listener = Listener::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(listener.url("/webhook/github/push/refs?ref=main"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "push");

    let response = client
        .get(listener.url("/webhook/github/issues"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "github");

    listener.stop().await;
}

#[tokio::test]
async fn test_headers_and_body_reach_the_handler() {
    let listener = Listener::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(listener.url("/webhook/github"))
        .header("X-Token", "s3cret")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-seen-token"], "s3cret");
    assert_eq!(response.headers()["x-body-length"], "7");

    listener.stop().await;
}

#[tokio::test]
async fn test_handler_error_is_bare_500() {
    let listener = Listener::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(listener.url("/webhook/broken"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert!(response.text().await.unwrap().is_empty());

    listener.stop().await;
}

#[tokio::test]
async fn test_paths_outside_the_mount_are_not_found() {
    let listener = Listener::start().await;
    let client = reqwest::Client::new();

    let response = client.get(listener.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    listener.stop().await;
}

#[tokio::test]
async fn test_metrics_endpoint_reports_webhooks() {
    let listener = Listener::start().await;
    let client = reqwest::Client::new();

    client
        .post(listener.url("/webhook/unregistered"))
        .send()
        .await
        .unwrap();
    let body = client
        .get(listener.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("modbot_webhook_responses_total"), "{body}");

    listener.stop().await;
}
