use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;

use taskflow_api_rust::auth::{generate_jwt, Claims};

pub const JWT_SECRET: &str = "integration-test-secret";

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn(extra_env: &[(&str, &str)]) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskflow-api-rust"));
        cmd.env("TASKFLOW_API_PORT", port.to_string())
            .env("APP_ENV", "development")
            .env("STORE_BACKEND", "memory")
            .env("JWT_SECRET", JWT_SECRET)
            .env("RUST_LOG", "warn")
            .envs(extra_env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn function_url(&self, name: &str) -> String {
        format!("{}/api/functions/{}", self.base_url, name)
    }
}

/// Server with default settings: X-Forwarded-For is never trusted
#[allow(dead_code)]
pub async fn ensure_server() -> Result<&'static TestServer> {
    ensure_server_with_env(&[]).await
}

/// Server started with extra environment. One server per test binary, so
/// the first caller's environment wins.
pub async fn ensure_server_with_env(extra_env: &[(&str, &str)]) -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn(extra_env).expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Bearer token the test server will accept for `uid`
#[allow(dead_code)]
pub fn token_for(uid: &str) -> String {
    generate_jwt(&Claims::new(uid, None, 1), JWT_SECRET).expect("token")
}
