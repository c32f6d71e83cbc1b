mod common;

use std::time::Duration;

use common::capture::{ConfigFile, Process};
use common::healthcheck::Healthcheck;
use nix::sys::signal;

static GRACE_PERIOD_MS: u64 = 500;

async fn start(address: &str) -> anyhow::Result<(Process, ConfigFile)> {
    let config = ConfigFile::from_str(
        format!(
            r#"
        server:
            address: '{address}'
        logging:
            body_limit: 64
        "#
        )
        .as_str(),
    )?;

    let process = Process::new_with_args(&["--config", config.path_str()])?;

    Healthcheck {
        interval: Duration::from_millis(100),
        attempts: 50,
        url: &format!("http://{address}/health"),
    }
    .run()
    .await?;

    Ok((process, config))
}

#[tokio::test]
async fn test_shuts_down_sigint() -> anyhow::Result<()> {
    let (mut server, _config) = start("127.0.0.1:18401").await?;

    server.signal(signal::SIGINT)?;

    tokio::time::sleep(Duration::from_millis(GRACE_PERIOD_MS)).await;

    let status = server.proc_mut().try_wait()?;

    assert!(status.is_some());

    Ok(())
}

#[tokio::test]
async fn test_shuts_down_sigterm() -> anyhow::Result<()> {
    let (mut server, _config) = start("127.0.0.1:18402").await?;

    server.signal(signal::SIGTERM)?;

    tokio::time::sleep(Duration::from_millis(GRACE_PERIOD_MS)).await;

    let status = server.proc_mut().try_wait()?;

    assert!(status.is_some());

    Ok(())
}

#[tokio::test]
async fn test_demo_routes() -> anyhow::Result<()> {
    let (_server, _config) = start("127.0.0.1:18403").await?;
    let client = reqwest::Client::new();

    let response = client.get("http://127.0.0.1:18403/").send().await?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await?, "Hello, world!");

    let response = client
        .post("http://127.0.0.1:18403/echo")
        .header("content-type", "application/json")
        .body(r#"{"echo":true}"#)
        .send()
        .await?;
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.text().await?, r#"{"echo":true}"#);

    let response = client.get("http://127.0.0.1:18403/missing").send().await?;
    assert_eq!(response.status().as_u16(), 404);

    let response = client.get("http://127.0.0.1:18403/upgrade").send().await?;
    assert_eq!(response.status().as_u16(), 426);

    Ok(())
}
