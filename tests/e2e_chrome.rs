//! End-to-end tests against a real Chrome/Chromium.
//!
//! Ignored by default — run with `cargo test -- --ignored` on a machine
//! with a Chromium-family browser installed. Pages come from the local
//! warp test server, so no external network is needed.


use std::time::Duration;

use test_server::TestServer;
use webtap::browser::launch::{launch, LaunchOptions};
use webtap::{Browser, WebtapError};

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn temp_profile_dir() -> std::path::PathBuf {
    let unique = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("webtap-e2e-{unique}"))
}

async fn launch_headless() -> anyhow::Result<(webtap::LaunchedBrowser, Browser)> {
    let launched = launch(LaunchOptions {
        profile: "e2e".into(),
        port: free_port(),
        user_data_dir: temp_profile_dir(),
        headless: true,
        chrome_path: None,
    })
    .await?;
    let browser = Browser::connect(&launched.cdp_url()).await?;
    Ok((launched, browser))
}

#[tokio::test]
#[ignore = "requires a local Chrome/Chromium"]
async fn catalog_respects_visibility_and_order() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let (mut launched, browser) = launch_headless().await?;

    browser.open(&server.url()).await?;
    let catalog = browser.scan(None).await?;

    let rendered = webtap::format_catalog(&catalog);
    assert!(rendered.contains("Sign in"), "link missing: {rendered}");
    assert!(rendered.contains("Do a thing"), "button missing: {rendered}");
    assert!(
        !rendered.contains("Hidden thing"),
        "display:none button must not be cataloged: {rendered}"
    );

    // Idempotence on a static page.
    let again = browser.scan(None).await?;
    assert_eq!(rendered, webtap::format_catalog(&again));

    let _ = launched.child.kill();
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome/Chromium"]
async fn shadow_dom_login_flow_submits_once() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let (mut launched, browser) = launch_headless().await?;

    browser.open(&format!("{}/login", server.url())).await?;
    let catalog = browser.scan(None).await?;

    // Three shadow roots deep: username, password, submit — in traversal
    // order.
    assert_eq!(catalog.len(), 3, "{}", webtap::format_catalog(&catalog));
    assert!(catalog[0].desc.contains("Username"));
    assert!(catalog[1].desc.contains("Password"));

    browser.type_text(0, "alice").await?;
    browser.type_text(1, "secret").await?;
    browser.click(2).await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let submits = browser.eval("window.__submits").await?;
    assert_eq!(submits.as_i64(), Some(1), "submit handler fired once");

    let _ = launched.child.kill();
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome/Chromium"]
async fn stale_catalog_after_navigation_is_detected() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let (mut launched, browser) = launch_headless().await?;

    browser.open(&server.url()).await?;
    let catalog = browser.scan(None).await?;
    let link = catalog
        .iter()
        .find(|e| e.desc.contains("Sign in"))
        .expect("login link in catalog");

    // Click navigates; the old catalog is now stale.
    browser.click(link.index).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let err = browser.click(link.index).await.unwrap_err();
    assert!(
        matches!(
            err,
            WebtapError::StaleIndex(_) | WebtapError::IndexOutOfRange { .. }
        ),
        "got: {err}"
    );

    let _ = launched.child.kill();
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome/Chromium"]
async fn text_is_truncated_at_budget_with_marker() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let (mut launched, browser) = launch_headless().await?;

    browser.open(&format!("{}/long", server.url())).await?;
    let text = browser.text(None).await?;

    assert!(text.ends_with("... (truncated)"), "no marker: ...{}", &text[text.len().saturating_sub(40)..]);
    assert!(
        text.len() <= 8_000 + "... (truncated)".len() + 16,
        "text not bounded: {} bytes",
        text.len()
    );

    let _ = launched.child.kill();
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome/Chromium"]
async fn second_launch_on_same_port_fails_fast() -> anyhow::Result<()> {
    let (mut launched, _browser) = launch_headless().await?;
    let port = launched.endpoint.port;

    let err = launch(LaunchOptions {
        profile: "e2e".into(),
        port,
        user_data_dir: temp_profile_dir(),
        headless: true,
        chrome_path: None,
    })
    .await
    .unwrap_err();
    assert!(matches!(err, WebtapError::ProfileInUse { .. }));

    let _ = launched.child.kill();
    Ok(())
}
