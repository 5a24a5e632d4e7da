//! Open a page, read its title, shut down.
//!
//! Needs a PhantomJS binary on `PATH` or named by `PHANTOMJS_EXECUTABLE`:
//!
//! ```text
//! cargo run --example open_page -- https://example.com/
//! ```

use phantomjs_bridge::{JsFunction, Phantom};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com/".to_string());

    let phantom = Phantom::connect().await?;
    let page = phantom.create_page().await?;

    let status = page.open(&url).await?;
    println!("open {url}: {status}");

    let title = page
        .evaluate(JsFunction::new("function () { return document.title; }"), vec![])
        .await?;
    println!("title: {title}");

    page.close().await?;
    phantom.exit().await?;
    Ok(())
}
