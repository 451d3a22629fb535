mod block;
mod config;
mod crawler;
mod extract;
mod fingerprint;
mod gate;
mod interact;
mod proxy;
mod restart;
mod result;
mod retry;
mod sheet;
mod surface;
mod worker;

use dotenv::dotenv;

use crate::config::Config;
use crate::proxy::ProxyPool;
use crate::sheet::SheetClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env();
    println!(
        "🤖 Ads agent starting in {} mode ({} concurrent pages, {} retries)",
        cfg.mode.label(),
        cfg.concurrent_pages,
        cfg.max_retries
    );

    let sheet = SheetClient::from_env()?;
    let pool = ProxyPool::from_env();

    worker::run(cfg, sheet, pool).await?;

    println!("👋 Done");
    Ok(())
}
