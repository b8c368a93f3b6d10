//! `emoterelay catalog` — List the emote catalog.

use emoterelay_cache::Catalog;
use emoterelay_config::AppConfig;
use emoterelay_sources::HttpCatalogFeed;

pub async fn run(refresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let catalog = Catalog::new(config.catalog.seed.clone());

    if refresh {
        match &config.catalog.feed_url {
            Some(url) => {
                let feed = HttpCatalogFeed::new(url, config.catalog.feed_timeout_secs)?;
                match catalog.refresh(&feed).await {
                    Ok(entries) => println!("✅ Merged feed from {url} ({entries} entries)\n"),
                    Err(e) => println!("⚠️  Feed refresh failed, showing seed only: {e}\n"),
                }
            }
            None => println!("⚠️  No catalog.feed_url configured, showing seed only\n"),
        }
    }

    let snapshot = catalog.snapshot().await;
    let names = catalog.names().await;
    let width = names.iter().map(String::len).max().unwrap_or(0);
    for name in &names {
        if let Some(url) = snapshot.get(name) {
            println!("  {name:<width$}  {url}");
        }
    }
    println!("\n{} emotes", names.len());
    Ok(())
}
