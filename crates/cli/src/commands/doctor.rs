//! `emoterelay doctor` — Diagnose system health.

use emoterelay_config::AppConfig;
use emoterelay_core::source::CatalogFeed;
use emoterelay_sources::HttpCatalogFeed;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 emoterelay Doctor — System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `emoterelay init` (defaults in use)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.has_discord_token() {
        println!("  ✅ Discord token configured");
    } else {
        println!("  ⚠️  No Discord token — set EMOTERELAY_DISCORD_TOKEN");
        issues += 1;
    }

    match &config.catalog.feed_url {
        Some(url) => {
            let feed = HttpCatalogFeed::new(url, config.catalog.feed_timeout_secs)?;
            match feed.load().await {
                Ok(emotes) => println!("  ✅ Catalog feed reachable ({} emotes)", emotes.len()),
                Err(e) => {
                    println!("  ⚠️  Catalog feed failed: {e}");
                    issues += 1;
                }
            }
        }
        None => println!("  ✅ Seed catalog only ({} emotes)", config.catalog.seed.len()),
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
