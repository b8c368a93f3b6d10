//! `emoterelay config` — Configuration management commands.

use emoterelay_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_discord_token() {
                warnings.push("No Discord token set (set EMOTERELAY_DISCORD_TOKEN or DISCORD_TOKEN)");
            }
            if config.cache.capacity > emoterelay_channels::discord::DEFAULT_EMOJI_LIMIT {
                warnings.push("cache.capacity exceeds the guild emoji limit and will be capped");
            }
            if config.catalog.seed.is_empty() && config.catalog.feed_url.is_none() {
                warnings.push("Catalog is empty: no seed entries and no feed_url");
            }
            if config.bot.command_prefix.contains(':') {
                warnings.push("Command prefix contains ':' and may be read as an emote token");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Bot:       {}", config.bot.name);
            println!("   Prefix:    {}", config.bot.command_prefix);
            println!("   Capacity:  {}", config.cache.capacity);
            println!("   Seed:      {} emotes", config.catalog.seed.len());
            println!(
                "   Feed:      {}",
                config.catalog.feed_url.as_deref().unwrap_or("none")
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
