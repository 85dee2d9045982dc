use anyhow::Result;

use crate::catalog;
use crate::config::Config;
use crate::db;
use crate::migrate;

/// Print the catalog as a table, in processing order.
pub async fn list_sources(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;

    let sources = catalog::from_config(config, &pool)?.list_sources().await?;

    if sources.is_empty() {
        println!("No sources in catalog ({}).", config.catalog.kind);
        return Ok(());
    }

    println!("{:<16} {:<24} {:<10} URL", "ID", "NAME", "BIAS");
    for source in &sources {
        println!(
            "{:<16} {:<24} {:<10} {}",
            source.id,
            source.name,
            source.bias_label.as_deref().unwrap_or("-"),
            source.url
        );
    }

    Ok(())
}
