use std::path::Path;

use common::Config;
use newsdigest::ingestion::{HttpNewsSource, NewsSource};
use newsdigest::llm::summarizer::truncate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut config = Config::load_with_defaults(
        Some(Path::new("config.default.toml")),
        Some(Path::new("config.toml")),
    )
    .await?;
    config.apply_env_overrides();

    // An explicit URL argument wins over the configuration
    let url = std::env::args().nth(1).unwrap_or_else(|| config.source.url.clone());
    let source = HttpNewsSource::new(url.trim(), config.source.timeout_seconds())?;

    println!("\n{}", "=".repeat(60));
    println!("Fetching: {}", source.name());
    println!("{}", "=".repeat(60));

    match source.fetch().await {
        Ok(articles) => {
            println!("✓ Success! {} articles", articles.len());
            for (i, article) in articles.iter().take(5).enumerate() {
                println!("\n  {}. {}", i + 1, truncate(&article.title, 80));
                println!("     URL: {}", article.url.as_deref().unwrap_or("none"));
                println!(
                    "     Published: {}",
                    article
                        .published_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string())
                );
                println!("     Content: {} chars", article.content.chars().count());
            }
        }
        Err(e) => {
            println!("✗ Failed: {}", e);
        }
    }

    Ok(())
}
