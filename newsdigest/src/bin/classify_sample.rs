use std::path::Path;
use std::sync::Arc;

use common::Config;
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::llm::LlmProvider;
use newsdigest::models::{ArticleDecision, RawArticle};
use newsdigest::processing::{Analyzer, LlmAnalyzer};

const SAMPLE_TITLE: &str = "SEC approves first spot Bitcoin ETFs";
const SAMPLE_CONTENT: &str = r#"
The U.S. Securities and Exchange Commission on Wednesday approved eleven spot
Bitcoin exchange-traded funds, including products from BlackRock, Fidelity and
Grayscale. Trading is expected to begin on Thursday. Analysts estimate the funds
could attract tens of billions of dollars in inflows over the coming year, and
Bitcoin rose 4% in after-hours trading following the announcement.
"#;

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

    let api_key = config.api_key()?;
    let provider: Arc<dyn LlmProvider> = Arc::new(RemoteLlmProvider::from_config(&config.llm, api_key));

    println!("\n{}", "=".repeat(60));
    println!("Classifying sample article");
    println!("Base URL: {}", config.llm.api_url());
    println!("Model: {}", provider.model());
    println!("{}", "=".repeat(60));

    let analyzer = LlmAnalyzer::from_config(provider, &config.llm);
    let article = RawArticle::new(SAMPLE_TITLE, SAMPLE_CONTENT.trim());

    let classification = match analyzer.classify_and_summarize(&article).await {
        Ok(c) => c,
        Err(e) => {
            println!("✗ Failed: {}", e);
            return Ok(());
        }
    };

    println!("✓ Success!");
    println!("  Importance: {}", classification.importance);
    println!("  Summary: {}", classification.summary);
    println!("  Keywords: {}", classification.keywords.join(", "));

    let decision = ArticleDecision::new(article, classification);
    if decision.importance.is_retained() {
        println!("\n[Digest] Generating single-article digest...");
        match analyzer.digest(std::slice::from_ref(&decision)).await {
            Ok(digest) => println!("{}", digest.text()),
            Err(e) => println!("✗ Failed: {}", e),
        }
    } else {
        println!("\nArticle would be filtered out (low importance).");
    }

    Ok(())
}
