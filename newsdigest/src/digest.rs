use chrono::{DateTime, Utc};

use crate::models::ArticleDecision;

/// Build the prompt asking the model for one consolidated digest of the retained articles.
pub fn build_digest_prompt(retained: &[ArticleDecision]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a senior markets editor. Write a consolidated digest of the important news below.\n");
    prompt.push_str("Lead with the most important events, point out links between related stories, ");
    prompt.push_str("and keep it under 300 words in clear, professional language.\n");
    prompt.push_str("Write plain prose without headings.\n\n");
    prompt.push_str("Important news:\n");

    for (i, decision) in retained.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {}: {}",
            i + 1,
            decision.importance,
            decision.article.title,
            decision.summary
        ));
        if !decision.keywords.is_empty() {
            prompt.push_str(&format!(" ({})", decision.keywords.join(", ")));
        }
        prompt.push('\n');
    }

    prompt.push_str("\nDigest:");
    prompt
}

/// Title of the persisted digest record, e.g. "Daily Digest - 2024-01-10".
pub fn digest_title(at: DateTime<Utc>) -> String {
    format!("Daily Digest - {}", at.format("%Y-%m-%d"))
}

pub fn digest_summary(article_count: usize) -> String {
    format!("AI-generated digest of {} articles", article_count)
}
