use tracing::debug;

const SENTENCE_BREAKS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Extractive summary used when the model labels an article but returns no summary:
/// the leading two sentences of the content, capped at 200 characters.
pub fn extractive_summary(text: &str) -> String {
    let sentences: Vec<&str> = text
        .split(SENTENCE_BREAKS)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();

    if sentences.is_empty() {
        debug!("extractive summary: no sentences found");
        return String::new();
    }

    truncate(&format!("{}.", sentences.join(". ")), 200)
}

/// Truncate to `max_chars` characters, appending "..." when something was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractive_summary() {
        let text = "First sentence is the headline. Second sentence is a bullet. \
                    Third sentence is another bullet.";

        let summary = extractive_summary(text);

        assert_eq!(summary, "First sentence is the headline. Second sentence is a bullet.");
    }

    #[test]
    fn test_extractive_summary_truncation() {
        let long_sentence = "a".repeat(250);
        let text = format!("{}. Second sentence.", long_sentence);

        let summary = extractive_summary(&text);

        assert_eq!(summary.chars().count(), 203); // 200 + "..."
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_extractive_summary_empty() {
        assert_eq!(extractive_summary("   ...  "), "");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("比特币现货ETF获批", 3), "比特币...");
        assert_eq!(truncate("short", 10), "short");
    }
}
