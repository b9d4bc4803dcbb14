use crate::models::ArticleDecision;

/// Keep medium and high importance decisions, in their original order.
pub fn retain_important(decisions: &[ArticleDecision]) -> Vec<ArticleDecision> {
    decisions
        .iter()
        .filter(|d| d.importance.is_retained())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, Importance, RawArticle};

    fn decision(content: &str, importance: Importance) -> ArticleDecision {
        ArticleDecision::new(
            RawArticle::new(format!("title {}", content), content),
            Classification {
                importance,
                summary: format!("s{}", content),
                keywords: vec![],
            },
        )
    }

    #[test]
    fn keeps_medium_and_high_in_order() {
        let decisions = vec![
            decision("A", Importance::High),
            decision("B", Importance::Low),
            decision("C", Importance::Medium),
            decision("D", Importance::Low),
            decision("E", Importance::High),
        ];

        let retained = retain_important(&decisions);
        let contents: Vec<_> = retained.iter().map(|d| d.article.content.as_str()).collect();
        assert_eq!(contents, ["A", "C", "E"]);
        assert!(retained.iter().all(|d| d.importance != Importance::Low));
    }

    #[test]
    fn empty_and_all_low_inputs() {
        assert!(retain_important(&[]).is_empty());
        let all_low = vec![decision("A", Importance::Low), decision("B", Importance::Low)];
        assert!(retain_important(&all_low).is_empty());
    }

    #[test]
    fn is_pure() {
        let decisions = vec![decision("A", Importance::Medium), decision("B", Importance::Low)];
        let before = decisions.clone();

        let first = retain_important(&decisions);
        let second = retain_important(&decisions);

        assert_eq!(first, second);
        assert_eq!(decisions, before);
    }
}
