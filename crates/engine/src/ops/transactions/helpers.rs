use crate::{TransactionDetails, util::normalize_optional_text};

/// Trims tags and drops empty and repeated ones, keeping first-seen order.
pub(super) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || normalized.iter().any(|seen| seen == tag) {
            continue;
        }
        normalized.push(tag.to_string());
    }
    normalized
}

pub(super) fn build_details(note: Option<&str>, tags: Vec<String>) -> TransactionDetails {
    TransactionDetails {
        note: normalize_optional_text(note),
        tags: normalize_tags(tags),
        ..TransactionDetails::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = vec![
            " food ".to_string(),
            String::new(),
            "food".to_string(),
            "weekly".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["food", "weekly"]);
    }

    #[test]
    fn blank_note_is_dropped() {
        let details = build_details(Some("   "), Vec::new());
        assert!(details.is_empty());
    }
}
