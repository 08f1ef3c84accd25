//! Rule-based keyword categorization.
//!
//! Rules are checked in order and the first rule with any pattern contained in the
//! lower-cased term wins. Keywords that already carry a specific category are left
//! alone. When nothing matches, a small intent heuristic can fill in a category.

use tracing::debug;

use kwplanner_shared::{CategoryRule, DEFAULT_CATEGORY, ExpandedKeyword};

/// Built-in rules used when the configuration defines none.
pub fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "emergency",
            &["emergency", "24/7", "urgent", "immediate", "same day"],
        ),
        CategoryRule::new("repair", &["repair", "fix", "broken", "leak", "damage"]),
        CategoryRule::new(
            "installation",
            &["install", "installation", "new", "replacement"],
        ),
        CategoryRule::new(
            "maintenance",
            &["maintenance", "service", "inspection", "tune-up"],
        ),
        CategoryRule::new(
            "commercial",
            &["commercial", "business", "office", "industrial"],
        ),
        CategoryRule::new(
            "residential",
            &["residential", "home", "house", "apartment"],
        ),
    ]
}

const LOCAL_WORDS: [&str; 3] = ["near", "location", "zip"];
const QUESTION_WORDS: [&str; 4] = ["how", "what", "why", "when"];
const PURCHASE_WORDS: [&str; 4] = ["buy", "price", "cost", "cheap"];

fn is_uncategorized(category: &str) -> bool {
    let category = category.trim();
    category.is_empty() || category.eq_ignore_ascii_case(DEFAULT_CATEGORY)
}

/// First rule with a pattern contained in `term`.
pub fn match_rule<'a>(term: &str, rules: &'a [CategoryRule]) -> Option<&'a str> {
    let term = term.to_lowercase();
    rules
        .iter()
        .find(|rule| {
            rule.patterns
                .iter()
                .map(|p| p.to_lowercase())
                .any(|p| !p.is_empty() && term.contains(&p))
        })
        .map(|rule| rule.name.as_str())
}

/// Intent heuristic for terms no rule matched.
pub fn auto_category(term: &str) -> &'static str {
    let term = term.to_lowercase();
    let contains_any = |words: &[&str]| words.iter().any(|w| term.contains(w));
    if contains_any(&LOCAL_WORDS) {
        "local"
    } else if contains_any(&QUESTION_WORDS) {
        "informational"
    } else if contains_any(&PURCHASE_WORDS) {
        "transactional"
    } else {
        DEFAULT_CATEGORY
    }
}

/// Assign categories in place. An empty `rules` slice means the built-in rules.
pub fn categorize_keywords(
    keywords: &mut [ExpandedKeyword],
    rules: &[CategoryRule],
    auto_categorize: bool,
) {
    let defaults;
    let rules = if rules.is_empty() {
        defaults = default_category_rules();
        defaults.as_slice()
    } else {
        rules
    };

    let mut assigned = 0usize;
    for keyword in keywords.iter_mut() {
        if !is_uncategorized(&keyword.category) {
            continue;
        }
        let category = match match_rule(&keyword.keyword, rules) {
            Some(name) => name,
            None if auto_categorize => auto_category(&keyword.keyword),
            None => continue,
        };
        keyword.category = category.to_string();
        assigned += 1;
    }
    debug!(total = keywords.len(), assigned, "categorized keywords");
}
