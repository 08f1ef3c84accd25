//! Bid suggestions from cpc and competition.

use kwplanner_shared::{Keyword, round2};

/// Default bid for a group with no cpc data at all.
pub const FALLBACK_DEFAULT_BID: f64 = 1.00;

/// Competition above this is "high".
pub const HIGH_COMPETITION: f64 = 0.7;

/// Competition above this (and not high) is "medium".
pub const MEDIUM_COMPETITION: f64 = 0.4;

/// Group competition assumed for keywords without (or with zero) competition data.
pub const ASSUMED_GROUP_COMPETITION: f64 = 0.5;

/// Smallest default bid a group may carry.
const MIN_DEFAULT_BID: f64 = 0.01;

fn keyword_factor(competition: f64) -> f64 {
    if competition > HIGH_COMPETITION {
        1.20
    } else if competition > MEDIUM_COMPETITION {
        1.00
    } else {
        0.80
    }
}

fn group_factor(competition: f64) -> f64 {
    if competition > HIGH_COMPETITION {
        1.15
    } else if competition > MEDIUM_COMPETITION {
        1.00
    } else {
        0.85
    }
}

/// Suggested bid for one keyword, or `None` when there is no cpc to base it on.
///
/// Missing competition counts as low competition.
pub fn suggest_bid(cpc: Option<f64>, competition: Option<f64>) -> Option<f64> {
    let cpc = cpc.filter(|c| *c > 0.0)?;
    Some(round2(cpc * keyword_factor(competition.unwrap_or(0.0))))
}

/// [`suggest_bid`] from a keyword's metrics.
pub fn keyword_bid(keyword: &Keyword) -> Option<f64> {
    suggest_bid(keyword.cpc(), keyword.competition())
}

/// Default bid for a group from its average cpc and competition.
pub fn default_group_bid(avg_cpc: f64, avg_competition: f64) -> f64 {
    if avg_cpc <= 0.0 {
        return FALLBACK_DEFAULT_BID;
    }
    round2(avg_cpc * group_factor(avg_competition)).max(MIN_DEFAULT_BID)
}

/// Average cpc and competition of a keyword set.
///
/// Missing cpc counts as 0; missing or zero competition counts as
/// [`ASSUMED_GROUP_COMPETITION`].
pub fn group_averages(keywords: &[Keyword]) -> (f64, f64) {
    if keywords.is_empty() {
        return (0.0, ASSUMED_GROUP_COMPETITION);
    }
    let n = keywords.len() as f64;
    let total_cpc: f64 = keywords.iter().map(|k| k.cpc().unwrap_or(0.0)).sum();
    let total_competition: f64 = keywords
        .iter()
        .map(|k| {
            k.competition()
                .filter(|c| *c > 0.0)
                .unwrap_or(ASSUMED_GROUP_COMPETITION)
        })
        .sum();
    (total_cpc / n, total_competition / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwplanner_shared::Metrics;

    fn kw(term: &str, cpc: Option<f64>, competition: Option<f64>) -> Keyword {
        Keyword::new(term)
            .unwrap()
            .with_metrics(Metrics::new(Some(100), cpc, competition).unwrap())
    }

    #[test]
    fn keyword_bid_scenarios() {
        assert_eq!(suggest_bid(Some(10.0), Some(0.9)), Some(12.0));
        assert_eq!(suggest_bid(Some(10.0), Some(0.2)), Some(8.0));
        assert_eq!(suggest_bid(Some(10.0), Some(0.5)), Some(10.0));
        assert_eq!(suggest_bid(Some(3.33), Some(0.9)), Some(4.0));
    }

    #[test]
    fn no_cpc_means_no_bid() {
        assert_eq!(suggest_bid(None, Some(0.9)), None);
        assert_eq!(suggest_bid(Some(0.0), Some(0.9)), None);
        assert_eq!(keyword_bid(&Keyword::new("plumber").unwrap()), None);
    }

    #[test]
    fn missing_competition_is_low() {
        assert_eq!(suggest_bid(Some(5.0), None), Some(4.0));
    }

    #[test]
    fn bid_is_monotonic_across_thresholds() {
        let cpc = Some(7.5);
        let mut previous = 0.0;
        for step in 0..=100 {
            let competition = step as f64 / 100.0;
            let bid = suggest_bid(cpc, Some(competition)).unwrap();
            assert!(bid >= previous, "bid fell at competition {competition}");
            previous = bid;
        }
        // Thresholds are exclusive.
        assert_eq!(suggest_bid(cpc, Some(0.4)), Some(6.0));
        assert_eq!(suggest_bid(cpc, Some(0.7)), Some(7.5));
    }

    #[test]
    fn default_bid_factors_and_fallback() {
        assert_eq!(default_group_bid(0.0, 0.9), FALLBACK_DEFAULT_BID);
        assert_eq!(default_group_bid(10.0, 0.8), 11.5);
        assert_eq!(default_group_bid(10.0, 0.5), 10.0);
        assert_eq!(default_group_bid(10.0, 0.1), 8.5);
        assert!(default_group_bid(0.001, 0.1) > 0.0);
    }

    #[test]
    fn averages_use_group_defaults() {
        let keywords = vec![
            kw("a", Some(4.0), Some(0.9)),
            kw("b", None, None),
            kw("c", Some(2.0), Some(0.0)),
        ];
        let (avg_cpc, avg_competition) = group_averages(&keywords);
        assert!((avg_cpc - 2.0).abs() < 1e-9);
        assert!((avg_competition - (0.9 + 0.5 + 0.5) / 3.0).abs() < 1e-9);
    }
}
