//! Location-specific keyword variants.

use std::collections::HashSet;

use tracing::debug;

use kwplanner_shared::{ExpandedKeyword, Location, LocationPatterns, LocationType, validate_term};

fn render(pattern: &str, keyword: &str, location: &Location) -> Option<String> {
    let rendered = pattern
        .replace("{keyword}", keyword)
        .replace("{city}", location.city.as_deref().unwrap_or(""))
        .replace("{state}", location.state.as_deref().unwrap_or(""))
        .replace("{zip}", location.zip_code.as_deref().unwrap_or(""));
    match validate_term(&rendered) {
        Ok(term) => Some(term),
        Err(e) => {
            debug!(pattern, error = %e, "skipping location variant");
            None
        }
    }
}

fn variant(
    source: &ExpandedKeyword,
    term: String,
    location_type: LocationType,
    location_value: String,
) -> ExpandedKeyword {
    ExpandedKeyword {
        keyword: term,
        seed_keyword: source.seed_keyword.clone(),
        category: source.category.clone(),
        platform: source.platform,
        location_code: source.location_code,
        language_code: source.language_code.clone(),
        // Volume is re-fetched for the new term; cpc and competition are provisional.
        search_volume: 0,
        competition: source.competition,
        cpc: source.cpc,
        location_type: Some(location_type),
        location_value: Some(location_value),
    }
}

/// Combine every keyword with every location using `patterns`.
///
/// Per location: `city` when a city is present, `city_state` when city and state are
/// both present, and `zip` plus `near_zip` when a zip code is present. Keywords that
/// carry no location tag also get one `near_me` variant. Only the new variants are
/// returned, each term at most once. Empty patterns are skipped.
pub fn combine_with_locations(
    keywords: &[ExpandedKeyword],
    locations: &[Location],
    patterns: &LocationPatterns,
) -> Vec<ExpandedKeyword> {
    let mut combined = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for keyword in keywords {
        for location in locations {
            let mut emit = |pattern: &str, location_type: LocationType, value: String| {
                if pattern.trim().is_empty() {
                    return;
                }
                let Some(term) = render(pattern, &keyword.keyword, location) else {
                    return;
                };
                if seen.insert(term.clone()) {
                    combined.push(variant(keyword, term, location_type, value));
                }
            };

            if let Some(city) = &location.city {
                emit(&patterns.city, LocationType::City, city.clone());
                if let Some(state) = &location.state {
                    emit(
                        &patterns.city_state,
                        LocationType::CityState,
                        format!("{city}, {state}"),
                    );
                }
            }
            if let Some(zip) = &location.zip_code {
                emit(&patterns.zip, LocationType::Zip, zip.clone());
                emit(&patterns.near_zip, LocationType::NearZip, zip.clone());
            }
        }
    }

    if !patterns.near_me.trim().is_empty() {
        let empty = Location::default();
        for keyword in keywords.iter().filter(|k| k.location_type.is_none()) {
            let Some(term) = render(&patterns.near_me, &keyword.keyword, &empty) else {
                continue;
            };
            if !seen.insert(term.clone()) {
                continue;
            }
            combined.push(variant(
                keyword,
                term,
                LocationType::NearMe,
                LocationType::NearMe.as_str().to_string(),
            ));
        }
    }

    debug!(
        keywords = keywords.len(),
        locations = locations.len(),
        combined = combined.len(),
        "combined keywords with locations"
    );
    combined
}
