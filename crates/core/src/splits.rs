use std::collections::BTreeMap;

use crate::record::CodedItem;

/// Fraction of a transaction's value attributable to each country/region or
/// sector code. Fractions are in (0, 1]; they are never renormalized, so a
/// map built from explicit percentages may legitimately not sum to 1.0.
pub type SplitMap = BTreeMap<String, f64>;

/// The UN/DAC region vocabulary; other region vocabularies are ignored.
const REGION_VOCABULARY: &str = "1";

fn collect(items: impl Iterator<Item = (Option<String>, Option<f64>)>) -> SplitMap {
    let mut splits = SplitMap::new();
    for (code, percentage) in items {
        if let Some(code) = code {
            if code.is_empty() {
                continue;
            }
            splits.insert(code.to_uppercase(), percentage.unwrap_or(100.0) / 100.0);
        }
    }
    splits
}

/// Country/region splits for an activity or transaction.
///
/// Recipient countries win; regions are consulted only when no country
/// declares a split, restricted to the UN/DAC vocabulary. A missing
/// percentage defaults to 100% (a known over-counting caveat in the source
/// data). With no declared codes at all, the caller-supplied default split
/// applies, else 100% to the fallback code.
pub fn country_or_region_splits(
    countries: &[CodedItem],
    regions: &[CodedItem],
    default_splits: Option<&SplitMap>,
    fallback_code: &str,
) -> SplitMap {
    let mut splits = collect(
        countries
            .iter()
            .map(|country| (country.code.clone(), country.percentage)),
    );

    if splits.is_empty() {
        splits = collect(regions.iter().filter_map(|region| {
            let vocabulary = region.vocabulary.as_deref().unwrap_or(REGION_VOCABULARY);
            if vocabulary == REGION_VOCABULARY {
                Some((region.code.clone(), region.percentage))
            } else {
                None
            }
        }));
    }

    finish(splits, default_splits, fallback_code)
}

/// Sector splits for an activity or transaction.
///
/// Activities may report sectors in two incompatible DAC code systems at
/// once; mixing them would double count. If any entry carries the 5-digit
/// vocabulary ("1", also the default when unmarked), only that vocabulary
/// contributes; otherwise the 3-digit vocabulary ("2") is used.
pub fn sector_splits(
    sectors: &[CodedItem],
    default_splits: Option<&SplitMap>,
    fallback_code: &str,
) -> SplitMap {
    let has_narrow = sectors
        .iter()
        .any(|sector| sector.vocabulary.as_deref().unwrap_or("1") == "1");
    let chosen = if has_narrow { "1" } else { "2" };

    let splits = collect(sectors.iter().filter_map(|sector| {
        if sector.vocabulary.as_deref().unwrap_or("1") == chosen {
            Some((sector.code.clone(), sector.percentage))
        } else {
            None
        }
    }));

    finish(splits, default_splits, fallback_code)
}

fn finish(splits: SplitMap, default_splits: Option<&SplitMap>, fallback_code: &str) -> SplitMap {
    if !splits.is_empty() {
        return splits;
    }
    if let Some(default_splits) = default_splits {
        return default_splits.clone();
    }
    let mut fallback = SplitMap::new();
    fallback.insert(fallback_code.to_string(), 1.0);
    fallback
}
