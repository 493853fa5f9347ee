use std::collections::{BTreeMap, BTreeSet};

use aidflow_core::{ActivityRecord, CodedItem, Narrative, TransactionRecord};

use crate::errors::{EngineError, ErrorsOnExit};

/// Predicate over one coded entry (scope, marker, tag or sector). Total:
/// a missing code simply fails to match.
pub type ItemCheck = fn(&CodedItem) -> bool;
/// Case-insensitive predicate over one narrative text variant.
pub type TextCheck = fn(&str) -> bool;

/// An analysis theme: relevance configuration plus the pure predicates
/// that recognize the theme's high-confidence signals.
#[derive(Clone)]
pub struct Theme {
    pub name: String,
    /// When set, any activity-level signal disables the secondary
    /// relevance checks entirely: explicit opt-in is trusted.
    pub include_scope: bool,
    /// Whether sector display names use the flat 5-digit table.
    pub flat_sectors: bool,
    pub excluded_aid_types: Option<BTreeSet<String>>,
    pub relevant_countries: Option<BTreeSet<String>>,
    /// Allow-listed sector codes, keyed by vocabulary.
    pub relevant_sectors: Option<BTreeMap<String, BTreeSet<String>>>,
    /// Lowercase substrings matched against narrative text.
    pub relevant_words: Option<Vec<String>>,
    /// Uninstalled checks scan nothing: the corresponding lists are not
    /// iterated and missing codes in them are not reported.
    scope_check: Option<ItemCheck>,
    marker_check: Option<ItemCheck>,
    tag_check: Option<ItemCheck>,
    sector_check: Option<ItemCheck>,
    text_check: Option<TextCheck>,
}

fn code_upper(item: &CodedItem) -> Option<String> {
    item.code.as_ref().map(|code| code.to_uppercase())
}

fn covid_scope(scope: &CodedItem) -> bool {
    let Some(code) = code_upper(scope) else {
        return false;
    };
    match (scope.item_type.as_deref(), scope.vocabulary.as_deref()) {
        (Some("1"), Some("1-2")) => code == "EP-2020-000012-001",
        (Some("2"), Some("2-1")) => code == "HCOVD20",
        _ => false,
    }
}

fn covid_tag(tag: &CodedItem) -> bool {
    tag.vocabulary.as_deref() == Some("99") && code_upper(tag).as_deref() == Some("COVID-19")
}

fn covid_sector(sector: &CodedItem) -> bool {
    sector.vocabulary.as_deref().unwrap_or("1") == "1"
        && sector.code.as_deref() == Some("12264")
}

fn covid_text(text: &str) -> bool {
    text.to_lowercase().contains("covid-19")
}

fn ebola_scope(scope: &CodedItem) -> bool {
    scope.item_type.as_deref() == Some("2")
        && scope.vocabulary.as_deref() == Some("2-1")
        && code_upper(scope).as_deref() == Some("OXEBOLA1415")
}

fn ebola_text(text: &str) -> bool {
    text.to_lowercase().contains("ebola")
}

fn climate_marker(marker: &CodedItem) -> bool {
    marker.vocabulary.as_deref() == Some("1")
        && matches!(marker.code.as_deref(), Some("6") | Some("7"))
        && matches!(
            marker.significance.as_deref(),
            Some("1") | Some("2") | Some("3") | Some("4")
        )
}

fn climate_text(text: &str) -> bool {
    text.to_lowercase().contains("climate finance")
}

fn foodsecurity_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("food security") || lower.contains("food insecurity")
}

fn ukraine_scope(scope: &CodedItem) -> bool {
    let Some(code) = code_upper(scope) else {
        return false;
    };
    match (scope.item_type.as_deref(), scope.vocabulary.as_deref()) {
        (Some("1"), Some("1-2")) => code == "OT-2022-000157-UKR",
        (Some("2"), Some("2-1")) => matches!(code.as_str(), "FUKR22" | "HUKR22" | "RYKRN22"),
        _ => false,
    }
}

impl Theme {
    fn base(name: &str) -> Theme {
        Theme {
            name: name.to_string(),
            include_scope: true,
            flat_sectors: false,
            excluded_aid_types: None,
            relevant_countries: None,
            relevant_sectors: None,
            relevant_words: None,
            scope_check: None,
            marker_check: None,
            tag_check: None,
            sector_check: None,
            text_check: None,
        }
    }

    pub fn covid() -> Theme {
        Theme {
            scope_check: Some(covid_scope),
            tag_check: Some(covid_tag),
            sector_check: Some(covid_sector),
            text_check: Some(covid_text),
            ..Theme::base("covid")
        }
    }

    pub fn ebola() -> Theme {
        Theme {
            scope_check: Some(ebola_scope),
            text_check: Some(ebola_text),
            ..Theme::base("ebola")
        }
    }

    pub fn climate() -> Theme {
        Theme {
            marker_check: Some(climate_marker),
            text_check: Some(climate_text),
            ..Theme::base("climate")
        }
    }

    pub fn foodsecurity() -> Theme {
        Theme {
            flat_sectors: true,
            text_check: Some(foodsecurity_text),
            ..Theme::base("foodsecurity")
        }
    }

    pub fn ukraine() -> Theme {
        Theme {
            scope_check: Some(ukraine_scope),
            ..Theme::base("ukraine")
        }
    }

    pub fn by_name(name: &str) -> Result<Theme, EngineError> {
        match name {
            "covid" => Ok(Theme::covid()),
            "ebola" => Ok(Theme::ebola()),
            "climate" => Ok(Theme::climate()),
            "foodsecurity" => Ok(Theme::foodsecurity()),
            "ukraine" => Ok(Theme::ukraine()),
            other => Err(EngineError::UnknownTheme(other.to_string())),
        }
    }

    /// Scan one coded list with an installed check. Lists whose check is
    /// uninstalled are never scanned, so their missing codes go unreported.
    fn any_item(
        &self,
        items: &[CodedItem],
        check: Option<ItemCheck>,
        what: &str,
        identifier: &str,
        errors: &mut ErrorsOnExit,
    ) -> bool {
        let Some(check) = check else {
            return false;
        };
        let mut found = false;
        for item in items {
            if item.code.is_none() {
                errors.add(format!("Activity {identifier} has no {what} code!"));
                continue;
            }
            if check(item) {
                found = true;
            }
        }
        found
    }

    pub fn has_desired_scope(&self, activity: &ActivityRecord, errors: &mut ErrorsOnExit) -> bool {
        self.any_item(
            &activity.humanitarian_scopes,
            self.scope_check,
            "humanitarian scope",
            &activity.identifier,
            errors,
        )
    }

    pub fn has_desired_marker(&self, activity: &ActivityRecord, errors: &mut ErrorsOnExit) -> bool {
        self.any_item(
            &activity.policy_markers,
            self.marker_check,
            "policy marker",
            &activity.identifier,
            errors,
        )
    }

    pub fn has_desired_tag(&self, activity: &ActivityRecord, errors: &mut ErrorsOnExit) -> bool {
        self.any_item(
            &activity.tags,
            self.tag_check,
            "tag",
            &activity.identifier,
            errors,
        )
    }

    pub fn has_desired_sector(&self, activity: &ActivityRecord, errors: &mut ErrorsOnExit) -> bool {
        self.any_item(
            &activity.sectors,
            self.sector_check,
            "sector",
            &activity.identifier,
            errors,
        )
    }

    pub fn has_desired_text(&self, narrative: Option<&Narrative>) -> bool {
        let Some(check) = self.text_check else {
            return false;
        };
        let Some(narrative) = narrative else {
            return false;
        };
        narrative.all_texts().any(check)
    }

    /// Activity-level high-confidence signal: scope, marker, tag, sector or
    /// title text. Applies as a floor to every child transaction's
    /// strictness.
    pub fn activity_strict(&self, activity: &ActivityRecord, errors: &mut ErrorsOnExit) -> bool {
        self.has_desired_scope(activity, errors)
            || self.has_desired_marker(activity, errors)
            || self.has_desired_tag(activity, errors)
            || self.has_desired_sector(activity, errors)
            || self.has_desired_text(activity.title.as_ref())
    }

    /// Any activity-level signal at all, including description text; used
    /// to decide whether the secondary relevance checks can be skipped.
    pub fn activity_signal(&self, activity: &ActivityRecord, errors: &mut ErrorsOnExit) -> bool {
        self.activity_strict(activity, errors)
            || self.has_desired_text(activity.description.as_ref())
    }

    /// Transaction-level strictness: a desired sector on the transaction
    /// itself, or a text match in its description.
    pub fn transaction_strict(&self, transaction: &TransactionRecord) -> bool {
        let by_sector = self.sector_check.map_or(false, |check| {
            transaction
                .sectors
                .iter()
                .any(|sector| sector.code.is_some() && check(sector))
        });
        by_sector || self.has_desired_text(transaction.description.as_ref())
    }
}
