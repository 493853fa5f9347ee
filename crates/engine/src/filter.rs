use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use aidflow_core::{
    date_with_fallback, ActivityRecord, CodedItem, DateRange, Month, Narrative, TransactionKind,
};

use crate::currency::UsdConverter;
use crate::errors::ErrorsOnExit;
use crate::theme::Theme;

/// Manual exclusion and allowance lists, loaded from run configuration.
/// Org refs are matched lowercase.
#[derive(Debug, Clone, Default)]
pub struct SkipRules {
    pub activity_ids: BTreeSet<String>,
    pub reporting_org_refs: BTreeSet<String>,
    /// Reporting org ref -> hierarchy depth at or above which the org's
    /// child activities are excluded.
    pub reporting_org_children: BTreeMap<String, i32>,
    /// Activity ids allowed to exceed the USD sanity threshold silently.
    pub allow_activity_ids: BTreeSet<String>,
}

/// Outcome of screening one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityScreen {
    Excluded,
    /// The activity survives. `removed` holds indices of transactions that
    /// cannot be valued at all; `skipped` holds transactions that are
    /// valued and counted toward money factoring but must not be
    /// attributed (out-of-window date or excluded aid type). Filtering
    /// those out earlier would inflate the net-new-money factors.
    Kept {
        removed: Vec<usize>,
        skipped: Vec<usize>,
    },
}

/// A transaction that survived screening and currency conversion, by index
/// into its activity's transaction list. A non-`attributable` transaction
/// participates in factoring totals only.
#[derive(Debug, Clone)]
pub struct ValuedTransaction {
    pub index: usize,
    pub kind: TransactionKind,
    pub date: NaiveDate,
    pub month: Month,
    pub usd_value: f64,
    pub attributable: bool,
}

/// Decides which activities, and which of their transactions, are in scope
/// for the configured theme and date window.
pub struct InclusionFilter {
    theme: Theme,
    rules: SkipRules,
    range: DateRange,
    usd_error_threshold: f64,
}

/// Relevance checks that must each be satisfied somewhere on the activity
/// (header or any transaction) before it can be kept without an explicit
/// theme signal. A check whose theme filter is unset starts satisfied.
struct Latches {
    date: bool,
    aid_type: bool,
    sector: bool,
    country: bool,
    word: bool,
}

impl Latches {
    fn all(&self) -> bool {
        self.date && self.aid_type && self.sector && self.country && self.word
    }
}

fn clean_ref(ref_id: Option<&str>) -> Option<String> {
    let ref_id = ref_id?.trim().to_lowercase();
    if ref_id.is_empty() {
        None
    } else {
        Some(ref_id)
    }
}

impl InclusionFilter {
    pub fn new(theme: Theme, rules: SkipRules, range: DateRange, usd_error_threshold: f64) -> Self {
        InclusionFilter {
            theme,
            rules,
            range,
            usd_error_threshold,
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Hard exclusions that apply before any relevance logic: secondary
    /// reporters, manual skip lists, hierarchical children of excluded
    /// orgs, and activities with no reporting org at all.
    pub fn specific_exclusions(
        &self,
        activity: &ActivityRecord,
        errors: &mut ErrorsOnExit,
    ) -> bool {
        if activity.secondary_reporter {
            return true;
        }
        if self.rules.activity_ids.contains(&activity.identifier) {
            return true;
        }
        let Some(reporting_org) = &activity.reporting_org else {
            errors.add(format!(
                "Activity {} has no reporting org!",
                activity.identifier
            ));
            return true;
        };
        if let Some(ref_id) = clean_ref(reporting_org.ref_id.as_deref()) {
            if self.rules.reporting_org_refs.contains(&ref_id) {
                return true;
            }
            if let Some(depth) = self.rules.reporting_org_children.get(&ref_id) {
                if activity.hierarchy >= *depth {
                    return true;
                }
            }
        }
        false
    }

    fn aid_types_survive(&self, items: &[CodedItem]) -> bool {
        let Some(excluded) = &self.theme.excluded_aid_types else {
            return true;
        };
        if items.is_empty() {
            return true;
        }
        items
            .iter()
            .any(|item| item.code.as_ref().map_or(true, |code| !excluded.contains(code)))
    }

    fn any_relevant_sector(&self, sectors: &[CodedItem]) -> bool {
        let Some(relevant) = &self.theme.relevant_sectors else {
            return false;
        };
        sectors.iter().any(|sector| {
            let vocabulary = sector.vocabulary.as_deref().unwrap_or("1");
            match (&sector.code, relevant.get(vocabulary)) {
                (Some(code), Some(codes)) => codes.contains(code),
                _ => false,
            }
        })
    }

    fn any_relevant_country(&self, countries: &[CodedItem]) -> bool {
        let Some(relevant) = &self.theme.relevant_countries else {
            return false;
        };
        countries.iter().any(|country| {
            country
                .code
                .as_ref()
                .is_some_and(|code| relevant.contains(&code.to_uppercase()))
        })
    }

    fn any_relevant_word(&self, narrative: Option<&Narrative>) -> bool {
        let Some(words) = &self.theme.relevant_words else {
            return false;
        };
        let Some(narrative) = narrative else {
            return false;
        };
        narrative.all_texts().any(|text| {
            let lower = text.to_lowercase();
            words.iter().any(|word| lower.contains(word.as_str()))
        })
    }

    /// Screen one activity against the theme.
    ///
    /// With an explicit activity-level theme signal (and `include_scope`
    /// on), the secondary relevance checks are all treated as satisfied;
    /// otherwise each must latch somewhere on the header or on any
    /// transaction, valid or not. Only unvaluable transactions are removed
    /// here; out-of-window and excluded-aid-type transactions still feed
    /// the factoring totals and are dropped at attribution instead.
    /// Validity errors are reported only when the activity is kept.
    pub fn exclude_activity(
        &self,
        activity: &ActivityRecord,
        errors: &mut ErrorsOnExit,
    ) -> ActivityScreen {
        if activity.transactions.is_empty() {
            return ActivityScreen::Excluded;
        }

        let signalled = self.theme.include_scope && self.theme.activity_signal(activity, errors);

        let mut latches = Latches {
            date: false,
            aid_type: self.theme.excluded_aid_types.is_none(),
            sector: self.theme.relevant_sectors.is_none(),
            country: self.theme.relevant_countries.is_none(),
            word: self.theme.relevant_words.is_none(),
        };

        // Header-level latches.
        if let Some(start) = date_with_fallback(
            activity.start_date_actual.as_deref(),
            activity.start_date_planned.as_deref(),
        ) {
            if self.range.contains(start) {
                latches.date = true;
            }
        }
        if self.aid_types_survive(&activity.default_aid_types) {
            latches.aid_type = true;
        }
        if self.any_relevant_sector(&activity.sectors) {
            latches.sector = true;
        }
        if self.any_relevant_country(&activity.recipient_countries) {
            latches.country = true;
        }
        if self.any_relevant_word(activity.title.as_ref())
            || self.any_relevant_word(activity.description.as_ref())
        {
            latches.word = true;
        }

        let mut removed = Vec::new();
        let mut skipped = Vec::new();
        let mut pending_errors = Vec::new();

        for (index, transaction) in activity.transactions.iter().enumerate() {
            // Relevance latches consider every transaction, valid or not.
            let date = date_with_fallback(
                transaction.date.as_deref(),
                transaction.value_date.as_deref(),
            );
            let in_window = date.is_some_and(|date| self.range.contains(date));
            if in_window {
                latches.date = true;
            }
            let tx_aid_types = if transaction.aid_types.is_empty() {
                &activity.default_aid_types
            } else {
                &transaction.aid_types
            };
            let aid_ok = self.aid_types_survive(tx_aid_types);
            if aid_ok {
                latches.aid_type = true;
            }
            if self.any_relevant_sector(&transaction.sectors) {
                latches.sector = true;
            }
            if self.any_relevant_country(&transaction.recipient_countries) {
                latches.country = true;
            }
            if self.any_relevant_word(transaction.description.as_ref()) {
                latches.word = true;
            }

            // Validity: these transactions cannot be valued at all.
            if transaction
                .transaction_type
                .as_deref()
                .and_then(TransactionKind::from_code)
                .is_none()
            {
                removed.push(index);
                continue;
            }
            if transaction.value.unwrap_or(0.0) == 0.0 {
                removed.push(index);
                continue;
            }
            if transaction
                .currency
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
            {
                pending_errors.push(format!(
                    "Excluding transaction with no currency: {}",
                    activity.identifier
                ));
                removed.push(index);
                continue;
            }
            if date.is_none() {
                pending_errors.push(format!(
                    "Excluding transaction with no usable date: {}",
                    activity.identifier
                ));
                removed.push(index);
                continue;
            }

            // Valuable but not attributable: still feeds factoring totals.
            if !in_window || !aid_ok {
                skipped.push(index);
            }
        }

        if removed.len() == activity.transactions.len() {
            return ActivityScreen::Excluded;
        }
        if !signalled && !latches.all() {
            return ActivityScreen::Excluded;
        }

        for message in pending_errors {
            errors.add(message);
        }
        ActivityScreen::Kept { removed, skipped }
    }

    /// Convert the surviving transactions to USD. The valuation date is the
    /// value date, falling back to the transaction date; a conversion
    /// failure or a zero USD value drops the transaction. Indices on the
    /// `skipped` list are valued but flagged non-attributable. Values above
    /// the sanity threshold are reported but kept, unless the activity is
    /// on the allow list.
    pub fn value_transactions(
        &self,
        activity: &ActivityRecord,
        removed: &[usize],
        skipped: &[usize],
        converter: &dyn UsdConverter,
        errors: &mut ErrorsOnExit,
    ) -> (Vec<ValuedTransaction>, usize) {
        let mut kept = Vec::new();
        let mut dropped = removed.len();

        for (index, transaction) in activity.transactions.iter().enumerate() {
            if removed.contains(&index) {
                continue;
            }
            // Screening guarantees these for non-removed transactions.
            let Some(kind) = transaction
                .transaction_type
                .as_deref()
                .and_then(TransactionKind::from_code)
            else {
                dropped += 1;
                continue;
            };
            let Some(date) = date_with_fallback(
                transaction.date.as_deref(),
                transaction.value_date.as_deref(),
            ) else {
                dropped += 1;
                continue;
            };
            let Some(valuation_date) = date_with_fallback(
                transaction.value_date.as_deref(),
                transaction.date.as_deref(),
            ) else {
                dropped += 1;
                continue;
            };
            let value = transaction.value.unwrap_or(0.0);
            let currency = transaction.currency.as_deref().unwrap_or("");

            let usd_value = match converter.to_usd(value, currency, valuation_date) {
                Ok(usd_value) => usd_value,
                Err(error) => {
                    errors.add(format!(
                        "Unable to convert from {currency} in {}: {error}",
                        activity.identifier
                    ));
                    dropped += 1;
                    continue;
                }
            };
            if usd_value == 0.0 {
                dropped += 1;
                continue;
            }
            if usd_value.abs() > self.usd_error_threshold
                && !self.rules.allow_activity_ids.contains(&activity.identifier)
            {
                errors.add(format!(
                    "Very large transaction in {}: US${usd_value:.0}",
                    activity.identifier
                ));
            }

            kept.push(ValuedTransaction {
                index,
                kind,
                date,
                month: Month::from_date(date),
                usd_value,
                attributable: !skipped.contains(&index),
            });
        }

        (kept, dropped)
    }
}
