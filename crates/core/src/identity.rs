use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::Serialize;

use crate::record::OrgRef;

/// A resolved organization: canonical lowercase identifier (when one is
/// known), preferred display name, and type code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgIdentity {
    pub ref_id: Option<String>,
    pub name: String,
    pub org_type: Option<String>,
}

/// Canonical identity table for organizations seen across a record set.
///
/// Populated once per run (reporting orgs first, then participating orgs,
/// each pass in reverse record order so the earliest-read record wins a
/// naming tie), then read-only during attribution apart from the audit set
/// of reporting orgs actually used.
pub struct OrgRegistry {
    leading_junk: Regex,
    whitespace: Regex,
    /// name lookup key -> refs associated with that name, in registration order
    name_to_refs: BTreeMap<String, Vec<String>>,
    /// name lookup key -> display form first seen for it
    name_display: BTreeMap<String, String>,
    /// ref -> preferred display name (first association wins)
    ref_to_name: BTreeMap<String, String>,
    /// ref -> org type code (first association wins)
    ref_to_type: BTreeMap<String, String>,
    /// refs known to be misreported; trusted only for reporting orgs
    blocklist: BTreeSet<String>,
    default_org: String,
    /// (name, ref) pairs resolved as reporting orgs, for the audit report
    used_reporting_orgs: BTreeSet<(String, String)>,
}

impl OrgRegistry {
    pub fn new(blocklist: BTreeSet<String>, default_org: &str) -> Self {
        OrgRegistry {
            leading_junk: Regex::new(r"^\W+").unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
            name_to_refs: BTreeMap::new(),
            name_display: BTreeMap::new(),
            ref_to_name: BTreeMap::new(),
            ref_to_type: BTreeMap::new(),
            blocklist,
            default_org: default_org.to_string(),
            used_reporting_orgs: BTreeSet::new(),
        }
    }

    pub fn default_org(&self) -> &str {
        &self.default_org
    }

    /// Normalize a display name: drop leading punctuation, collapse runs of
    /// whitespace, trim. Display case is preserved; `name_key` case-folds.
    pub fn clean_name(&self, s: &str) -> String {
        let s = self.leading_junk.replace(s, "");
        let s = self.whitespace.replace_all(&s, " ");
        s.trim().to_string()
    }

    fn name_key(&self, name: &str) -> String {
        name.to_lowercase()
    }

    fn clean_ref(&self, s: &str) -> Option<String> {
        let cleaned = self.clean_name(s).to_lowercase();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    /// Candidate display names in preference order: the English-tagged
    /// narrative, then the default display text, then other translations in
    /// language-tag order. Cleaned, deduplicated, blanks dropped.
    pub fn candidate_names(&self, org: &OrgRef) -> Vec<String> {
        let mut names = Vec::new();
        let mut seen = BTreeSet::new();
        let mut push = |name: String| {
            let cleaned = self.clean_name(&name);
            if cleaned.is_empty() {
                return;
            }
            let key = self.name_key(&cleaned);
            if seen.insert(key) {
                names.push(cleaned);
            }
        };
        if let Some(narrative) = &org.name {
            if let Some(english) = narrative.translations.get("en") {
                push(english.clone());
            }
            push(narrative.text.clone());
            for (lang, text) in &narrative.translations {
                if lang != "en" {
                    push(text.clone());
                }
            }
        }
        names
    }

    /// Record an organization's ref/name/type associations. Existing
    /// associations are never overwritten; new ones are unioned in. A
    /// blocklisted ref supplied by a participating org is ignored so that a
    /// spurious identifier can never become a counterparty identity.
    pub fn register(&mut self, org: &OrgRef, is_participant: bool) {
        let names = self.candidate_names(org);
        let mut ref_id = org.ref_id.as_deref().and_then(|r| self.clean_ref(r));
        if is_participant {
            if let Some(r) = &ref_id {
                if self.blocklist.contains(r) {
                    ref_id = None;
                }
            }
        }

        for name in &names {
            let key = self.name_key(name);
            self.name_display.entry(key.clone()).or_insert_with(|| name.clone());
            let refs = self.name_to_refs.entry(key).or_default();
            if let Some(r) = &ref_id {
                if !refs.iter().any(|existing| existing == r) {
                    refs.push(r.clone());
                }
            }
        }

        if let Some(r) = &ref_id {
            if let Some(first) = names.first() {
                self.ref_to_name.entry(r.clone()).or_insert_with(|| first.clone());
            }
            if let Some(org_type) = &org.org_type {
                self.ref_to_type.entry(r.clone()).or_insert_with(|| org_type.clone());
            }
        }
    }

    /// Resolve an organization reference to a canonical identity.
    ///
    /// Candidate refs are the directly supplied ref plus every ref reachable
    /// through any candidate name. Blocklisted refs are dropped unless the
    /// org is acting as the reporting organization. The first candidate with
    /// a known preferred name wins, else the first candidate, else no ref;
    /// the name falls back to the first candidate name, else the configured
    /// default label.
    pub fn resolve(&mut self, org: Option<&OrgRef>, is_reporting_org: bool) -> OrgIdentity {
        let (names, direct_ref, supplied_type) = match org {
            Some(org) => (
                self.candidate_names(org),
                org.ref_id.as_deref().and_then(|r| self.clean_ref(r)),
                org.org_type.clone(),
            ),
            None => (Vec::new(), None, None),
        };

        let mut candidates: Vec<String> = Vec::new();
        let mut push = |candidates: &mut Vec<String>, r: &str| {
            if !candidates.iter().any(|existing| existing == r) {
                candidates.push(r.to_string());
            }
        };

        if let Some(r) = &direct_ref {
            push(&mut candidates, r);
            // An identifier that is really a name in disguise: not known as
            // a ref, but it matches a name lookup key.
            if !self.ref_to_name.contains_key(r) {
                if let Some(refs) = self.name_to_refs.get(r) {
                    for reachable in refs {
                        push(&mut candidates, reachable);
                    }
                }
            }
        }
        for name in &names {
            if let Some(refs) = self.name_to_refs.get(&self.name_key(name)) {
                for reachable in refs {
                    push(&mut candidates, reachable);
                }
            }
        }

        if is_reporting_org {
            // Prefer non-blocklisted candidates but keep spurious ones as a
            // last resort for the primary actor.
            let (clean, spurious): (Vec<String>, Vec<String>) = candidates
                .into_iter()
                .partition(|r| !self.blocklist.contains(r));
            candidates = clean;
            candidates.extend(spurious);
        } else {
            candidates.retain(|r| !self.blocklist.contains(r));
        }

        let chosen = candidates
            .iter()
            .find(|r| self.ref_to_name.contains_key(*r))
            .or_else(|| candidates.first())
            .cloned();

        let name = chosen
            .as_ref()
            .and_then(|r| self.ref_to_name.get(r))
            .cloned()
            .or_else(|| names.first().cloned())
            .unwrap_or_else(|| self.default_org.clone());

        let org_type = chosen
            .as_ref()
            .and_then(|r| self.ref_to_type.get(r))
            .cloned()
            .or(supplied_type);

        if is_reporting_org && name != self.default_org {
            self.used_reporting_orgs
                .insert((name.clone(), chosen.clone().unwrap_or_default()));
        }

        OrgIdentity {
            ref_id: chosen,
            name,
            org_type,
        }
    }

    /// Reporting orgs actually resolved during the run, sorted by
    /// (name, ref) for the audit output.
    pub fn used_reporting_orgs(&self) -> impl Iterator<Item = &(String, String)> {
        self.used_reporting_orgs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Narrative;

    fn org(ref_id: Option<&str>, name: Option<&str>) -> OrgRef {
        OrgRef {
            ref_id: ref_id.map(|s| s.to_string()),
            name: name.map(Narrative::plain),
            ..Default::default()
        }
    }

    fn registry() -> OrgRegistry {
        OrgRegistry::new(BTreeSet::new(), "(Unspecified org)")
    }

    #[test]
    fn clean_name_normalizes() {
        let registry = registry();
        assert_eq!(registry.clean_name("  -- Example   Org  "), "Example Org");
        assert_eq!(registry.clean_name("Example Org."), "Example Org.");
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = registry();
        let example = org(Some("XM-DAC-1"), Some("Example Org"));
        registry.register(&example, false);
        let before_refs = registry.name_to_refs.clone();
        let before_names = registry.ref_to_name.clone();
        registry.register(&example, false);
        assert_eq!(registry.name_to_refs, before_refs);
        assert_eq!(registry.ref_to_name, before_names);
    }

    #[test]
    fn first_registration_wins_name() {
        let mut registry = registry();
        registry.register(&org(Some("XM-DAC-1"), Some("Example Org")), false);
        registry.register(&org(Some("XM-DAC-1"), Some("Renamed Org")), false);
        let identity = registry.resolve(Some(&org(Some("XM-DAC-1"), None)), false);
        assert_eq!(identity.name, "Example Org");
        assert_eq!(identity.ref_id.as_deref(), Some("xm-dac-1"));
    }

    #[test]
    fn resolve_reaches_ref_through_name() {
        let mut registry = registry();
        registry.register(&org(Some("XM-DAC-1"), Some("Example Org")), false);
        // Same name, no ref: should find the registered identifier.
        let identity = registry.resolve(Some(&org(None, Some("example  org"))), false);
        assert_eq!(identity.ref_id.as_deref(), Some("xm-dac-1"));
        assert_eq!(identity.name, "Example Org");
    }

    #[test]
    fn english_narrative_preferred() {
        let mut registry = registry();
        let mut narrative = Narrative::plain("Organisation Exemple");
        narrative
            .translations
            .insert("en".to_string(), "Example Org".to_string());
        let multilingual = OrgRef {
            ref_id: Some("XM-DAC-1".to_string()),
            name: Some(narrative),
            ..Default::default()
        };
        registry.register(&multilingual, false);
        let identity = registry.resolve(Some(&org(Some("XM-DAC-1"), None)), false);
        assert_eq!(identity.name, "Example Org");
    }

    #[test]
    fn blocklisted_ref_ignored_for_counterparty() {
        let mut blocklist = BTreeSet::new();
        blocklist.insert("xm-dac-bogus".to_string());
        let mut registry = OrgRegistry::new(blocklist, "(Unspecified org)");
        registry.register(&org(Some("XM-DAC-BOGUS"), Some("Reporting Name")), false);

        // As a counterparty the spurious ref must not resolve.
        let counterparty = registry.resolve(Some(&org(Some("XM-DAC-BOGUS"), None)), false);
        assert_eq!(counterparty.ref_id, None);
        assert_eq!(counterparty.name, "(Unspecified org)");

        // As the reporting org it is still trusted.
        let reporting = registry.resolve(Some(&org(Some("XM-DAC-BOGUS"), None)), true);
        assert_eq!(reporting.ref_id.as_deref(), Some("xm-dac-bogus"));
        assert_eq!(reporting.name, "Reporting Name");
    }

    #[test]
    fn blocklisted_participant_ref_never_registered() {
        let mut blocklist = BTreeSet::new();
        blocklist.insert("xm-dac-bogus".to_string());
        let mut registry = OrgRegistry::new(blocklist, "(Unspecified org)");
        registry.register(&org(Some("XM-DAC-BOGUS"), Some("Participant Name")), true);
        assert!(!registry.ref_to_name.contains_key("xm-dac-bogus"));
        // The name is still known, just without a ref.
        let identity = registry.resolve(Some(&org(None, Some("Participant Name"))), false);
        assert_eq!(identity.name, "Participant Name");
        assert_eq!(identity.ref_id, None);
    }

    #[test]
    fn ref_colliding_with_name_treated_as_name() {
        let mut registry = registry();
        registry.register(&org(Some("XM-DAC-1"), Some("Example Org")), false);
        // Identifier field misused to carry the name.
        let misused = registry.resolve(Some(&org(Some("Example Org"), None)), false);
        assert_eq!(misused.ref_id.as_deref(), Some("xm-dac-1"));
        assert_eq!(misused.name, "Example Org");
    }

    #[test]
    fn unresolvable_falls_back_to_default() {
        let mut registry = registry();
        let identity = registry.resolve(None, false);
        assert_eq!(identity.name, "(Unspecified org)");
        assert_eq!(identity.ref_id, None);
        assert_eq!(identity.org_type, None);
    }

    #[test]
    fn used_reporting_orgs_records_non_default() {
        let mut registry = registry();
        registry.register(&org(Some("XM-DAC-1"), Some("Example Org")), false);
        registry.resolve(Some(&org(Some("XM-DAC-1"), None)), true);
        registry.resolve(None, true); // default name: not recorded
        let used: Vec<_> = registry.used_reporting_orgs().cloned().collect();
        assert_eq!(
            used,
            vec![("Example Org".to_string(), "xm-dac-1".to_string())]
        );
    }
}
