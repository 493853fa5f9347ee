use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A block of free text with optional language-tagged translations.
///
/// `text` is the default display form; `translations` maps ISO language
/// tags to alternative renderings of the same narrative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Narrative {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
}

impl Narrative {
    pub fn plain(text: &str) -> Self {
        Narrative {
            text: text.to_string(),
            translations: BTreeMap::new(),
        }
    }

    /// All text variants: the default form first, then translations in
    /// language-tag order.
    pub fn all_texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.text.as_str()).chain(self.translations.values().map(|s| s.as_str()))
    }
}

/// A coded entry: sectors, recipient countries/regions, humanitarian
/// scopes, policy markers, tags and aid types all share this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodedItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub vocabulary: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub significance: Option<String>,
}

impl CodedItem {
    pub fn coded(code: &str) -> Self {
        CodedItem {
            code: Some(code.to_string()),
            ..Default::default()
        }
    }
}

/// A reference to an organization as it appears in the source data:
/// possibly an identifier, possibly one or more names, possibly a type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgRef {
    #[serde(default, rename = "ref")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub name: Option<Narrative>,
    #[serde(default, rename = "type")]
    pub org_type: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// One dated, valued movement of money within an activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default, rename = "type")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub value_date: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub humanitarian: Option<bool>,
    #[serde(default)]
    pub aid_types: Vec<CodedItem>,
    #[serde(default)]
    pub sectors: Vec<CodedItem>,
    #[serde(default)]
    pub recipient_countries: Vec<CodedItem>,
    #[serde(default)]
    pub recipient_regions: Vec<CodedItem>,
    #[serde(default)]
    pub description: Option<Narrative>,
    #[serde(default)]
    pub provider_org: Option<OrgRef>,
    #[serde(default)]
    pub receiver_org: Option<OrgRef>,
}

/// One aid project/programme record, containing zero or more transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub identifier: String,
    #[serde(default)]
    pub reporting_org: Option<OrgRef>,
    #[serde(default)]
    pub participating_orgs: Vec<OrgRef>,
    #[serde(default)]
    pub humanitarian_scopes: Vec<CodedItem>,
    #[serde(default)]
    pub policy_markers: Vec<CodedItem>,
    #[serde(default)]
    pub tags: Vec<CodedItem>,
    #[serde(default)]
    pub sectors: Vec<CodedItem>,
    #[serde(default)]
    pub title: Option<Narrative>,
    #[serde(default)]
    pub description: Option<Narrative>,
    #[serde(default)]
    pub humanitarian: Option<bool>,
    #[serde(default)]
    pub recipient_countries: Vec<CodedItem>,
    #[serde(default)]
    pub recipient_regions: Vec<CodedItem>,
    #[serde(default)]
    pub secondary_reporter: bool,
    #[serde(default)]
    pub hierarchy: i32,
    #[serde(default)]
    pub default_aid_types: Vec<CodedItem>,
    #[serde(default)]
    pub start_date_actual: Option<String>,
    #[serde(default)]
    pub start_date_planned: Option<String>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

impl ActivityRecord {
    /// First participating org carrying the given IATI role code
    /// ("1" = funder, "4" = implementer).
    pub fn participant_with_role(&self, role: &str) -> Option<&OrgRef> {
        self.participating_orgs
            .iter()
            .find(|org| org.role.as_deref() == Some(role))
    }
}
