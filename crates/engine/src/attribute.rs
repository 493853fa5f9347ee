use aidflow_core::{
    country_or_region_splits, sector_splits, ActivityRecord, Classification, Direction, Month,
    NameTables, OrgIdentity, OrgRegistry, SplitMap,
};

use crate::factor::NetFactors;
use crate::filter::ValuedTransaction;
use crate::theme::Theme;

/// IATI participating-org roles used for counterparty substitution.
const ROLE_FUNDER: &str = "1";
const ROLE_IMPLEMENTER: &str = "4";

/// Activity-level state computed once and applied to every transaction.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub identifier: String,
    pub reporting: OrgIdentity,
    pub is_strict: bool,
    pub is_humanitarian: bool,
    pub country_splits: SplitMap,
    pub sector_splits: SplitMap,
    pub factors: NetFactors,
    pub fallback_country: String,
    pub fallback_sector: String,
}

/// One output transaction row, post-split. `net_money` is absent for
/// incoming transactions, which never contribute new money.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRow {
    pub month: Month,
    pub org: OrgIdentity,
    pub sector_name: String,
    pub country_name: String,
    pub is_humanitarian: bool,
    pub is_strict: bool,
    pub classification: Classification,
    pub activity_id: String,
    pub net_money: Option<i64>,
    pub total_money: i64,
}

impl TransactionRow {
    /// Total ordering for output; every field participates so the sort is
    /// stable across runs.
    pub fn sort_key(
        &self,
    ) -> (
        &Month,
        &str,
        &str,
        bool,
        bool,
        Classification,
        &str,
        Option<i64>,
        i64,
    ) {
        (
            &self.month,
            self.sector_name.as_str(),
            self.country_name.as_str(),
            self.is_humanitarian,
            self.is_strict,
            self.classification,
            self.activity_id.as_str(),
            self.net_money,
            self.total_money,
        )
    }
}

/// Aggregation key for the flow map. A named struct rather than a tuple so
/// theme variants cannot silently reorder fields. Field order doubles as
/// the output sort order: reporting org name first, then ref.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlowKey {
    pub reporting_org_name: String,
    pub reporting_org_ref: Option<String>,
    pub provider_name: String,
    pub provider_ref: Option<String>,
    pub receiver_name: String,
    pub receiver_ref: Option<String>,
    pub is_humanitarian: bool,
    pub is_strict: bool,
    pub direction: Direction,
}

/// One transaction's contribution to the flow map, in unsplit USD.
#[derive(Debug, Clone)]
pub struct FlowContribution {
    pub key: FlowKey,
    pub reporting: OrgIdentity,
    pub provider: OrgIdentity,
    pub receiver: OrgIdentity,
    pub usd_value: f64,
}

/// A deduplicated org-to-org money flow, summed over the run.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub reporting: OrgIdentity,
    pub provider: OrgIdentity,
    pub receiver: OrgIdentity,
    pub is_humanitarian: bool,
    pub is_strict: bool,
    pub direction: Direction,
    pub total: i64,
}

pub struct AttributionOutcome {
    pub rows: Vec<TransactionRow>,
    pub flow: Option<FlowContribution>,
}

fn round_money(value: f64) -> i64 {
    value.round() as i64
}

/// Attribute one valued transaction: net-money factoring, classification
/// flags, counterparty resolution, and fan-out over country and sector
/// splits.
pub fn attribute(
    activity: &ActivityRecord,
    context: &ActivityContext,
    valued: &ValuedTransaction,
    theme: &Theme,
    registry: &mut OrgRegistry,
    names: &NameTables,
) -> AttributionOutcome {
    let transaction = &activity.transactions[valued.index];
    let kind = valued.kind;

    let net_value = if kind.is_outgoing() {
        Some(valued.usd_value * context.factors.for_classification(kind.classification))
    } else {
        None
    };
    let is_humanitarian = transaction.humanitarian.unwrap_or(context.is_humanitarian);
    let is_strict = context.is_strict || theme.transaction_strict(transaction);

    let mut provider = registry.resolve(transaction.provider_org.as_ref(), false);
    if kind.direction == Direction::Incoming && provider.name == registry.default_org() {
        if let Some(funder) = activity.participant_with_role(ROLE_FUNDER) {
            provider = registry.resolve(Some(funder), false);
        }
    }
    let mut receiver = registry.resolve(transaction.receiver_org.as_ref(), false);
    if kind.direction == Direction::Outgoing && receiver.name == registry.default_org() {
        if let Some(implementer) = activity.participant_with_role(ROLE_IMPLEMENTER) {
            receiver = registry.resolve(Some(implementer), false);
        }
    }

    // A flow edge only makes sense for actual spending between distinct,
    // known organizations; intra-org transfers and transfers involving an
    // unknown counterparty are not flows.
    let reporting_name = &context.reporting.name;
    let flow = if kind.classification == Classification::Spending
        && reporting_name != &provider.name
        && reporting_name != &receiver.name
        && reporting_name != registry.default_org()
    {
        Some(FlowContribution {
            key: FlowKey {
                reporting_org_name: context.reporting.name.clone(),
                reporting_org_ref: context.reporting.ref_id.clone(),
                provider_name: provider.name.clone(),
                provider_ref: provider.ref_id.clone(),
                receiver_name: receiver.name.clone(),
                receiver_ref: receiver.ref_id.clone(),
                is_humanitarian,
                is_strict,
                direction: kind.direction,
            },
            reporting: context.reporting.clone(),
            provider,
            receiver,
            usd_value: valued.usd_value,
        })
    } else {
        None
    };

    let country_splits = country_or_region_splits(
        &transaction.recipient_countries,
        &transaction.recipient_regions,
        Some(&context.country_splits),
        &context.fallback_country,
    );
    let tx_sector_splits = sector_splits(
        &transaction.sectors,
        Some(&context.sector_splits),
        &context.fallback_sector,
    );

    let mut rows = Vec::new();
    for (country_code, country_fraction) in &country_splits {
        for (sector_code, sector_fraction) in &tx_sector_splits {
            let fraction = country_fraction * sector_fraction;
            let net_money = net_value.map(|net| round_money(net * fraction));
            let total_money = round_money(valued.usd_value * fraction);
            if net_money.unwrap_or(0) == 0 && total_money == 0 {
                continue;
            }
            rows.push(TransactionRow {
                month: valued.month.clone(),
                org: context.reporting.clone(),
                sector_name: names.sector_group_name(sector_code),
                country_name: names.country_or_region_name(country_code),
                is_humanitarian,
                is_strict,
                classification: kind.classification,
                activity_id: context.identifier.clone(),
                net_money,
                total_money,
            });
        }
    }

    AttributionOutcome { rows, flow }
}
