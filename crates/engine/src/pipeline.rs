use std::collections::{BTreeMap, BTreeSet};

use aidflow_core::{
    country_or_region_splits, sector_splits, ActivityRecord, NameTables, OrgRegistry,
};

use crate::attribute::{
    attribute, ActivityContext, FlowContribution, FlowKey, FlowRecord, TransactionRow,
};
use crate::currency::UsdConverter;
use crate::errors::ErrorsOnExit;
use crate::factor::{CategorizedTotals, NetFactors};
use crate::filter::{ActivityScreen, InclusionFilter};

/// Fallback split codes when an activity declares nothing at all.
#[derive(Debug, Clone)]
pub struct FallbackCodes {
    pub country: String,
    pub sector: String,
}

/// One reporting organization actually used during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportingOrgRow {
    pub ref_id: String,
    pub name: String,
}

/// Everything a run produces: sorted transaction rows, deduplicated flows,
/// the reporting-org audit list, and the skipped-transaction count.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub transactions: Vec<TransactionRow>,
    pub flows: Vec<FlowRecord>,
    pub reporting_orgs: Vec<ReportingOrgRow>,
    pub skipped: usize,
}

struct FlowAccumulator {
    record: FlowRecord,
    total: f64,
}

/// The per-run orchestrator: registers org identities in two preparatory
/// passes, then screens, values, factors and attributes each activity in
/// record order.
pub struct Pipeline {
    filter: InclusionFilter,
    registry: OrgRegistry,
    names: NameTables,
    fallbacks: FallbackCodes,
}

impl Pipeline {
    pub fn new(
        filter: InclusionFilter,
        registry: OrgRegistry,
        names: NameTables,
        fallbacks: FallbackCodes,
    ) -> Self {
        Pipeline {
            filter,
            registry,
            names,
            fallbacks,
        }
    }

    /// Reporting orgs first, then participating orgs, each pass in reverse
    /// record order so the earliest-read record wins a naming tie.
    fn register_orgs(&mut self, records: &[ActivityRecord]) {
        for activity in records.iter().rev() {
            if let Some(org) = &activity.reporting_org {
                self.registry.register(org, false);
            }
        }
        for activity in records.iter().rev() {
            for org in &activity.participating_orgs {
                self.registry.register(org, true);
            }
        }
    }

    pub fn run(
        &mut self,
        records: &[ActivityRecord],
        converter: &dyn UsdConverter,
        errors: &mut ErrorsOnExit,
    ) -> RunOutput {
        self.register_orgs(records);
        tracing::info!(activities = records.len(), "starting attribution run");

        let mut seen_ids: BTreeSet<&str> = BTreeSet::new();
        let mut rows: Vec<TransactionRow> = Vec::new();
        let mut flows: BTreeMap<FlowKey, FlowAccumulator> = BTreeMap::new();
        let mut skipped = 0usize;

        for (count, activity) in records.iter().enumerate() {
            if count > 0 && count % 1000 == 0 {
                tracing::info!("processed {count} activities");
            }
            if !seen_ids.insert(&activity.identifier) {
                continue;
            }
            if self.filter.specific_exclusions(activity, errors) {
                continue;
            }
            let (removed, deferred) = match self.filter.exclude_activity(activity, errors) {
                ActivityScreen::Excluded => continue,
                ActivityScreen::Kept { removed, skipped } => (removed, skipped),
            };
            let (valued, dropped) =
                self.filter
                    .value_transactions(activity, &removed, &deferred, converter, errors);
            skipped += dropped;
            if valued.is_empty() {
                continue;
            }

            let reporting = self.registry.resolve(activity.reporting_org.as_ref(), true);
            let is_strict = self.filter.theme().activity_strict(activity, errors);
            let totals = CategorizedTotals::from_transactions(&valued);
            let context = ActivityContext {
                identifier: activity.identifier.clone(),
                reporting,
                is_strict,
                is_humanitarian: activity.humanitarian.unwrap_or(false),
                country_splits: country_or_region_splits(
                    &activity.recipient_countries,
                    &activity.recipient_regions,
                    None,
                    &self.fallbacks.country,
                ),
                sector_splits: sector_splits(&activity.sectors, None, &self.fallbacks.sector),
                factors: NetFactors::compute(&totals),
                fallback_country: self.fallbacks.country.clone(),
                fallback_sector: self.fallbacks.sector.clone(),
            };

            // Non-attributable transactions have already served their
            // purpose in the factoring totals above.
            for transaction in &valued {
                if !transaction.attributable {
                    skipped += 1;
                    continue;
                }
                let outcome = attribute(
                    activity,
                    &context,
                    transaction,
                    self.filter.theme(),
                    &mut self.registry,
                    &self.names,
                );
                rows.extend(outcome.rows);
                if let Some(flow) = outcome.flow {
                    let FlowContribution {
                        key,
                        reporting,
                        provider,
                        receiver,
                        usd_value,
                    } = flow;
                    let (is_humanitarian, is_strict, direction) =
                        (key.is_humanitarian, key.is_strict, key.direction);
                    flows
                        .entry(key)
                        .and_modify(|acc| acc.total += usd_value)
                        .or_insert_with(|| FlowAccumulator {
                            record: FlowRecord {
                                reporting,
                                provider,
                                receiver,
                                is_humanitarian,
                                is_strict,
                                direction,
                                total: 0,
                            },
                            total: usd_value,
                        });
                }
            }
        }

        rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        // The flow map iterates in key order, which starts with reporting
        // org name then ref; totals round at emission time only.
        let flows = flows
            .into_values()
            .map(|acc| FlowRecord {
                total: acc.total.round() as i64,
                ..acc.record
            })
            .collect();

        let reporting_orgs = self
            .registry
            .used_reporting_orgs()
            .map(|(name, ref_id)| ReportingOrgRow {
                ref_id: ref_id.clone(),
                name: name.clone(),
            })
            .collect();

        tracing::info!(
            transactions = rows.len(),
            skipped,
            "attribution run complete"
        );

        RunOutput {
            transactions: rows,
            flows,
            reporting_orgs,
            skipped,
        }
    }
}
