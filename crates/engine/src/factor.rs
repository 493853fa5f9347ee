use aidflow_core::{Classification, Direction};

use crate::filter::ValuedTransaction;

/// USD totals over one activity's surviving transactions, bucketed by
/// direction and classification.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategorizedTotals {
    pub incoming_commitments: f64,
    pub incoming_funds: f64,
    pub outgoing_commitments: f64,
    pub outgoing_spending: f64,
}

impl CategorizedTotals {
    pub fn from_transactions(transactions: &[ValuedTransaction]) -> Self {
        let mut totals = CategorizedTotals::default();
        for transaction in transactions {
            let bucket = match (
                transaction.kind.direction,
                transaction.kind.classification,
            ) {
                (Direction::Incoming, Classification::Commitments) => {
                    &mut totals.incoming_commitments
                }
                (Direction::Incoming, Classification::Spending) => &mut totals.incoming_funds,
                (Direction::Outgoing, Classification::Commitments) => {
                    &mut totals.outgoing_commitments
                }
                (Direction::Outgoing, Classification::Spending) => &mut totals.outgoing_spending,
            };
            *bucket += transaction.usd_value;
        }
        totals
    }
}

/// Scalars in [0, 1] converting gross outgoing values into net new money.
///
/// Money already reported as incoming is assumed to fund the earliest
/// outgoing commitments/spending first; only the excess is attributable to
/// the reporting org. Known caveat: this can double count when
/// humanitarian/strict status varies across transactions within one
/// activity. The approximation is kept as-is; downstream consumers depend
/// on these numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetFactors {
    pub commitments: f64,
    pub spending: f64,
}

fn factor(outgoing: f64, incoming: f64) -> f64 {
    if incoming == 0.0 {
        1.0
    } else if outgoing > incoming {
        (outgoing - incoming) / outgoing
    } else {
        0.0
    }
}

impl NetFactors {
    pub fn compute(totals: &CategorizedTotals) -> Self {
        let incoming = totals
            .incoming_commitments
            .max(totals.incoming_funds)
            .max(0.0);
        NetFactors {
            commitments: factor(totals.outgoing_commitments, incoming),
            spending: factor(totals.outgoing_spending, incoming),
        }
    }

    pub fn for_classification(&self, classification: Classification) -> f64 {
        match classification {
            Classification::Commitments => self.commitments,
            Classification::Spending => self.spending,
        }
    }
}
