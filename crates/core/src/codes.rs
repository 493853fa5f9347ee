use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Incoming => write!(f, "incoming"),
            Direction::Outgoing => write!(f, "outgoing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Classification {
    Commitments,
    Spending,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Commitments => write!(f, "commitments"),
            Classification::Spending => write!(f, "spending"),
        }
    }
}

/// A transaction type we care about, classified by direction and by
/// whether it represents a commitment or actual spending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionKind {
    pub label: &'static str,
    pub classification: Classification,
    pub direction: Direction,
}

impl TransactionKind {
    /// Map an IATI transaction-type code to its kind. Codes outside the
    /// table are not of interest and yield `None`.
    pub fn from_code(code: &str) -> Option<TransactionKind> {
        match code {
            "1" => Some(TransactionKind {
                label: "Incoming Funds",
                classification: Classification::Spending,
                direction: Direction::Incoming,
            }),
            "2" => Some(TransactionKind {
                label: "Outgoing Commitment",
                classification: Classification::Commitments,
                direction: Direction::Outgoing,
            }),
            "3" => Some(TransactionKind {
                label: "Disbursement",
                classification: Classification::Spending,
                direction: Direction::Outgoing,
            }),
            "4" => Some(TransactionKind {
                label: "Expenditure",
                classification: Classification::Spending,
                direction: Direction::Outgoing,
            }),
            "11" => Some(TransactionKind {
                label: "Incoming Commitment",
                classification: Classification::Commitments,
                direction: Direction::Incoming,
            }),
            _ => None,
        }
    }

    pub fn is_outgoing(self) -> bool {
        self.direction == Direction::Outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_classified() {
        let incoming = TransactionKind::from_code("1").unwrap();
        assert_eq!(incoming.direction, Direction::Incoming);
        assert_eq!(incoming.classification, Classification::Spending);

        let commitment = TransactionKind::from_code("2").unwrap();
        assert_eq!(commitment.direction, Direction::Outgoing);
        assert_eq!(commitment.classification, Classification::Commitments);

        let disbursement = TransactionKind::from_code("3").unwrap();
        let expenditure = TransactionKind::from_code("4").unwrap();
        assert!(disbursement.is_outgoing());
        assert_eq!(disbursement.classification, expenditure.classification);

        let incoming_commitment = TransactionKind::from_code("11").unwrap();
        assert_eq!(incoming_commitment.direction, Direction::Incoming);
        assert_eq!(incoming_commitment.classification, Classification::Commitments);
    }

    #[test]
    fn unknown_codes_ignored() {
        assert!(TransactionKind::from_code("5").is_none());
        assert!(TransactionKind::from_code("12").is_none());
        assert!(TransactionKind::from_code("").is_none());
    }

    #[test]
    fn display_lowercase() {
        assert_eq!(Direction::Incoming.to_string(), "incoming");
        assert_eq!(Classification::Spending.to_string(), "spending");
    }
}
