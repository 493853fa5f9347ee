use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use aidflow_core::{
    ActivityRecord, CodedItem, DateRange, NameTables, Narrative, OrgRef, OrgRegistry, SectorTable,
    TransactionRecord,
};
use aidflow_engine::{
    ErrorsOnExit, FallbackCodes, InclusionFilter, Pipeline, RateTable, RunOutput, SkipRules, Theme,
};

const DEFAULT_ORG: &str = "(Unspecified org)";

fn org(ref_id: &str, name: &str) -> OrgRef {
    OrgRef {
        ref_id: Some(ref_id.to_string()),
        name: Some(Narrative::plain(name)),
        ..Default::default()
    }
}

fn covid_scope() -> CodedItem {
    CodedItem {
        code: Some("HCOVD20".to_string()),
        vocabulary: Some("2-1".to_string()),
        item_type: Some("2".to_string()),
        ..Default::default()
    }
}

fn transaction(tx_type: &str, value: f64, currency: &str, date: &str) -> TransactionRecord {
    TransactionRecord {
        transaction_type: Some(tx_type.to_string()),
        value: Some(value),
        currency: Some(currency.to_string()),
        date: Some(date.to_string()),
        ..Default::default()
    }
}

fn fixture() -> Vec<ActivityRecord> {
    let mut disbursement = transaction("3", 150.0, "USD", "2020-06-01");
    disbursement.receiver_org = Some(org("XM-DAC-2", "Receiver Org"));
    let mut self_transfer = transaction("3", 75.0, "USD", "2020-07-01");
    self_transfer.receiver_org = Some(org("XM-DAC-1", "Alpha Aid Agency"));

    vec![
        // In scope: COVID HRP code, one external flow and one self-flow.
        ActivityRecord {
            identifier: "XM-DAC-1-COVID".to_string(),
            reporting_org: Some(org("XM-DAC-1", "Alpha Aid Agency")),
            humanitarian_scopes: vec![covid_scope()],
            recipient_countries: vec![CodedItem::coded("KE")],
            sectors: vec![CodedItem {
                code: Some("12110".to_string()),
                vocabulary: Some("1".to_string()),
                ..Default::default()
            }],
            transactions: vec![
                transaction("1", 50.0, "USD", "2020-05-01"),
                disbursement,
                self_transfer,
                // Out of window: feeds the factoring totals but is never
                // attributed.
                transaction("3", 10.0, "USD", "2019-01-01"),
            ],
            ..Default::default()
        },
        // In scope via title text, second reporting org.
        ActivityRecord {
            identifier: "XM-DAC-9-RESPONSE".to_string(),
            reporting_org: Some(org("XM-DAC-9", "Beta Relief Fund")),
            title: Some(Narrative::plain("COVID-19 emergency response")),
            humanitarian: Some(true),
            transactions: vec![transaction("4", 200.0, "EUR", "2020-08-15")],
            ..Default::default()
        },
        // No COVID signal anywhere and its start date is out of window:
        // must be excluded entirely.
        ActivityRecord {
            identifier: "XM-DAC-9-ROADS".to_string(),
            reporting_org: Some(org("XM-DAC-9", "Beta Relief Fund")),
            title: Some(Narrative::plain("Rural road construction")),
            start_date_actual: Some("2015-01-01".to_string()),
            transactions: vec![transaction("3", 999.0, "USD", "2015-06-01")],
            ..Default::default()
        },
    ]
}

fn names() -> NameTables {
    let mut groups = BTreeMap::new();
    groups.insert("121".to_string(), "Health".to_string());
    let mut countries = BTreeMap::new();
    countries.insert("KE".to_string(), "Kenya".to_string());
    NameTables::new(
        SectorTable::Grouped(groups),
        countries,
        BTreeMap::new(),
        "(Unspecified sector)",
        "(Unspecified country)",
    )
}

fn converter() -> RateTable {
    let mut fallback = BTreeMap::new();
    fallback.insert("EUR".to_string(), 0.8);
    RateTable::with_static(fallback)
}

fn run(errors: &mut ErrorsOnExit) -> RunOutput {
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2020, 1, 1),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
    );
    let filter = InclusionFilter::new(Theme::covid(), SkipRules::default(), range, 1e9);
    let registry = OrgRegistry::new(BTreeSet::new(), DEFAULT_ORG);
    let mut pipeline = Pipeline::new(
        filter,
        registry,
        names(),
        FallbackCodes {
            country: "XX".to_string(),
            sector: "99999".to_string(),
        },
    );
    pipeline.run(&fixture(), &converter(), errors)
}

#[test]
fn covid_theme_excludes_unsignalled_activity() {
    let mut errors = ErrorsOnExit::new();
    let output = run(&mut errors);

    let ids: BTreeSet<&str> = output
        .transactions
        .iter()
        .map(|row| row.activity_id.as_str())
        .collect();
    assert!(ids.contains("XM-DAC-1-COVID"));
    assert!(ids.contains("XM-DAC-9-RESPONSE"));
    assert!(!ids.contains("XM-DAC-9-ROADS"));

    // The out-of-window disbursement was skipped at attribution and counted.
    assert_eq!(output.skipped, 1);
}

#[test]
fn flows_contain_no_self_edges() {
    let mut errors = ErrorsOnExit::new();
    let output = run(&mut errors);

    assert!(!output.flows.is_empty());
    for flow in &output.flows {
        assert_ne!(flow.reporting.name, flow.provider.name);
        assert_ne!(flow.reporting.name, flow.receiver.name);
    }
    // The 75 USD transfer back to Alpha Aid Agency itself must not appear.
    assert!(output
        .flows
        .iter()
        .all(|flow| !(flow.reporting.name == "Alpha Aid Agency"
            && flow.receiver.name == "Alpha Aid Agency")));
    // The external disbursement does.
    assert!(output.flows.iter().any(|flow| {
        flow.reporting.name == "Alpha Aid Agency"
            && flow.receiver.name == "Receiver Org"
            && flow.total == 150
    }));
}

#[test]
fn net_money_reflects_incoming_funds() {
    let mut errors = ErrorsOnExit::new();
    let output = run(&mut errors);

    // Alpha's outgoing spending totals 235 (including the out-of-window 10)
    // against 50 incoming, so the spending factor is 185/235. The 150
    // disbursement nets round(150 * 185/235) = 118.
    let row = output
        .transactions
        .iter()
        .find(|row| row.activity_id == "XM-DAC-1-COVID" && row.total_money == 150)
        .unwrap();
    assert_eq!(row.net_money, Some(118));
    assert_eq!(row.sector_name, "Health");
    assert_eq!(row.country_name, "Kenya");
}

#[test]
fn out_of_window_incoming_still_discounts_net_money() {
    let mut incoming = transaction("1", 100.0, "USD", "2019-01-01");
    incoming.provider_org = Some(org("XM-DAC-5", "Donor Org"));
    let mut disbursement = transaction("3", 150.0, "USD", "2020-06-01");
    disbursement.receiver_org = Some(org("XM-DAC-2", "Receiver Org"));
    let records = vec![ActivityRecord {
        identifier: "XM-DAC-1-PRIOR".to_string(),
        reporting_org: Some(org("XM-DAC-1", "Alpha Aid Agency")),
        humanitarian_scopes: vec![covid_scope()],
        transactions: vec![incoming, disbursement],
        ..Default::default()
    }];

    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2020, 1, 1),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
    );
    let filter = InclusionFilter::new(Theme::covid(), SkipRules::default(), range, 1e9);
    let registry = OrgRegistry::new(BTreeSet::new(), DEFAULT_ORG);
    let mut pipeline = Pipeline::new(
        filter,
        registry,
        names(),
        FallbackCodes {
            country: "XX".to_string(),
            sector: "99999".to_string(),
        },
    );
    let mut errors = ErrorsOnExit::new();
    let output = pipeline.run(&records, &converter(), &mut errors);

    // The incoming funds predate the window, so they produce no row, but
    // they still count against new money: factor (150 - 100) / 150, so
    // the disbursement nets 50 rather than its full 150.
    assert_eq!(output.skipped, 1);
    let row = output
        .transactions
        .iter()
        .find(|row| row.activity_id == "XM-DAC-1-PRIOR" && row.total_money == 150)
        .unwrap();
    assert_eq!(row.net_money, Some(50));
    assert!(output
        .transactions
        .iter()
        .all(|row| row.month.as_str() != "2019-01"));
}

#[test]
fn currency_converted_and_humanitarian_inherited() {
    let mut errors = ErrorsOnExit::new();
    let output = run(&mut errors);

    let row = output
        .transactions
        .iter()
        .find(|row| row.activity_id == "XM-DAC-9-RESPONSE")
        .unwrap();
    // 200 EUR at 0.8 per USD.
    assert_eq!(row.total_money, 250);
    assert!(row.is_humanitarian);
    assert!(row.is_strict);
    assert_eq!(row.month.as_str(), "2020-08");
}

#[test]
fn reporting_orgs_audited() {
    let mut errors = ErrorsOnExit::new();
    let output = run(&mut errors);

    let names: Vec<&str> = output
        .reporting_orgs
        .iter()
        .map(|org| org.name.as_str())
        .collect();
    assert_eq!(names, vec!["Alpha Aid Agency", "Beta Relief Fund"]);
}

#[test]
fn runs_are_deterministic() {
    let mut errors = ErrorsOnExit::new();
    let first = run(&mut errors);
    let second = run(&mut errors);
    assert_eq!(
        format!("{:?}", first.transactions),
        format!("{:?}", second.transactions)
    );
    assert_eq!(format!("{:?}", first.flows), format!("{:?}", second.flows));
    assert_eq!(first.skipped, second.skipped);
}
