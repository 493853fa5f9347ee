use std::path::Path;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use aidflow_engine::{FlowRecord, ReportingOrgRow, RunOutput, TransactionRow};

use crate::config::OutputSpec;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("failed to serialize {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn transaction_fields(row: &TransactionRow) -> Vec<String> {
    vec![
        row.month.to_string(),
        opt(&row.org.ref_id).to_string(),
        row.org.name.clone(),
        opt(&row.org.org_type).to_string(),
        row.sector_name.clone(),
        row.country_name.clone(),
        flag(row.is_humanitarian).to_string(),
        flag(row.is_strict).to_string(),
        row.classification.to_string(),
        row.activity_id.clone(),
        row.net_money.map(|n| n.to_string()).unwrap_or_default(),
        row.total_money.to_string(),
    ]
}

fn flow_fields(flow: &FlowRecord) -> Vec<String> {
    vec![
        opt(&flow.reporting.ref_id).to_string(),
        flow.reporting.name.clone(),
        opt(&flow.reporting.org_type).to_string(),
        opt(&flow.provider.ref_id).to_string(),
        flow.provider.name.clone(),
        opt(&flow.provider.org_type).to_string(),
        opt(&flow.receiver.ref_id).to_string(),
        flow.receiver.name.clone(),
        opt(&flow.receiver.org_type).to_string(),
        flag(flow.is_humanitarian).to_string(),
        flag(flow.is_strict).to_string(),
        flow.direction.to_string(),
        flow.total.to_string(),
    ]
}

fn reporting_org_fields(org: &ReportingOrgRow) -> Vec<String> {
    vec![org.ref_id.clone(), org.name.clone()]
}

/// Write one CSV artifact: header row, HXL-tag row, then data rows.
fn write_csv<T>(
    dir: &Path,
    spec: &OutputSpec,
    rows: &[T],
    fields: impl Fn(&T) -> Vec<String>,
) -> Result<(), OutputError> {
    let path = dir.join(&spec.filename);
    let display = path.display().to_string();
    let mut writer = csv::Writer::from_path(&path).map_err(|source| OutputError::Csv {
        path: display.clone(),
        source,
    })?;
    let write =
        |writer: &mut csv::Writer<std::fs::File>, record: &[String]| -> Result<(), OutputError> {
            writer.write_record(record).map_err(|source| OutputError::Csv {
                path: display.clone(),
                source,
            })
        };
    write(&mut writer, &spec.headers)?;
    write(&mut writer, &spec.hxl_tags)?;
    for row in rows {
        write(&mut writer, &fields(row))?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: display,
        source,
    })
}

#[derive(Serialize)]
struct JsonEnvelope {
    metadata: serde_json::Value,
    transactions: Vec<Vec<String>>,
    flows: Vec<Vec<String>>,
    reporting_orgs: Vec<Vec<String>>,
}

/// Write all four artifacts for a finished run.
pub fn write_all(
    dir: &Path,
    output: &RunOutput,
    theme: &str,
    run_date: &str,
    transactions_spec: &OutputSpec,
    flows_spec: &OutputSpec,
    reporting_orgs_spec: &OutputSpec,
    json_filename: &str,
) -> Result<(), OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    write_csv(dir, transactions_spec, &output.transactions, transaction_fields)?;
    write_csv(dir, flows_spec, &output.flows, flow_fields)?;
    write_csv(
        dir,
        reporting_orgs_spec,
        &output.reporting_orgs,
        reporting_org_fields,
    )?;

    let path = dir.join(json_filename);
    let envelope = JsonEnvelope {
        metadata: json!({
            "theme": theme,
            "run_date": run_date,
            "transaction_count": output.transactions.len(),
            "flow_count": output.flows.len(),
            "reporting_org_count": output.reporting_orgs.len(),
            "skipped_transactions": output.skipped,
        }),
        transactions: output.transactions.iter().map(transaction_fields).collect(),
        flows: output.flows.iter().map(flow_fields).collect(),
        reporting_orgs: output.reporting_orgs.iter().map(reporting_org_fields).collect(),
    };
    let text = serde_json::to_string_pretty(&envelope).map_err(|source| OutputError::Json {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(&path, text).map_err(|source| OutputError::Io {
        path: path.display().to_string(),
        source,
    })
}
