//! Renders batch results for stdout.

use engine::{ReconciliationResult, SpendResult};

type Error = Box<dyn std::error::Error + Send + Sync>;

/// `Login,Costs` rows; failed accounts keep their zero cost and a status.
pub fn spend_csv(results: &[SpendResult]) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Login", "Costs", "Status"])?;
    for result in results {
        let status = match result.failure() {
            Some(reason) => reason.to_string(),
            None => "ok".to_string(),
        };
        writer.write_record([
            result.login.clone(),
            result.cost.to_string(),
            status,
        ])?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

pub fn reconciliation_csv(results: &[ReconciliationResult]) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Login",
        "TotalSpend",
        "SearchSpend",
        "RsyOutsideRfSpend",
        "ExcludedSum",
        "CommissionBaseSum",
        "CommissionSum",
        "Degraded",
    ])?;
    for result in results {
        let degraded: Vec<String> = result
            .degraded
            .iter()
            .map(|query| format!("{:?}: {}", query.category, query.reason))
            .collect();
        writer.write_record([
            result.login.clone(),
            result.total_spend.to_string(),
            result.search_spend.to_string(),
            result.rsy_outside_rf_spend.to_string(),
            result.excluded_sum.to_string(),
            result.commission_base_sum.to_string(),
            result.commission_sum.to_string(),
            degraded.join("; "),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
