use std::time::Duration;

use engine::{BatchRunner, CancellationToken, ReconciliationEngine, ReportFetcher, SpendQuery};
use report_client::ReportClient;
use settings::Output;

mod output;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "spendrecon={level},engine={level},report_client={level}",
            level = settings.app.level
        ))
        .init();

    let accounts = settings.accounts();
    if accounts.is_empty() {
        tracing::warn!("No accounts configured, nothing to do");
        return Ok(());
    }
    let range = settings.range()?;

    let mut client = ReportClient::builder();
    if let Some(url) = &settings.service.url {
        client = client.url(url);
    }
    if let Some(language) = &settings.service.language {
        client = client.language(language);
    }
    if let Some(secs) = settings.service.timeout_secs {
        client = client.timeout(Duration::from_secs(secs));
    }

    let cancel = CancellationToken::new();
    let fetcher = ReportFetcher::new(client.build()?)
        .with_policy(settings.fetch_policy())
        .with_cancellation(cancel.clone());
    let runner = BatchRunner::new(fetcher, settings.batch_config())?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pending reports...");
            cancel.cancel();
        }
    });

    tracing::info!("Processing {} accounts", accounts.len());
    let rendered = if settings.reconcile.enabled {
        let params = settings.commission()?;
        let results = ReconciliationEngine::new(runner)
            .reconcile(&accounts, range, &params)
            .await;
        for result in results.iter().filter(|r| !r.is_complete()) {
            tracing::warn!(
                "{}: {} queries counted as zero",
                result.login,
                result.degraded.len()
            );
        }
        match settings.app.output {
            Output::Json => serde_json::to_string_pretty(&results)?,
            Output::Csv => output::reconciliation_csv(&results)?,
        }
    } else {
        let results = runner
            .run_all(&accounts, &SpendQuery::total().to_spec(range))
            .await;
        for result in results.iter().filter(|r| r.failure().is_some()) {
            tracing::warn!("{}: spend counted as zero", result.login);
        }
        match settings.app.output {
            Output::Json => serde_json::to_string_pretty(&results)?,
            Output::Csv => output::spend_csv(&results)?,
        }
    };

    println!("{rendered}");
    Ok(())
}
