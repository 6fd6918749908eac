use anyhow::Context;
use binance_tatax::{Config, CsvHistorySource, DailyPriceTable, EventSource, Pipeline, PriceTable};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{:#}", e);
        eprintln!("Run failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    let prices = DailyPriceTable::load_dir(&config.input_dir, &config.inverted_price_symbols)
        .with_context(|| format!("loading prices from {}", config.input_dir.display()))?;
    tracing::info!(entries = prices.len(), "Price table loaded");

    let source: Arc<dyn EventSource> = Arc::new(CsvHistorySource::new(
        config.input_dir.clone(),
        config.skip_coins.clone(),
    ));
    let prices: Arc<dyn PriceTable> = Arc::new(prices);

    let report = Pipeline::new(config, source, prices)
        .run()
        .await
        .context("running ledger pipeline")?;

    for account in &report.summary.accounts {
        for (coin, amount) in &account.realized_by_coin {
            tracing::info!(account = %account.account, coin = %coin, realized = %amount, "Realized P&L");
        }
    }
    Ok(())
}
