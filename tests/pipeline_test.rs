use binance_tatax::{
    AppError, Config, CsvHistorySource, DailyPriceTable, EventSource, Pipeline, PriceTable,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const HISTORY: &str = "\
User_ID,UTC_Time,Account,Operation,Coin,Change,Remark
7,2025-01-01 00:30:00,Spot,Deposit,EUR,100,
7,2025-01-01 01:00:00,Cross Margin,Margin Loan,BTC,1.5,
7,2025-01-01 02:00:00,Cross Margin,Transaction Sold,BTC,-1,
7,2025-01-01 02:00:00,Cross Margin,Transaction Revenue,USDC,1000,
7,2025-01-01 03:00:00,Cross Margin,Transaction Sold,BTC,-0.5,
7,2025-01-01 03:00:00,Cross Margin,Transaction Revenue,USDC,500,
7,2025-01-01 04:00:00,Cross Margin,Transaction Spend,USDC,-1500,
7,2025-01-01 04:00:00,Cross Margin,Transaction Buy,BTC,1.65,
7,2025-01-01 05:00:00,Cross Margin,Margin Repayment,BTC,-1.5,
";

const PRICES: &str = "\
Symbol,Date,Open,High,Low,Close,Volume
BTC,2025-01-01 00:00,90000,91000,89000,90000,10
USDC,2025-01-01 00:00,1.05,1.05,1.05,1.04,10
";

fn config(input: &Path, output: &Path, label: &str) -> Config {
    let mut env = HashMap::new();
    env.insert("INPUT_DIR".to_string(), input.display().to_string());
    env.insert("OUTPUT_DIR".to_string(), output.display().to_string());
    env.insert("RUN_LABEL".to_string(), label.to_string());
    Config::from_env_map(env).unwrap()
}

async fn run(input: &Path, output: &Path, label: &str) -> Result<binance_tatax::RunReport, AppError> {
    let config = config(input, output, label);
    let prices = DailyPriceTable::load_dir(&config.input_dir, &config.inverted_price_symbols)?;
    let source: Arc<dyn EventSource> = Arc::new(CsvHistorySource::new(
        config.input_dir.clone(),
        config.skip_coins.clone(),
    ));
    let prices: Arc<dyn PriceTable> = Arc::new(prices);
    Pipeline::new(config, source, prices).run().await
}

fn input_dir(history: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("history.csv"), history).unwrap();
    std::fs::write(dir.path().join("market.prices"), PRICES).unwrap();
    dir
}

#[tokio::test]
async fn test_pipeline_writes_exports_and_summary() {
    let input = input_dir(HISTORY);
    let output = TempDir::new().unwrap();

    let report = run(input.path(), output.path(), "first").await.unwrap();

    let run_dir = output.path().join("first");
    for name in [
        "first_TataxAdaptedByTimeStamp_2025.csv",
        "first_NotAdaptedByTimeStamp_2025.csv",
        "first_CrossMarginLedger_2025.csv",
        "first_CrossMarginProfitAndLosses_2025.csv",
        "summary.json",
    ] {
        assert!(run_dir.join(name).exists(), "missing {}", name);
    }
    assert!(!run_dir.join("first_SpotLedger_2025.csv").exists());
    assert_eq!(report.written.len(), 5);

    let pnl = std::fs::read_to_string(run_dir.join("first_CrossMarginProfitAndLosses_2025.csv")).unwrap();
    let rows: Vec<&str> = pnl.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.starts_with("BTC,,2025-01-01 04:00:00,CREDIT,")));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["run_label"], "first");
    assert_eq!(summary["raw_event_count"], 9);
    let account = &summary["accounts"][0];
    assert_eq!(account["account"], "Cross Margin");
    let realized = account["realized_by_coin"]["BTC"].as_f64().unwrap();
    assert!((realized - 0.15).abs() < 1e-12);
    let valued = account["realized_countervalue"]["BTC"].as_f64().unwrap();
    assert!((valued - 13500.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_rerun_is_byte_identical() {
    let input = input_dir(HISTORY);
    let output = TempDir::new().unwrap();

    run(input.path(), output.path(), "a").await.unwrap();
    run(input.path(), output.path(), "b").await.unwrap();

    for suffix in [
        "CrossMarginLedger_2025.csv",
        "CrossMarginProfitAndLosses_2025.csv",
        "TataxAdaptedByTimeStamp_2025.csv",
    ] {
        let first = std::fs::read(output.path().join("a").join(format!("a_{}", suffix))).unwrap();
        let second = std::fs::read(output.path().join("b").join(format!("b_{}", suffix))).unwrap();
        assert_eq!(first, second, "{} differs between runs", suffix);
    }
}

#[tokio::test]
async fn test_incoherent_input_aborts_before_output() {
    let history = "\
User_ID,UTC_Time,Account,Operation,Coin,Change,Remark
7,2025-01-01 02:00:00,Cross Margin,Transaction Sold,BTC,-1,
7,2025-01-01 02:00:00,Cross Margin,Transaction Revenue,USDC,1000,
";
    let input = input_dir(history);
    let output = TempDir::new().unwrap();

    let err = run(input.path(), output.path(), "broken").await.unwrap_err();
    assert!(matches!(err, AppError::Coherence(_)), "got {}", err);
    assert!(!output.path().join("broken").exists());
}

#[tokio::test]
async fn test_wrong_sign_is_rejected() {
    let history = "\
User_ID,UTC_Time,Account,Operation,Coin,Change,Remark
7,2025-01-01 01:00:00,Cross Margin,Margin Loan,BTC,-1.5,
";
    let input = input_dir(history);
    let output = TempDir::new().unwrap();

    let err = run(input.path(), output.path(), "signs").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {}", err);
}
