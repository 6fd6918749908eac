use crate::domain::{Coin, Decimal};
use crate::engine::LedgerSettings;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub const RUN_LABEL_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub run_label: String,
    pub balance_tolerance: Decimal,
    pub price_tolerance: Decimal,
    pub countervalue_coin: Coin,
    pub skip_coins: Vec<Coin>,
    pub inverted_price_symbols: Vec<Coin>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    /// Build from a variable map. A variable that is set but blank counts as
    /// missing rather than falling back to its default.
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let input_dir = PathBuf::from(get_or(&env_map, "INPUT_DIR", "input")?);
        let output_dir = PathBuf::from(get_or(&env_map, "OUTPUT_DIR", "output")?);

        let run_label = match env_map.get("RUN_LABEL") {
            Some(_) => get_or(&env_map, "RUN_LABEL", "")?,
            None => chrono::Utc::now().format(RUN_LABEL_FORMAT).to_string(),
        };
        if run_label.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue(
                "RUN_LABEL".to_string(),
                "must not contain path separators".to_string(),
            ));
        }

        let balance_tolerance = parse_tolerance(&env_map, "BALANCE_TOLERANCE", "0.00000001")?;
        let price_tolerance = parse_tolerance(&env_map, "PRICE_TOLERANCE", "0.000000000001")?;

        let countervalue_coin = Coin::new(get_or(&env_map, "COUNTERVALUE_COIN", "EUR")?);
        let skip_coins = parse_coin_list(env_map.get("SKIP_COINS").map(|s| s.as_str()).unwrap_or("LDBTC"));
        let inverted_price_symbols = parse_coin_list(
            env_map
                .get("INVERTED_PRICE_SYMBOLS")
                .map(|s| s.as_str())
                .unwrap_or("USDT,USDC"),
        );

        Ok(Config {
            input_dir,
            output_dir,
            run_label,
            balance_tolerance,
            price_tolerance,
            countervalue_coin,
            skip_coins,
            inverted_price_symbols,
        })
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            balance_tolerance: self.balance_tolerance,
            price_tolerance: self.price_tolerance,
            countervalue_coin: self.countervalue_coin.clone(),
        }
    }
}

fn get_or(env_map: &HashMap<String, String>, key: &str, default: &str) -> Result<String, ConfigError> {
    match env_map.get(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::MissingEnv(key.to_string())),
        Some(value) => Ok(value.trim().to_string()),
        None => Ok(default.to_string()),
    }
}

fn parse_tolerance(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = get_or(env_map, key, default)?;
    let value = Decimal::from_str_canonical(&raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
    })?;
    if value.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must not be negative, got {}", raw),
        ));
    }
    Ok(value)
}

fn parse_coin_list(value: &str) -> Vec<Coin> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Coin::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(HashMap::new()).unwrap();
        assert_eq!(config.input_dir, PathBuf::from("input"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.countervalue_coin, Coin::new("EUR"));
        assert_eq!(config.skip_coins, vec![Coin::new("LDBTC")]);
        assert_eq!(
            config.inverted_price_symbols,
            vec![Coin::new("USDT"), Coin::new("USDC")]
        );
        assert_eq!(config.ledger_settings(), LedgerSettings::default());
        assert!(
            chrono::NaiveDateTime::parse_from_str(&config.run_label, RUN_LABEL_FORMAT).is_ok()
        );
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_env_map(env(&[
            ("RUN_LABEL", "2024-report"),
            ("BALANCE_TOLERANCE", "0.001"),
            ("SKIP_COINS", "LDBTC, LDETH,,"),
            ("INVERTED_PRICE_SYMBOLS", ""),
        ]))
        .unwrap();
        assert_eq!(config.run_label, "2024-report");
        assert_eq!(
            config.balance_tolerance,
            Decimal::from_str_canonical("0.001").unwrap()
        );
        assert_eq!(config.skip_coins, vec![Coin::new("LDBTC"), Coin::new("LDETH")]);
        assert!(config.inverted_price_symbols.is_empty());
    }

    #[test]
    fn test_blank_input_dir_is_missing() {
        match Config::from_env_map(env(&[("INPUT_DIR", "  ")])) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "INPUT_DIR"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_tolerance() {
        match Config::from_env_map(env(&[("PRICE_TOLERANCE", "tiny")])) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PRICE_TOLERANCE"),
            _ => panic!("Expected InvalidValue error"),
        }
        match Config::from_env_map(env(&[("BALANCE_TOLERANCE", "-1")])) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "BALANCE_TOLERANCE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_run_label_with_separator() {
        match Config::from_env_map(env(&[("RUN_LABEL", "../escape")])) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "RUN_LABEL"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
