//! Configuration validation.
//!
//! Checks every config field before a run starts so a bad value fails fast
//! with the section and key that caused it.

use crate::domain::error::CorrexError;
use crate::domain::search::space::ParamSpec;
use crate::domain::search::{DEFAULT_RANDOM_YEARS, ExploitMetric, SearchMethod};
use crate::domain::strategy::{GainMetric, Param, PolicyKind, StrategyParams};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> CorrexError {
    CorrexError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> CorrexError {
    CorrexError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
}

/// Parse an optional key with `FromStr`, reporting the parser's message.
pub fn parse_optional<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, CorrexError>
where
    T: FromStr<Err = String>,
{
    non_empty(config, section, key)
        .map(|s| s.parse::<T>().map_err(|reason| invalid(section, key, reason)))
        .transpose()
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    if non_empty(config, "data", "directory").is_none() {
        return Err(missing("data", "directory"));
    }
    let codes = non_empty(config, "data", "codes").ok_or_else(|| missing("data", "codes"))?;
    parse_codes(&codes).map_err(|e| invalid("data", "codes", e.to_string()))?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    let kind = parse_optional::<PolicyKind>(config, "strategy", "policy")?
        .unwrap_or(PolicyKind::Single);
    parse_optional::<GainMetric>(config, "strategy", "gain_metric")?;
    let defaults = StrategyParams::defaults_for(kind);

    let margin = config.get_double("strategy", "correction_margin", defaults.correction_margin);
    if margin <= 0.0 || margin >= 1.0 {
        return Err(invalid(
            "strategy",
            "correction_margin",
            "correction_margin must be between 0 and 1",
        ));
    }

    let coefficient =
        config.get_double("strategy", "upturn_coefficient", defaults.upturn_coefficient);
    if coefficient <= 0.0 {
        return Err(invalid(
            "strategy",
            "upturn_coefficient",
            "upturn_coefficient must be positive",
        ));
    }

    if kind == PolicyKind::Single {
        for param in [Param::MinReturn, Param::StopLoss] {
            let key = param.as_str();
            let default = defaults.value(param).unwrap_or(0.0);
            let value = config.get_double("strategy", key, default);
            if value <= 0.0 || value >= 1.0 {
                return Err(invalid(
                    "strategy",
                    key,
                    format!("{key} must be between 0 and 1"),
                ));
            }
        }
    }

    let lookback = config.get_int("strategy", "lookback", defaults.lookback as i64);
    if lookback < 2 {
        return Err(invalid("strategy", "lookback", "lookback must be at least 2"));
    }
    let window = config.get_int("strategy", "consider_window", defaults.consider_window as i64);
    if window < 1 || window >= lookback {
        return Err(invalid(
            "strategy",
            "consider_window",
            "consider_window must be at least 1 and below lookback",
        ));
    }
    Ok(())
}

pub fn validate_search_config(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    parse_optional::<SearchMethod>(config, "search", "method")?;
    parse_optional::<ExploitMetric>(config, "search", "exploit_metric")?;

    if config.get_int("search", "episodes", 500) < 1 {
        return Err(invalid("search", "episodes", "episodes must be at least 1"));
    }
    if config.get_int("search", "seed", 0) < 0 {
        return Err(invalid("search", "seed", "seed must be non-negative"));
    }
    if config.get_bool("search", "random_timeframes", false)
        && config.get_int("search", "years", i64::from(DEFAULT_RANDOM_YEARS)) < 1
    {
        return Err(invalid(
            "search",
            "years",
            "years must be at least 1 with random_timeframes",
        ));
    }

    let kind = parse_optional::<PolicyKind>(config, "strategy", "policy")?
        .unwrap_or(PolicyKind::Single);
    for param in Param::for_policy(kind) {
        if let Some(raw) = non_empty(config, "search", param.as_str()) {
            ParamSpec::parse(&raw).map_err(|reason| invalid("search", param.as_str(), reason))?;
        }
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    for key in ["commission_per_trade", "commission_pct"] {
        if config.get_double("backtest", key, 0.0) < 0.0 {
            return Err(invalid("backtest", key, format!("{key} must be non-negative")));
        }
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    let value = config.get_double("backtest", "slippage_pct", 0.0);
    if value < 0.0 {
        return Err(invalid(
            "backtest",
            "slippage_pct",
            "slippage_pct must be non-negative",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), CorrexError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

/// Read a `YYYY-MM-DD` date from `[backtest]`.
pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, CorrexError> {
    let value = config
        .get_string("backtest", field)
        .ok_or_else(|| missing("backtest", field))?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        invalid(
            "backtest",
            field,
            format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const BACKTEST: &str = "[backtest]\ninitial_capital = 100000\nstart_date = 1990-01-01\nend_date = 2000-01-01\n";

    fn backtest_with(extra: &str) -> FileConfigAdapter {
        make_config(&format!("{BACKTEST}{extra}\n"))
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 100000.0
commission_per_trade = 10.0
commission_pct = 0.1
slippage_pct = 0.05
risk_free_rate = 0.05
start_date = 1990-01-01
end_date = 2024-12-31
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config(
            "[backtest]\ninitial_capital = 0\nstart_date = 2020-01-01\nend_date = 2024-12-31\n",
        );
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "initial_capital"));
    }

    #[test]
    fn negative_costs_fail() {
        for key in ["commission_per_trade", "commission_pct", "slippage_pct"] {
            let config = backtest_with(&format!("{key} = -1"));
            let err = validate_backtest_config(&config).unwrap_err();
            assert!(matches!(err, CorrexError::ConfigInvalid { key: k, .. } if k == key));
        }
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = backtest_with("risk_free_rate = 1.5");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "risk_free_rate"));
    }

    #[test]
    fn date_errors() {
        let config = make_config("[backtest]\ninitial_capital = 1\nstart_date = 2020/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "start_date"));

        let config = make_config("[backtest]\ninitial_capital = 1\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigMissing { key, .. } if key == "end_date"));

        let config = make_config("[backtest]\ninitial_capital = 1\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn data_section_needs_directory_and_codes() {
        let ok = make_config("[data]\ndirectory = /tmp\ncodes = ^GSPC, ^DJI\n");
        assert!(validate_data_config(&ok).is_ok());

        let err = validate_data_config(&make_config("[data]\ncodes = A\n")).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigMissing { key, .. } if key == "directory"));

        let err = validate_data_config(&make_config("[data]\ndirectory = d\ncodes = A,A\n"))
            .unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "codes"));
    }

    #[test]
    fn strategy_defaults_are_valid() {
        assert!(validate_strategy_config(&make_config("[strategy]\n")).is_ok());
        assert!(validate_strategy_config(&make_config("[strategy]\npolicy = stacked\n")).is_ok());
    }

    #[test]
    fn strategy_ranges() {
        let cases = [
            ("correction_margin = 1.0", "correction_margin"),
            ("upturn_coefficient = 0", "upturn_coefficient"),
            ("stop_loss = 1.2", "stop_loss"),
            ("min_return = 0", "min_return"),
            ("lookback = 1", "lookback"),
            ("lookback = 10\nconsider_window = 10", "consider_window"),
            ("policy = hedged", "policy"),
            ("gain_metric = log", "gain_metric"),
        ];
        for (line, key) in cases {
            let config = make_config(&format!("[strategy]\n{line}\n"));
            let err = validate_strategy_config(&config).unwrap_err();
            assert!(
                matches!(&err, CorrexError::ConfigInvalid { key: k, .. } if k == key),
                "{line}: {err}"
            );
        }
    }

    #[test]
    fn stacked_ignores_single_only_keys() {
        let config = make_config("[strategy]\npolicy = stacked\nstop_loss = 5\n");
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn search_config_checks_spaces() {
        let ok = make_config(
            "[search]\nmethod = grid\nepisodes = 10\nupturn_coefficient = 0.05..0.5 step 0.05\n",
        );
        assert!(validate_search_config(&ok).is_ok());

        let bad = make_config("[search]\nmin_gain = 0.5..0.1\n");
        let err = validate_search_config(&bad).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "min_gain"));

        // years falls back to the default window length
        let ok = make_config("[search]\nrandom_timeframes = true\n");
        assert!(validate_search_config(&ok).is_ok());

        let bad = make_config("[search]\nrandom_timeframes = true\nyears = 0\n");
        let err = validate_search_config(&bad).unwrap_err();
        assert!(matches!(err, CorrexError::ConfigInvalid { key, .. } if key == "years"));

        let bad = make_config("[search]\nepisodes = 0\n");
        assert!(validate_search_config(&bad).is_err());
    }
}
