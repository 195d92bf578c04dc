//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, warmup_start};
use crate::domain::code_data::{CodeData, trading_days};
use crate::domain::config_validation::{
    parse_date, parse_optional, validate_backtest_config, validate_data_config,
    validate_search_config, validate_strategy_config,
};
use crate::domain::error::CorrexError;
use crate::domain::metrics::Metrics;
use crate::domain::search::space::{ParamSpec, ParameterSpace};
use crate::domain::search::{
    DEFAULT_RANDOM_YEARS, ExploitMetric, SearchConfig, SearchContext, SearchControl,
    SearchMethod, SearchRecord, run_search,
};
use crate::domain::strategy::{GainMetric, Param, PolicyKind, StrategyParams};
use crate::domain::universe::{parse_codes, validate_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "correx",
    about = "Market-correction strategy backtester and optimiser"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Report directory, overrides [report] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// single or stacked, overrides [strategy] policy
        #[arg(long)]
        policy: Option<PolicyKind>,
        /// Comma separated codes, overrides [data] codes
        #[arg(long)]
        codes: Option<String>,
    },
    /// Search strategy parameters
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// grid or bandit, overrides [search] method
        #[arg(long)]
        method: Option<SearchMethod>,
        #[arg(long)]
        policy: Option<PolicyKind>,
        #[arg(long)]
        episodes: Option<usize>,
        /// Stop starting new runs after this many seconds
        #[arg(long)]
        time_limit: Option<u64>,
    },
    /// Validate a configuration and print the parsed settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for the configured codes
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        codes: Option<String>,
    },
    /// List codes available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Run one subcommand to completion.
pub fn execute(command: Command) -> Result<(), CorrexError> {
    match command {
        Command::Backtest {
            config,
            output,
            policy,
            codes,
        } => run_backtest(&config, output.as_deref(), policy, codes.as_deref()),
        Command::Optimize {
            config,
            output,
            method,
            policy,
            episodes,
            time_limit,
        } => run_optimize(
            &config,
            output.as_deref(),
            OptimizeOverrides {
                method,
                policy,
                episodes,
                time_limit,
            },
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, codes } => run_info(&config, codes.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, CorrexError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, CorrexError> {
    Ok(BacktestConfig {
        start_date: parse_date(config, "start_date")?,
        end_date: parse_date(config, "end_date")?,
        initial_capital: config.get_double("backtest", "initial_capital", 100_000.0),
        commission_per_trade: config.get_double("backtest", "commission_per_trade", 0.0),
        commission_pct: config.get_double("backtest", "commission_pct", 0.0),
        slippage_pct: config.get_double("backtest", "slippage_pct", 0.0),
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
    })
}

/// Policy defaults overlaid with every `[strategy]` key present.
pub fn build_strategy_params(
    config: &dyn ConfigPort,
    policy_override: Option<PolicyKind>,
) -> Result<StrategyParams, CorrexError> {
    let kind = match policy_override {
        Some(kind) => kind,
        None => parse_optional(config, "strategy", "policy")?.unwrap_or(PolicyKind::Single),
    };
    let defaults = StrategyParams::defaults_for(kind);

    let mut params = Param::for_policy(kind).iter().fold(defaults, |params, &p| {
        let default = defaults.value(p).unwrap_or(0.0);
        params.with_value(p, config.get_double("strategy", p.as_str(), default))
    });
    params.lookback = config.get_int("strategy", "lookback", defaults.lookback as i64).max(2) as usize;
    params.consider_window = config
        .get_int("strategy", "consider_window", defaults.consider_window as i64)
        .max(1) as usize;
    params.gain_metric =
        parse_optional::<GainMetric>(config, "strategy", "gain_metric")?.unwrap_or_default();
    Ok(params)
}

pub fn build_search_config(
    config: &dyn ConfigPort,
    method_override: Option<SearchMethod>,
) -> Result<SearchConfig, CorrexError> {
    let defaults = SearchConfig::default();
    let method = match method_override {
        Some(m) => m,
        None => parse_optional(config, "search", "method")?.unwrap_or(defaults.method),
    };
    let random_years = config
        .get_bool("search", "random_timeframes", false)
        .then(|| {
            config
                .get_int("search", "years", i64::from(DEFAULT_RANDOM_YEARS))
                .max(1) as u32
        });

    Ok(SearchConfig {
        method,
        episodes: config
            .get_int("search", "episodes", defaults.episodes as i64)
            .max(1) as usize,
        exploit_metric: parse_optional::<ExploitMetric>(config, "search", "exploit_metric")?
            .unwrap_or(defaults.exploit_metric),
        seed: config.get_int("search", "seed", defaults.seed as i64).max(0) as u64,
        parallel: config.get_bool("search", "parallel", defaults.parallel),
        random_years,
    })
}

/// `base` with each parameter that has a `[search]` entry opened up.
pub fn build_search_space(
    config: &dyn ConfigPort,
    base: StrategyParams,
) -> Result<ParameterSpace, CorrexError> {
    let mut space = ParameterSpace::new(base);
    for &param in Param::for_policy(base.policy.kind()) {
        if let Some(raw) = config.get_string("search", param.as_str()) {
            let spec = ParamSpec::parse(&raw).map_err(|reason| CorrexError::ConfigInvalid {
                section: "search".into(),
                key: param.as_str().into(),
                reason,
            })?;
            space = space.with(param, spec);
        }
    }
    Ok(space)
}

pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, CorrexError> {
    let raw = match code_override {
        Some(c) => c.to_string(),
        None => config
            .get_string("data", "codes")
            .ok_or_else(|| CorrexError::ConfigMissing {
                section: "data".into(),
                key: "codes".into(),
            })?,
    };
    parse_codes(&raw).map_err(|e| CorrexError::ConfigInvalid {
        section: "data".into(),
        key: "codes".into(),
        reason: e.to_string(),
    })
}

pub fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, CorrexError> {
    let dir = config
        .get_string("data", "directory")
        .ok_or_else(|| CorrexError::ConfigMissing {
            section: "data".into(),
            key: "directory".into(),
        })?;
    Ok(CsvAdapter::new(PathBuf::from(dir.trim())))
}

fn output_dir(output: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    output.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(
            config
                .get_string("report", "output_dir")
                .unwrap_or_else(|| "output".to_string()),
        )
    })
}

/// Histories and benchmark needed to run `params` over the configured window.
pub struct MarketData {
    pub code_data: Vec<CodeData>,
    pub benchmark: Option<CodeData>,
}

/// Load every code from the warm-up start, plus the optional benchmark.
pub fn load_market_data(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    codes: &[String],
    bt_config: &BacktestConfig,
    lookback: usize,
) -> Result<MarketData, CorrexError> {
    let from = warmup_start(bt_config.start_date, lookback);
    eprintln!(
        "Loading {} codes from {} (warm-up for {} bars)",
        codes.len(),
        from,
        lookback
    );
    let universe = validate_universe(data_port, codes, from, bt_config.end_date)?;

    let benchmark = match config
        .get_string("data", "benchmark")
        .filter(|s| !s.trim().is_empty())
    {
        Some(code) => {
            let code = code.trim().to_string();
            match data_port.fetch_bars(&code, from, bt_config.end_date) {
                Ok(bars) if !bars.is_empty() => Some(CodeData::new(code, bars)),
                Ok(_) => {
                    tracing::warn!(code = %code, "benchmark has no data, alpha is unadjusted");
                    None
                }
                Err(e) => {
                    tracing::warn!(code = %code, error = %e, "benchmark failed to load, alpha is unadjusted");
                    None
                }
            }
        }
        None => None,
    };

    Ok(MarketData {
        code_data: universe.data,
        benchmark,
    })
}

fn print_metrics(metrics: &Metrics) {
    eprintln!("\n=== Results ===");
    eprintln!("Total Return:      {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:        {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Mean Daily Return: {:.5}%", metrics.mean_daily_return * 100.0);
    eprintln!("Alpha:             {:.2}%", metrics.alpha * 100.0);
    eprintln!("Beta:              {:.3}", metrics.beta);
    eprintln!("Sharpe Ratio:      {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:     {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:      -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!(
        "Trades:            {} won, {} lost, {} even",
        metrics.trades_won, metrics.trades_lost, metrics.trades_breakeven
    );
    eprintln!("Win Rate:          {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:     {:.2}", metrics.profit_factor);
}

fn describe_params(params: &StrategyParams) -> String {
    let mut parts: Vec<String> = Param::for_policy(params.policy.kind())
        .iter()
        .filter_map(|p| params.value(*p).map(|v| format!("{p}={v}")))
        .collect();
    parts.push(format!("lookback={}", params.lookback));
    parts.push(format!("consider_window={}", params.consider_window));
    parts.push(format!("gain_metric={}", params.gain_metric));
    format!("{} [{}]", params.policy.kind(), parts.join(", "))
}

fn run_backtest(
    config_path: &Path,
    output: Option<&Path>,
    policy: Option<PolicyKind>,
    codes_override: Option<&str>,
) -> Result<(), CorrexError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_data_config(&config)?;
    validate_strategy_config(&config)?;

    let bt_config = build_backtest_config(&config)?;
    let params = build_strategy_params(&config, policy)?;
    let codes = resolve_codes(codes_override, &config)?;
    eprintln!("Strategy: {}", describe_params(&params));

    let data_port = data_adapter(&config)?;
    let market = load_market_data(&data_port, &config, &codes, &bt_config, params.lookback)?;

    let timeline = trading_days(&market.code_data, bt_config.start_date, bt_config.end_date);
    if timeline.is_empty() {
        return Err(CorrexError::NoData {
            code: codes.join(","),
        });
    }
    eprintln!(
        "Running backtest: {} codes, {} to {} ({} days)",
        market.code_data.len(),
        bt_config.start_date,
        bt_config.end_date,
        timeline.len()
    );

    let result = backtest_engine::run_backtest(
        &market.code_data,
        &timeline,
        &params,
        &bt_config,
        market.benchmark.as_ref(),
    )?;
    print_metrics(&result.metrics(bt_config.risk_free_rate));

    let dir = output_dir(output, &config);
    CsvReportAdapter::new().write_backtest(&result, &params, bt_config.risk_free_rate, &dir)?;
    eprintln!("\nReport written to: {}", dir.display());
    Ok(())
}

/// Command line overrides for `optimize`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizeOverrides {
    pub method: Option<SearchMethod>,
    pub policy: Option<PolicyKind>,
    pub episodes: Option<usize>,
    pub time_limit: Option<u64>,
}

fn print_best(label: &str, record: Option<&SearchRecord>) {
    match record {
        Some(r) => eprintln!(
            "Best by {label}: mean daily return {:.5}%, alpha {:.2}% ({} to {}) {}",
            r.mean_daily_return * 100.0,
            r.alpha * 100.0,
            r.start,
            r.end,
            describe_params(&r.params)
        ),
        None => eprintln!("Best by {label}: no successful runs"),
    }
}

fn run_optimize(
    config_path: &Path,
    output: Option<&Path>,
    overrides: OptimizeOverrides,
) -> Result<(), CorrexError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_data_config(&config)?;
    validate_strategy_config(&config)?;
    validate_search_config(&config)?;

    let bt_config = build_backtest_config(&config)?;
    let base = build_strategy_params(&config, overrides.policy)?;
    let mut search = build_search_config(&config, overrides.method)?;
    if let Some(episodes) = overrides.episodes {
        search.episodes = episodes.max(1);
    }
    let space = build_search_space(&config, base)?;
    let codes = resolve_codes(None, &config)?;

    let data_port = data_adapter(&config)?;
    let market = load_market_data(&data_port, &config, &codes, &bt_config, base.lookback)?;

    let ctx = SearchContext {
        code_data: &market.code_data,
        benchmark: market.benchmark.as_ref(),
        config: &bt_config,
    };
    let control = SearchControl {
        cancel: None,
        deadline: overrides
            .time_limit
            .map(|secs| Instant::now() + Duration::from_secs(secs)),
    };

    eprintln!(
        "Optimising {} with {} search ({} episodes, seed {})",
        base.policy.kind(),
        search.method,
        search.episodes,
        search.seed
    );
    let outcome = run_search(&ctx, &space, &search, control)?;

    eprintln!(
        "\n{} runs finished, {} failed{}",
        outcome.records.len(),
        outcome.failed,
        if outcome.cancelled { ", stopped early" } else { "" }
    );
    print_best("return", outcome.best(ExploitMetric::Return));
    print_best("alpha", outcome.best(ExploitMetric::Alpha));

    let dir = output_dir(output, &config);
    CsvReportAdapter::new().write_search(&outcome, &dir)?;
    eprintln!("\nResults written to: {}", dir.display());
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), CorrexError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_data_config(&config)?;
    validate_strategy_config(&config)?;
    validate_search_config(&config)?;

    let bt_config = build_backtest_config(&config)?;
    let params = build_strategy_params(&config, None)?;
    let search = build_search_config(&config, None)?;
    let space = build_search_space(&config, params)?;
    let codes = resolve_codes(None, &config)?;

    eprintln!("\nBacktest:");
    eprintln!("  window:  {} to {}", bt_config.start_date, bt_config.end_date);
    eprintln!("  warm-up: from {}", warmup_start(bt_config.start_date, params.lookback));
    eprintln!("  capital: {:.2}", bt_config.initial_capital);
    eprintln!("\nUniverse:");
    eprintln!("  codes: {}", codes.join(", "));
    if let Some(benchmark) = config.get_string("data", "benchmark") {
        eprintln!("  benchmark: {}", benchmark.trim());
    }
    eprintln!("\nStrategy:");
    eprintln!("  {}", describe_params(&params));
    eprintln!("\nSearch:");
    eprintln!(
        "  {} search, {} episodes, metric {}, seed {}",
        search.method, search.episodes, search.exploit_metric, search.seed
    );
    for (param, spec) in space.specs() {
        if !matches!(spec, ParamSpec::Fixed(_)) {
            eprintln!("  {param}: {spec:?}");
        }
    }

    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn run_info(config_path: &Path, codes_override: Option<&str>) -> Result<(), CorrexError> {
    let config = load_config(config_path)?;
    let data_port = data_adapter(&config)?;
    for code in resolve_codes(codes_override, &config)? {
        match data_port.get_data_range(&code) {
            Ok(Some((first, last, count))) => {
                println!("{code}: {count} bars, {first} to {last}");
            }
            Ok(None) => eprintln!("{code}: no data found"),
            Err(e) => eprintln!("error reading {code}: {e}"),
        }
    }
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), CorrexError> {
    let config = load_config(config_path)?;
    let symbols = data_adapter(&config)?.list_symbols()?;
    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{symbol}");
        }
        eprintln!("{} symbols found", symbols.len());
    }
    Ok(())
}
