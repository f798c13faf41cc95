pub mod analysis;
pub mod engine;
pub mod parser;
pub mod ui;

use log::{debug, error, info, warn};
use parser::ast::{Project, TriggerKind};
use parser::{LoadError, parse_embedded_project, parse_project_file};
use serde_json::Value;
use std::env;
use std::path::PathBuf;

pub use engine::{
    ActionContext, ActionEngine, EventDispatcher, ExpressionEvaluator, PreviewSession,
    RuntimeConfig, RuntimeResult, RuntimeState,
};
pub use ui::{WidgetTree, reflow};

// ========================================
// コマンドライン引数構造体
// ========================================

/// コマンドライン引数の設定
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub project_path: Option<PathBuf>,
    pub event_id: Option<String>,
    pub trigger: Option<TriggerKind>,
    pub element_id: Option<String>,
    pub emit: Option<String>,
    pub payload: Option<Value>,
    pub max_depth: Option<usize>,
    pub allowed_domains: Vec<String>,
    pub show_layout: bool,
    pub show_help: bool,
    pub enable_lint: bool,
    pub quiet: bool, // panic以外のログを抑制
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,   // ログを一切表示しない（panicは除く）
    Error, // エラーレベルのみ
    Warn,  // 警告レベル以上
    Info,  // 情報レベル以上
    Debug, // デバッグレベル以上
    Trace, // 全てのログ
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            project_path: None,
            event_id: None,
            trigger: None,
            element_id: None,
            emit: None,
            payload: None,
            max_depth: None,
            allowed_domains: Vec::new(),
            show_layout: false,
            show_help: false,
            enable_lint: true,
            quiet: false,
            log_level: LogLevel::Info,
        }
    }
}

impl CliArgs {
    /// CLIで指定された値でプロジェクトのruntime設定を上書きする
    pub fn apply_overrides(&self, config: &mut RuntimeConfig) {
        if let Some(depth) = self.max_depth {
            config.max_event_depth = depth;
        }
        for host in &self.allowed_domains {
            *config = config.clone().allow_domain(host.clone());
        }
    }
}

pub fn parse_args() -> CliArgs {
    let cli_args = parse_args_from(env::args().skip(1));
    if cli_args.show_help {
        show_help();
        std::process::exit(0);
    }
    cli_args
}

pub fn parse_args_from<I>(args: I) -> CliArgs
where
    I: IntoIterator<Item = String>,
{
    let mut cli_args = CliArgs::default();

    for arg in args {
        match arg.as_str() {
            "--no-lint" => cli_args.enable_lint = false,
            "--lint" => cli_args.enable_lint = true,
            "--layout" => cli_args.show_layout = true,
            "--quiet" | "-q" => {
                cli_args.quiet = true;
                cli_args.log_level = LogLevel::Off;
            }
            "--log-level=off" => cli_args.log_level = LogLevel::Off,
            "--log-level=error" => cli_args.log_level = LogLevel::Error,
            "--log-level=warn" => cli_args.log_level = LogLevel::Warn,
            "--log-level=info" => cli_args.log_level = LogLevel::Info,
            "--log-level=debug" => cli_args.log_level = LogLevel::Debug,
            "--log-level=trace" => cli_args.log_level = LogLevel::Trace,
            "--help" | "-h" => cli_args.show_help = true,
            other => {
                if let Some(id) = other.strip_prefix("--event=") {
                    cli_args.event_id = Some(id.to_string());
                } else if let Some(kind) = other.strip_prefix("--trigger=") {
                    match kind.parse::<TriggerKind>() {
                        Ok(kind) => cli_args.trigger = Some(kind),
                        Err(e) => warn!("ignoring --trigger: {}", e),
                    }
                } else if let Some(id) = other.strip_prefix("--element=") {
                    cli_args.element_id = Some(id.to_string());
                } else if let Some(name) = other.strip_prefix("--emit=") {
                    cli_args.emit = Some(name.to_string());
                } else if let Some(json) = other.strip_prefix("--payload=") {
                    match serde_json::from_str(json) {
                        Ok(payload) => cli_args.payload = Some(payload),
                        Err(e) => warn!("ignoring --payload: {}", e),
                    }
                } else if let Some(depth) = other.strip_prefix("--max-depth=") {
                    match depth.parse() {
                        Ok(depth) => cli_args.max_depth = Some(depth),
                        Err(e) => warn!("ignoring --max-depth={}: {}", depth, e),
                    }
                } else if let Some(host) = other.strip_prefix("--allow-domain=") {
                    cli_args.allowed_domains.push(host.to_string());
                } else if !other.starts_with('-') && cli_args.project_path.is_none() {
                    cli_args.project_path = Some(PathBuf::from(other));
                } else {
                    debug!("unknown argument '{}'", other);
                }
            }
        }
    }
    cli_args
}

pub fn show_help() {
    println!("Nilo Studio Preview Runner

USAGE:
    nilo_studio <PROJECT.json> [OPTIONS]

OPTIONS:
    --event=ID               Execute the event with this id after the screen loads
    --trigger=KIND           Fire a UI trigger (click/change/load/submit/hover/custom)
    --element=ID             Element id for --trigger
    --emit=NAME              Fire custom events listening to NAME
    --payload=JSON           Payload passed as params with --emit
    --max-depth=N            Override runtime.maxEventDepth
    --allow-domain=HOST      Add a host to the api_call allow-list (repeatable)
    --layout                 Print reflowed widget positions
    --lint/--no-lint         Enable/disable project lint (default: enabled)
    --quiet, -q              Suppress all logs except panics
    --log-level=LEVEL        Set log level (off/error/warn/info/debug/trace)
    --help, -h               Show this help");
}

/// ログレベルを初期化する関数
pub fn init_logger(log_level: &LogLevel) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::sync::Once;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = match log_level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        };

        let mut builder = Builder::from_default_env();

        if matches!(log_level, LogLevel::Off) {
            builder
                .filter_level(LevelFilter::Off)
                .format(|_, _| Ok(()))
                .try_init()
                .ok(); // エラーを無視
        } else {
            builder
                .filter_level(level)
                // HTTPクライアント内部のログを抑制
                .filter_module("reqwest", LevelFilter::Warn)
                .filter_module("hyper", LevelFilter::Warn)
                .filter_module("hyper_util", LevelFilter::Warn)
                .filter_module("rustls", LevelFilter::Warn)
                .format_timestamp_secs()
                .try_init()
                .ok(); // エラーを無視
        }
    });
}

pub fn load_project<P: AsRef<std::path::Path>>(
    path: P,
    enable_lint: bool,
    quiet: bool,
) -> Result<Project, LoadError> {
    let project = parse_project_file(&path)?;
    info!("📦 loaded {}", path.as_ref().display());
    report_lints(&project, enable_lint, quiet);
    Ok(project)
}

// 埋め込まれたプロジェクトJSONをロードする関数
pub fn load_embedded_project(source: &str, enable_lint: bool, quiet: bool) -> Result<Project, LoadError> {
    let project = parse_embedded_project(source)?;
    report_lints(&project, enable_lint, quiet);
    Ok(project)
}

fn report_lints(project: &Project, enable_lint: bool, quiet: bool) {
    if !enable_lint || quiet {
        return;
    }

    let analysis_result = analysis::analyze_project(project);
    for diag in &analysis_result.diagnostics {
        let loc = diag.location.as_deref().unwrap_or("");
        match diag.level {
            analysis::error::DiagnosticLevel::Error => error!("[Error] {} {}", loc, diag.message),
            analysis::error::DiagnosticLevel::Warning => warn!("[Warning] {} {}", loc, diag.message),
            analysis::error::DiagnosticLevel::Info => info!("[Info] {} {}", loc, diag.message),
        }
    }

    if analysis_result.has_errors() {
        error!("Lint errors found. Use --no-lint to skip lint checks.");
    }
}
