//! jobsh — パイプラインとジョブ制御を持つ対話シェル
//!
//! REPLループ: プロンプト表示 → 1 行読み取り → パース → ディレクティブ or 起動 → ループ
//!
//! 終了コード: `quit` / EOF なら 0、fork 失敗や入出力エラーでループが終わったら 1。

use std::io;
use std::process::ExitCode;

use argh::FromArgs;
use tracing::{error, Level};

use jobsh::history;
use jobsh::shell::{Shell, ShellConfig};

/// Interactive shell with pipelines, redirection and a small job table.
#[derive(FromArgs)]
struct Cli {
    /// print diagnostics to stderr
    #[argh(switch, short = 'd')]
    debug: bool,

    /// number of history entries to keep, at least 1 (default 20)
    #[argh(
        option,
        short = 'n',
        default = "history::DEFAULT_CAPACITY",
        from_str_fn(parse_history_size)
    )]
    history_size: usize,
}

/// `-n` の値。0 はリングが作れないので拒否する。
fn parse_history_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("history size must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid history size `{value}`: {e}")),
    }
}

/// 診断は stderr へ。`-d` なしなら致命的なエラーだけを出す。
fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::ERROR };
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli: Cli = argh::from_env();
    init_logging(cli.debug);

    let mut shell = Shell::new(ShellConfig {
        debug: cli.debug,
        history_capacity: cli.history_size,
    });

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match shell.run(stdin.lock(), &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
