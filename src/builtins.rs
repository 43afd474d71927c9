//! ビルトインディレクティブの実装。
//!
//! ディレクティブは fork せずシェルのプロセス内で実行される。
//! `try_exec()` が `Some(..)` を返せばディレクティブとして処理済み、
//! `None` なら外部コマンドとして launcher に委ねる。
//!
//! | ディレクティブ | 引数 | 動作 |
//! |---------------|------|------|
//! | `quit` | なし | ループを終了（ジョブにはシグナルを送らない） |
//! | `cd` | パス | カレントディレクトリを変更 |
//! | `alarm` | PID | SIGCONT を送り、成功なら Running |
//! | `blast` | PID | SIGTERM を送り、成功なら Terminated |
//! | `suspend` | PID | SIGTSTP を送り、成功なら Suspended |
//! | `procs` | なし | ジョブ一覧 |
//! | `history` | なし | 履歴一覧 |
//!
//! `!!` / `!N` は行の再解釈を伴うため [`Shell`] 側で処理する。

use std::io::{self, Write};
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use thiserror::Error;

use crate::job::JobStatus;
use crate::shell::Shell;

/// ディレクティブ実行後のループ制御。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// ディレクティブの失敗。いずれもシェルは継続する（debug 時のみ表示）。
#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("couldn't signal {pid} with {signal}: {source}")]
    Signal {
        pid: Pid,
        signal: Signal,
        #[source]
        source: Errno,
    },
    #[error("couldn't change directory to {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: Errno,
    },
    #[error("{directive}: {reason}")]
    Usage {
        directive: &'static str,
        reason: &'static str,
    },
    #[error("couldn't write output: {0}")]
    Io(#[from] io::Error),
}

/// ディレクティブの実行を試みる。
///
/// 戻り値:
/// - `Some(Ok(flow))` — ディレクティブとして実行済み
/// - `Some(Err(e))` — ディレクティブだが失敗（シェルの状態は変えていない）
/// - `None` — 該当なし（外部コマンドとして実行すべき）
pub fn try_exec(
    shell: &mut Shell,
    args: &[String],
    out: &mut dyn Write,
) -> Option<Result<Flow, DirectiveError>> {
    let result = match args.first()?.as_str() {
        "quit" => Ok(Flow::Quit),
        "cd" => builtin_cd(shell, args),
        "alarm" => builtin_signal(shell, "alarm", args, Signal::SIGCONT, JobStatus::Running),
        "blast" => builtin_signal(shell, "blast", args, Signal::SIGTERM, JobStatus::Terminated),
        "suspend" => builtin_signal(shell, "suspend", args, Signal::SIGTSTP, JobStatus::Suspended),
        "procs" => builtin_procs(shell, out),
        "history" => builtin_history(shell, out),
        _ => return None,
    };
    Some(result)
}

/// `cd path` — 成功したらプロンプト用のキャッシュも更新する。
fn builtin_cd(shell: &mut Shell, args: &[String]) -> Result<Flow, DirectiveError> {
    let path = args.get(1).map(PathBuf::from).ok_or(DirectiveError::Usage {
        directive: "cd",
        reason: "missing directory",
    })?;
    unistd::chdir(&path).map_err(|source| DirectiveError::Directory {
        path: path.clone(),
        source,
    })?;
    shell.refresh_cwd();
    Ok(Flow::Continue)
}

/// `alarm` / `blast` / `suspend` — `pid` にシグナルを送り、成功したときだけ状態を上書きする。
fn builtin_signal(
    shell: &mut Shell,
    directive: &'static str,
    args: &[String],
    signal: Signal,
    new_status: JobStatus,
) -> Result<Flow, DirectiveError> {
    let pid = parse_pid(directive, args.get(1))?;
    signal::kill(pid, signal).map_err(|source| DirectiveError::Signal {
        pid,
        signal,
        source,
    })?;
    shell.jobs.update_status(pid, new_status);
    Ok(Flow::Continue)
}

/// PID 引数を読む。0 以下は `kill` がプロセスグループとして解釈するので拒否。
fn parse_pid(directive: &'static str, arg: Option<&String>) -> Result<Pid, DirectiveError> {
    let arg = arg.ok_or(DirectiveError::Usage {
        directive,
        reason: "missing pid",
    })?;
    match arg.parse::<i32>() {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(DirectiveError::Usage {
            directive,
            reason: "pid must be a positive number",
        }),
    }
}

/// `procs` — ヘッダ + `index\tpid\tSTAT\tcmd`。Terminated のジョブはここで消える。
fn builtin_procs(shell: &mut Shell, out: &mut dyn Write) -> Result<Flow, DirectiveError> {
    writeln!(out, "#\tPID\tSTAT\tCMD")?;
    for entry in shell.jobs.list() {
        writeln!(out, "{entry}")?;
    }
    Ok(Flow::Continue)
}

/// `history` — 最古から `index\tline`。行は自身の改行を含む。
fn builtin_history(shell: &mut Shell, out: &mut dyn Write) -> Result<Flow, DirectiveError> {
    for (i, line) in shell.history.iter().enumerate() {
        write!(out, "{i}\t{line}")?;
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::shell::ShellConfig;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    fn run(shell: &mut Shell, words: &[&str]) -> (Option<Result<Flow, DirectiveError>>, String) {
        let mut buf = Vec::new();
        let result = try_exec(shell, &args(words), &mut buf);
        (result, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn unknown_command_is_not_a_directive() {
        let mut shell = Shell::new(ShellConfig::default());
        assert!(run(&mut shell, &["ls", "-l"]).0.is_none());
        assert!(run(&mut shell, &["Quit"]).0.is_none());
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut shell = Shell::new(ShellConfig::default());
        assert!(matches!(run(&mut shell, &["quit"]).0, Some(Ok(Flow::Quit))));
    }

    #[test]
    fn history_lists_oldest_first() {
        let mut shell = Shell::new(ShellConfig::default());
        shell.history.push("ls\n");
        shell.history.push("history\n");
        let (result, out) = run(&mut shell, &["history"]);
        assert!(matches!(result, Some(Ok(Flow::Continue))));
        assert_eq!(out, "0\tls\n1\thistory\n");
    }

    #[test]
    fn procs_prints_header_only_when_empty() {
        let mut shell = Shell::new(ShellConfig::default());
        let (_, out) = run(&mut shell, &["procs"]);
        assert_eq!(out, "#\tPID\tSTAT\tCMD\n");
    }

    #[test]
    fn alarm_on_missing_pid_is_a_signal_error() {
        let mut shell = Shell::new(ShellConfig::default());
        // pid_max を超える PID は存在しない
        let (result, _) = run(&mut shell, &["alarm", "2147483647"]);
        assert!(matches!(
            result,
            Some(Err(DirectiveError::Signal { source: Errno::ESRCH, .. }))
        ));
    }

    #[test]
    fn signal_directives_validate_pid() {
        let mut shell = Shell::new(ShellConfig::default());
        for words in [&["blast"][..], &["blast", "abc"], &["alarm", "0"], &["suspend", "-1"]] {
            let (result, _) = run(&mut shell, words);
            assert!(matches!(result, Some(Err(DirectiveError::Usage { .. }))));
        }
    }

    #[test]
    fn cd_to_missing_directory_keeps_cwd() {
        let mut shell = Shell::new(ShellConfig::default());
        let before = shell.cwd().to_path_buf();
        let (result, _) = run(&mut shell, &["cd", "/nonexistent/jobsh/dir"]);
        assert!(matches!(
            result,
            Some(Err(DirectiveError::Directory { source: Errno::ENOENT, .. }))
        ));
        assert_eq!(shell.cwd(), before);
    }

    #[test]
    fn cd_without_argument_is_a_usage_error() {
        let mut shell = Shell::new(ShellConfig::default());
        let (result, _) = run(&mut shell, &["cd"]);
        assert!(matches!(result, Some(Err(DirectiveError::Usage { .. }))));
    }
}
