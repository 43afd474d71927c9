//! `fork()` / `execvp()` の Rust ラッパー。
//!
//! ## 構成
//!
//! | 型 / 関数 | 役割 |
//! |-----------|------|
//! | [`Argv`] | argv 用の `CString` 列。fork 前に構築し、子での確保を避ける |
//! | [`StageIo`] | 子プロセスに渡す fd 配線（パイプ端 + ファイルリダイレクト） |
//! | [`exec_stage`] | `execvp` を呼ぶ。戻ってきた時点で失敗 |
//! | [`fork_stage`] | fork して子で配線 → exec、親には子 PID を返す |
//!
//! 子プロセスが失敗したときは `_exit` で即座に終了する。親と共有している
//! stdio バッファを子で二重にフラッシュしないため、`std::process::exit` は使わない。

use std::convert::Infallible;
use std::ffi::CString;
use std::os::fd::OwnedFd;
use std::path::Path;

use nix::errno::Errno;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::debug;

use crate::pipeline::Stage;
use crate::redirect::{self, RedirectionError, StdStream};

// ── エラー型 ──────────────────────────────────────────────────────

/// プログラムを起動できなかった。
#[derive(Debug, Error)]
pub enum ExecError {
    /// 引数に NUL バイトが含まれていて C 文字列にできない。
    #[error("{program}: argument contains a NUL byte")]
    Nul { program: String },
    /// `execvp` が戻ってきた。
    #[error("{program}: execution failed: {source}")]
    Exec {
        program: String,
        #[source]
        source: Errno,
    },
}

/// 子プロセスが exec 前に失敗した理由。子の中でだけ使う。
#[derive(Debug, Error)]
enum ChildError {
    #[error(transparent)]
    Redirection(#[from] RedirectionError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// 失敗した子プロセスの終了コード。
const CHILD_FAILURE: i32 = 1;

// ── Argv ──────────────────────────────────────────────────────────

/// `execvp` に渡す引数列。`args[0]` がプログラム名で、PATH 検索される。
#[derive(Debug)]
pub struct Argv {
    args: Vec<CString>,
}

impl Argv {
    pub fn new(argv: &[String]) -> Result<Self, ExecError> {
        let program = argv.first().cloned().unwrap_or_default();
        let args = argv
            .iter()
            .map(|a| CString::new(a.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ExecError::Nul { program })?;
        Ok(Self { args })
    }

    fn program(&self) -> String {
        self.args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// プロセスイメージを `argv` のプログラムで置き換える。
///
/// 成功すれば戻らない。戻ってきたら必ず `Err`。
pub fn exec_stage(argv: &Argv) -> Result<Infallible, ExecError> {
    let Some(program) = argv.args.first() else {
        return Err(ExecError::Exec {
            program: String::new(),
            source: Errno::ENOENT,
        });
    };
    unistd::execvp(program, &argv.args).map_err(|source| ExecError::Exec {
        program: argv.program(),
        source,
    })
}

// ── StageIo ───────────────────────────────────────────────────────

/// 1 ステージ分の fd 配線。
///
/// パイプ端は借用で、所有権は launcher 側に残る。親側のコピーを閉じるのは launcher の責務。
#[derive(Debug, Default)]
pub struct StageIo<'a> {
    /// 前段パイプの読み取り端 → stdin。
    pub pipe_in: Option<&'a OwnedFd>,
    /// 次段パイプの書き込み端 → stdout。
    pub pipe_out: Option<&'a OwnedFd>,
    /// `< path`（先頭ステージのみ）。
    pub input: Option<&'a Path>,
    /// `> path`（末尾ステージのみ）。
    pub output: Option<&'a Path>,
}

impl<'a> StageIo<'a> {
    /// ステージ自身のファイルリダイレクトだけを持つ配線。
    pub fn for_stage(stage: &'a Stage) -> Self {
        Self {
            pipe_in: None,
            pipe_out: None,
            input: stage.input.as_deref(),
            output: stage.output.as_deref(),
        }
    }

    /// 子プロセス内で配線を適用する。パイプ → ファイルの順。
    fn apply(&self) -> Result<(), RedirectionError> {
        if let Some(end) = self.pipe_in {
            redirect::bind_pipe(end, StdStream::Stdin)?;
        }
        if let Some(end) = self.pipe_out {
            redirect::bind_pipe(end, StdStream::Stdout)?;
        }
        if let Some(path) = self.input {
            redirect::apply_redirection(path, StdStream::Stdin)?;
        }
        if let Some(path) = self.output {
            redirect::apply_redirection(path, StdStream::Stdout)?;
        }
        Ok(())
    }
}

// ── fork ──────────────────────────────────────────────────────────

/// ステージ 1 つ分の子プロセスを起動し、親には子 PID を返す。
///
/// 子は `io` を適用してから `argv` を exec する。どこかで失敗すれば
/// `debug` 時のみ理由を出力し、`_exit` で終了する（親には戻らない）。
pub fn fork_stage(
    stage: &Stage,
    argv: &Argv,
    io: &StageIo<'_>,
    debug: bool,
) -> Result<Pid, Errno> {
    // SAFETY: シェルはシングルスレッドで、子は配線と exec のみを行う。
    match unsafe { unistd::fork() }? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => {
            let err = run_child(stage, argv, io, debug);
            if debug {
                debug!(pid = %unistd::getpid(), "{}", err);
            }
            // SAFETY: `_exit` はバッファをフラッシュせずにプロセスを終了する。
            unsafe { libc::_exit(CHILD_FAILURE) }
        }
    }
}

/// 子プロセス本体。戻ってきたら失敗。
fn run_child(stage: &Stage, argv: &Argv, io: &StageIo<'_>, debug: bool) -> ChildError {
    if debug {
        debug!(pid = %unistd::getpid(), cmd = %stage.command_text(), "child started");
    }
    if let Err(e) = io.apply() {
        return e.into();
    }
    match exec_stage(argv) {
        Ok(never) => match never {},
        Err(e) => e.into(),
    }
}
