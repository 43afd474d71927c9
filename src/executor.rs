//! プロセス起動: パイプラインの各ステージを fork し、パイプで接続してジョブテーブルに登録する。
//!
//! - 単一ステージ: fork → 子でリダイレクト適用 → exec。
//!   `blocking` なら子の終了まで待ち、そうでなければ即座に戻る（バックグラウンド）。
//! - 複数ステージ: 隣接ステージ間のパイプを**すべて fork 前に**作成し、各ステージを fork。
//!   親は両端の子が揃った時点で自分のパイプ端を閉じる。パイプラインは
//!   `blocking` に関係なく全ステージの終了を待つ。
//!
//! パイプは `O_CLOEXEC` 付きの [`OwnedFd`] で、どの経路で関数を抜けても閉じられる。

use std::os::fd::OwnedFd;
use std::rc::Rc;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, Pid};
use thiserror::Error;
use tracing::debug;

use crate::job::{JobStatus, JobTable};
use crate::pipeline::Pipeline;
use crate::spawn::{self, Argv, ExecError, StageIo};

// ── エラー型 ──────────────────────────────────────────────────────

/// パイプライン起動の失敗。子プロセス内の失敗はここには現れない。
#[derive(Debug, Error)]
pub enum LaunchError {
    /// fork 失敗。シェルのループを終了させる。
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
    /// パイプ作成失敗。どのプロセスも起動していない。
    #[error("pipe failed: {0}")]
    Pipe(#[source] Errno),
    /// argv を C 文字列にできなかった。どのプロセスも起動していない。
    #[error(transparent)]
    Argv(#[from] ExecError),
}

impl LaunchError {
    /// シェルのセッションを終わらせるべき失敗か。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fork(_))
    }
}

/// 起動結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// ステージ順の子 PID。
    pub pids: Vec<Pid>,
    /// 全プロセスの終了まで待ったか。
    pub waited: bool,
}

// ── 起動 ─────────────────────────────────────────────────────────────

/// パイプラインを起動し、全 PID をジョブテーブルに登録する。
///
/// 呼び出し前に [`validate`](crate::pipeline::validate) を通しておくこと。
/// stdout に溜まったバッファは呼び出し側で flush しておく（子に複製されるため）。
pub fn launch(
    pipeline: Rc<Pipeline>,
    jobs: &mut JobTable,
    debug: bool,
) -> Result<LaunchOutcome, LaunchError> {
    let argvs = pipeline
        .stages
        .iter()
        .map(|s| Argv::new(&s.argv))
        .collect::<Result<Vec<_>, _>>()?;

    if pipeline.len() == 1 {
        launch_single(pipeline, &argvs[0], jobs, debug)
    } else {
        launch_piped(pipeline, &argvs, jobs, debug)
    }
}

fn launch_single(
    pipeline: Rc<Pipeline>,
    argv: &Argv,
    jobs: &mut JobTable,
    debug: bool,
) -> Result<LaunchOutcome, LaunchError> {
    let stage = &pipeline.stages[0];
    let pid = spawn::fork_stage(stage, argv, &StageIo::for_stage(stage), debug)
        .map_err(LaunchError::Fork)?;
    if debug {
        debug!(%pid, cmd = %stage.command_text(), blocking = pipeline.blocking, "launched");
    }

    let blocking = pipeline.blocking;
    jobs.add(Rc::clone(&pipeline), 0, pid);

    if blocking {
        wait_for(pid);
        jobs.update_status(pid, JobStatus::Terminated);
    }

    Ok(LaunchOutcome {
        pids: vec![pid],
        waited: blocking,
    })
}

fn launch_piped(
    pipeline: Rc<Pipeline>,
    argvs: &[Argv],
    jobs: &mut JobTable,
    debug: bool,
) -> Result<LaunchOutcome, LaunchError> {
    let n = pipeline.len();

    // pipes[i] は stage i → stage i+1。fork より前に全部作る。
    let mut pipes: Vec<Option<(OwnedFd, OwnedFd)>> = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        let pair = unistd::pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Pipe)?;
        pipes.push(Some(pair));
    }

    let mut pids = Vec::with_capacity(n);
    for (i, stage) in pipeline.stages.iter().enumerate() {
        let io = StageIo {
            pipe_in: i
                .checked_sub(1)
                .and_then(|p| pipes[p].as_ref())
                .map(|(read, _)| read),
            pipe_out: pipes.get(i).and_then(Option::as_ref).map(|(_, write)| write),
            input: stage.input.as_deref(),
            output: stage.output.as_deref(),
        };

        let pid = match spawn::fork_stage(stage, &argvs[i], &io, debug) {
            Ok(pid) => pid,
            Err(e) => {
                // 起動済みの子が端末を読んでいると待ちが終わらないので、先に終了させる
                drop(pipes);
                abandon(&pids, jobs);
                return Err(LaunchError::Fork(e));
            }
        };
        if debug {
            debug!(%pid, stage = i, cmd = %stage.command_text(), "launched");
        }
        jobs.add(Rc::clone(&pipeline), i, pid);
        pids.push(pid);

        // 前段パイプは書き手（i-1）も読み手（i）も fork 済み
        if let Some(prev) = i.checked_sub(1) {
            pipes[prev] = None;
        }
    }
    drop(pipes);

    for &pid in &pids {
        wait_for(pid);
        jobs.update_status(pid, JobStatus::Terminated);
    }

    Ok(LaunchOutcome { pids, waited: true })
}

/// 途中まで起動したパイプラインの子を SIGTERM で終わらせて回収する。
fn abandon(pids: &[Pid], jobs: &mut JobTable) {
    for &pid in pids {
        let _ = signal::kill(pid, Signal::SIGTERM);
    }
    for &pid in pids {
        wait_for(pid);
        jobs.update_status(pid, JobStatus::Terminated);
    }
}

/// `pid` が終了するまで待つ。EINTR は再試行、ECHILD（回収済み）は終了扱い。
fn wait_for(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return,
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(_) => return,
        }
    }
}
