//! ジョブテーブル: 起動した全プロセスの PID・コマンド・状態を追跡する。
//!
//! 状態の更新経路は 2 つだけ:
//! - 非ブロッキングのポーリング（[`JobTable::refresh_status`] / [`poll_status`]）
//! - シグナル送信成功後の明示的な上書き（[`JobTable::update_status`]）
//!
//! Terminated になったジョブは [`JobTable::list`] の副作用としてのみ削除される。

use std::fmt;
use std::rc::Rc;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::pipeline::{Pipeline, Stage};

// ── データ構造 ───────────────────────────────────────────────────────

/// ジョブ（= 1 プロセス）のライフサイクル状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    /// SIGTSTP 等で停止中。
    Suspended,
    /// 正常終了・シグナル終了、または PID がもう存在しない。
    Terminated,
}

impl JobStatus {
    /// `procs` の STAT 列に出す 4 文字コード。
    pub fn code(self) -> &'static str {
        match self {
            Self::Running => "RUNN",
            Self::Suspended => "SUSP",
            Self::Terminated => "TERM",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 1 ステージに対応する 1 プロセス。
#[derive(Debug)]
pub struct Job {
    pub pid: Pid,
    /// 起動元のパイプライン。同じパイプラインの全ジョブで共有する。
    pipeline: Rc<Pipeline>,
    /// `pipeline.stages` 内の位置。
    stage: usize,
    pub status: JobStatus,
}

impl Job {
    pub fn stage(&self) -> &Stage {
        &self.pipeline.stages[self.stage]
    }

    pub fn command_text(&self) -> String {
        self.stage().command_text()
    }
}

/// [`JobTable::list`] が返す 1 行分。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub index: usize,
    pub pid: Pid,
    pub status: JobStatus,
    pub command: String,
}

impl fmt::Display for JobEntry {
    /// `index<TAB>pid<TAB>STAT<TAB>cmd` 形式。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.index, self.pid, self.status, self.command
        )
    }
}

// ── ポーリング ──────────────────────────────────────────────────────

/// `waitpid(pid, WNOHANG | WUNTRACED | WCONTINUED)` で状態を 1 回だけ確認する。
///
/// 状態変化がなければ `current` をそのまま返す。停止中のプロセスは
/// 停止を一度しか報告しないため、変化なしを Running に戻すと停止が失われる。
/// ただし Terminated と上書きされたのにまだ生きている（SIGTERM を無視した等）なら Running。
/// エラー（ECHILD 等）は「プロセスはもういない」とみなして Terminated。
pub fn poll_status(pid: Pid, current: JobStatus) -> JobStatus {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    match waitpid(pid, Some(flags)) {
        Ok(WaitStatus::StillAlive) if current == JobStatus::Terminated => JobStatus::Running,
        Ok(WaitStatus::StillAlive) => current,
        Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => JobStatus::Terminated,
        Ok(WaitStatus::Stopped(..)) => JobStatus::Suspended,
        Ok(WaitStatus::Continued(..)) => JobStatus::Running,
        Ok(_) => current,
        Err(_) => JobStatus::Terminated,
    }
}

// ── JobTable ─────────────────────────────────────────────────────────

/// ジョブテーブル。挿入順を保持し、PID ごとに高々 1 エントリ。
///
/// [`Shell`](crate::shell::Shell) が所有し、launcher と builtins から参照される。
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// `pipeline.stages[stage]` を実行している `pid` を登録する。
    ///
    /// 初期状態は即時のポーリング結果（通常は Running）。
    /// 同じ PID の古いエントリがあれば置き換える（PID 再利用）。
    pub fn add(&mut self, pipeline: Rc<Pipeline>, stage: usize, pid: Pid) {
        self.jobs.retain(|j| j.pid != pid);
        let status = poll_status(pid, JobStatus::Running);
        self.jobs.push(Job {
            pid,
            pipeline,
            stage,
            status,
        });
    }

    /// 全ジョブの状態を非ブロッキングで更新する。
    ///
    /// Terminated と上書き済みのジョブも含めて polling する。`blast` 後の子は
    /// ここで回収され、シグナルを生き延びた子は一覧に戻る。
    pub fn refresh_status(&mut self) {
        for job in &mut self.jobs {
            job.status = poll_status(job.pid, job.status);
        }
    }

    /// 状態を更新し、Terminated のジョブをテーブルから取り除いてから一覧を返す。
    ///
    /// 番号は生き残ったジョブに 0 から振る（挿入順）。
    pub fn list(&mut self) -> Vec<JobEntry> {
        self.refresh_status();
        self.remove_terminated();
        self.jobs
            .iter()
            .enumerate()
            .map(|(index, job)| JobEntry {
                index,
                pid: job.pid,
                status: job.status,
                command: job.command_text(),
            })
            .collect()
    }

    /// シグナル送信成功後などの外部通知で状態を上書きする。未登録 PID なら何もしない。
    pub fn update_status(&mut self, pid: Pid, status: JobStatus) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.pid == pid) {
            job.status = status;
        }
    }

    /// Terminated のジョブを相対順序を保ったまま削除する。
    fn remove_terminated(&mut self) {
        self.jobs.retain(|j| j.status != JobStatus::Terminated);
    }

    pub fn get(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|j| j.pid == pid)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 全ジョブのイテレータ（挿入順）。
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}
