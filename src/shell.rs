//! シェルの状態とトップレベルのループ。
//!
//! [`Shell`] がジョブテーブル（[`JobTable`]）・履歴リング（[`HistoryRing`]）・
//! プロンプト用のカレントディレクトリを排他的に所有する。グローバル変数は使わない。
//!
//! 1 行の処理順:
//! 1. パース（失敗なら黙って次のプロンプト）
//! 2. `!!` / `!N` なら履歴の行に置き換えて再パース
//! 3. 履歴に追加（呼び出した行そのものを追加する。`quit` は除く）
//! 4. ディレクティブ判定 → 該当しなければ検査して launcher へ

use std::env;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::builtins::{self, DirectiveError, Flow};
use crate::executor::{self, LaunchError};
use crate::history::{self, HistoryRef, HistoryRing};
use crate::job::JobTable;
use crate::parser::{self, ParseError};
use crate::pipeline::{self, Pipeline};

/// 起動時に決まる設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// `-d`: 診断メッセージを stderr に出す。
    pub debug: bool,
    /// 履歴リングのスロット数。
    pub history_capacity: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            debug: false,
            history_capacity: history::DEFAULT_CAPACITY,
        }
    }
}

/// セッションを終わらせる失敗。これ以外のエラーはすべてループ内で吸収される。
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Launch(LaunchError),
    #[error("couldn't read input: {0}")]
    Input(#[source] io::Error),
    #[error("couldn't write output: {0}")]
    Output(#[source] io::Error),
}

/// シェルの実行状態。
pub struct Shell {
    pub config: ShellConfig,
    pub jobs: JobTable,
    pub history: HistoryRing,
    /// プロンプト用のキャッシュ。`cd` 成功時のみ更新する。
    cwd: PathBuf,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        let history = HistoryRing::new(config.history_capacity);
        Self {
            config,
            jobs: JobTable::new(),
            history,
            cwd: env::current_dir().unwrap_or_default(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub(crate) fn refresh_cwd(&mut self) {
        if let Ok(dir) = env::current_dir() {
            self.cwd = dir;
        }
    }

    /// `cwd: ` 形式のプロンプト。
    pub fn prompt(&self) -> String {
        format!("{}: ", self.cwd.display())
    }

    /// 入力が尽きるか `quit` されるまで 1 行ずつ処理する。
    ///
    /// 残っているバックグラウンドジョブには何もしない（終了もさせないし待ちもしない）。
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> Result<(), ShellError> {
        let mut buf = Vec::new();
        loop {
            write!(out, "{}", self.prompt()).map_err(ShellError::Output)?;
            out.flush().map_err(ShellError::Output)?;

            buf.clear();
            if input.read_until(b'\n', &mut buf).map_err(ShellError::Input)? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                self.report(&ParseError::NotUtf8);
                continue;
            };

            if self.execute_line(line, out)? == Flow::Quit {
                break;
            }
        }
        if self.config.debug && !self.jobs.is_empty() {
            debug!(jobs = self.jobs.len(), "leaving tracked jobs running");
        }
        Ok(())
    }

    /// 1 行を処理する。セッションを終わらせる失敗だけを `Err` で返す。
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Flow, ShellError> {
        let Some(pipeline) = self.parse_line(line) else {
            return Ok(Flow::Continue);
        };

        let (line, pipeline) = match self.recall(&pipeline, out)? {
            Recall::NotAReference => (line.to_string(), pipeline),
            Recall::Discard => return Ok(Flow::Continue),
            Recall::Line(text) => match self.parse_line(&text) {
                Some(recalled) => (text, recalled),
                None => return Ok(Flow::Continue),
            },
        };

        let args = pipeline.first().map(|s| s.argv.clone()).unwrap_or_default();
        // `quit` は履歴に残さない
        if args.first().map(String::as_str) != Some("quit") {
            self.history.push(&line);
        }

        match builtins::try_exec(self, &args, out) {
            Some(Ok(flow)) => return Ok(flow),
            Some(Err(DirectiveError::Io(e))) => return Err(ShellError::Output(e)),
            Some(Err(e)) => {
                self.report(&e);
                return Ok(Flow::Continue);
            }
            None => {}
        }

        if let Err(e) = pipeline::validate(&pipeline) {
            self.report(&e);
            return Ok(Flow::Continue);
        }

        out.flush().map_err(ShellError::Output)?;
        match executor::launch(Rc::new(pipeline), &mut self.jobs, self.config.debug) {
            Ok(_) => Ok(Flow::Continue),
            Err(e) if e.is_fatal() => Err(ShellError::Launch(e)),
            Err(e) => {
                self.report(&e);
                Ok(Flow::Continue)
            }
        }
    }

    fn parse_line(&self, line: &str) -> Option<Pipeline> {
        match parser::parse(line) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// 先頭トークンが `!` 参照なら履歴の行に解決する。
    ///
    /// 解決できない参照は `*> ` 付きでユーザに報告する（debug に関係なく）。
    fn recall(&self, pipeline: &Pipeline, out: &mut dyn Write) -> Result<Recall, ShellError> {
        let Some(first) = pipeline.first().map(|s| s.program()) else {
            return Ok(Recall::NotAReference);
        };
        let resolved = match HistoryRef::parse(first) {
            None => return Ok(Recall::NotAReference),
            Some(Ok(reference)) => self.history.resolve(reference),
            Some(Err(e)) => Err(e),
        };
        match resolved {
            Ok(Some(text)) => Ok(Recall::Line(text.to_string())),
            Ok(None) => Ok(Recall::Discard),
            Err(e) => {
                writeln!(out, "*> {e}").map_err(ShellError::Output)?;
                Ok(Recall::Discard)
            }
        }
    }

    /// debug 時のみ診断を出す。
    fn report(&self, err: &dyn fmt::Display) {
        if self.config.debug {
            debug!("{err}");
        }
    }
}

/// 履歴参照の解決結果。
enum Recall {
    NotAReference,
    /// 参照だが実行するものはない（空の `!!`、不正な `!N`）。
    Discard,
    Line(String),
}
