//! パイプライン記述子: 1 行の入力から作られるステージ列と、その妥当性検査。
//!
//! [`Pipeline`] は [`Stage`] の所有ベクタで、パイプライン全体が 1 つの単位として
//! 解放される。起動後は [`Rc`](std::rc::Rc) でジョブテーブルと共有され、
//! 最後のジョブが消えた時点でまとめて drop される。
//!
//! リダイレクトはパイプラインの両端でのみ意味を持つ:
//! 入力は先頭ステージ、出力は末尾ステージだけ。[`validate`] がそれ以外を拒否する。

use std::path::PathBuf;

use thiserror::Error;

// ── データ構造 ───────────────────────────────────────────────────────

/// パイプライン中の 1 コマンド。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// 引数ベクタ。`argv[0]` がプログラム名（パーサーが非空を保証する）。
    pub argv: Vec<String>,
    /// `< path` — stdin の差し替え先。
    pub input: Option<PathBuf>,
    /// `> path` — stdout の差し替え先（追記モード）。
    pub output: Option<PathBuf>,
}

impl Stage {
    /// リダイレクトなしのステージを作る。
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            input: None,
            output: None,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// 表示用コマンド文字列（`argv` を空白で連結）。`procs` の CMD 列に使う。
    pub fn command_text(&self) -> String {
        self.argv.join(" ")
    }
}

/// `|` で連結されたステージ列。
///
/// `blocking` はパイプライン全体に 1 つだけ持つ。`false`（末尾 `&`）なら
/// 単一ステージのときにバックグラウンド実行になる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub blocking: bool,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, blocking: bool) -> Self {
        Self { stages, blocking }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// 先頭ステージ。ディレクティブ判定に使う。
    pub fn first(&self) -> Option<&Stage> {
        self.stages.first()
    }
}

// ── 検査 ─────────────────────────────────────────────────────────────

/// パイプの内側を向いたリダイレクト。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// 後続ステージがあるのに stdout をファイルへ向けている。
    #[error("invalid piping: stage {index} redirects output before a pipe")]
    OutputBeforePipe { index: usize },
    /// 先行ステージがあるのに stdin をファイルから読もうとしている。
    #[error("invalid piping: stage {index} redirects input after a pipe")]
    InputAfterPipe { index: usize },
}

/// リダイレクトがパイプラインの両端にしかないことを確認する。
///
/// 最初に見つかった違反を返す。ステージが 1 つなら常に成功。
pub fn validate(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let last = pipeline.stages.len().saturating_sub(1);
    for (index, stage) in pipeline.stages.iter().enumerate() {
        if index > 0 && stage.input.is_some() {
            return Err(ValidationError::InputAfterPipe { index });
        }
        if index < last && stage.output.is_some() {
            return Err(ValidationError::OutputBeforePipe { index });
        }
    }
    Ok(())
}

/// [`validate`] の真偽値版。
pub fn is_valid(pipeline: &Pipeline) -> bool {
    validate(pipeline).is_ok()
}
