//! jobsh ライブラリ — ベンチマーク・テスト用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ（[`shell::Shell::run`]）。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | 行パーサー（空白区切り、`\|`、`<`/`>`、末尾 `&`） |
//! | [`pipeline`] | パイプライン記述子（[`Stage`](pipeline::Stage) 列）とリダイレクト位置の検査 |
//! | [`redirect`] | stdin/stdout の差し替え（ファイルリダイレクト、パイプ端の複製） |
//! | [`spawn`] | `fork` / `execvp` ラッパー（子プロセスでの配線と exec） |
//! | [`executor`] | パイプライン起動（パイプ作成、ステージごとの fork、待機） |
//! | [`job`] | ジョブテーブル（PID・状態の追跡、`procs` 用一覧） |
//! | [`history`] | 履歴リングバッファと `!!` / `!N` 参照 |
//! | [`builtins`] | ディレクティブ（`quit`, `cd`, `alarm`, `blast`, `suspend`, `procs`, `history`） |
//! | [`shell`] | シェルの状態（ジョブテーブル、履歴、カレントディレクトリ）とループ |

pub mod builtins;
pub mod executor;
pub mod history;
pub mod job;
pub mod parser;
pub mod pipeline;
pub mod redirect;
pub mod shell;
pub mod spawn;
