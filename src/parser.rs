//! 行パーサー: 入力 1 行から [`Pipeline`] を構築する。
//!
//! シェル本体からは外部協力者として扱われる最小限の構文だけを受け付ける。
//!
//! ## 対応構文
//!
//! - 単語区切り: ASCII 空白
//! - パイプライン: `cmd1 | cmd2 | cmd3`
//! - リダイレクト: `< path`, `> path`（`>out.txt` のような連結形も可）
//! - バックグラウンド実行: 末尾の `&`（`sleep 5&` も可）
//!
//! クォート、変数展開、glob は扱わない。
//! 内側ステージのリダイレクトもそのまま保持し、拒否は [`validate`](crate::pipeline::validate) に任せる。

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{Pipeline, Stage};

// ── Error ───────────────────────────────────────────────────────────

/// パース時に発生しうるエラー。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// 空行または空白のみ。
    #[error("empty command line")]
    Empty,
    /// `|` の前後にコマンドがない。
    #[error("syntax error: missing command around `|`")]
    EmptyStage,
    /// リダイレクト演算子の後にターゲットファイル名がない。
    #[error("syntax error: missing redirect target")]
    MissingTarget,
    /// `&` が行末以外に現れた。
    #[error("syntax error: `&` must end the line")]
    MisplacedAmpersand,
    /// 入力行が UTF-8 として読めない。引数を書き換えずに行ごと捨てる。
    #[error("input line is not valid UTF-8")]
    NotUtf8,
}

// ── Tokenizer (crate-private) ───────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Pipe,       // |
    RedirectIn, // <
    RedirectOut, // >
    Ampersand,  // &
}

/// 入力文字列をトークン列に変換するイテレータ。
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn is_operator(b: u8) -> bool {
        matches!(b, b'|' | b'<' | b'>' | b'&')
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }

        let b = bytes[self.pos];
        if Self::is_operator(b) {
            self.pos += 1;
            return Some(match b {
                b'|' => Token::Pipe,
                b'<' => Token::RedirectIn,
                b'>' => Token::RedirectOut,
                _ => Token::Ampersand,
            });
        }

        let start = self.pos;
        while self.pos < bytes.len()
            && !bytes[self.pos].is_ascii_whitespace()
            && !Self::is_operator(bytes[self.pos])
        {
            self.pos += 1;
        }
        Some(Token::Word(&self.input[start..self.pos]))
    }
}

// ── Parser ──────────────────────────────────────────────────────────

/// 1 行をパースして [`Pipeline`] を返す。
///
/// 行末の改行は単語区切りとして無視される。
pub fn parse(line: &str) -> Result<Pipeline, ParseError> {
    let mut tokens = Tokenizer::new(line).peekable();
    let mut stages: Vec<Stage> = Vec::new();
    let mut current = Stage::new(Vec::<String>::new());
    let mut blocking = true;

    if tokens.peek().is_none() {
        return Err(ParseError::Empty);
    }

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(w) => current.argv.push(w.to_string()),
            Token::Pipe => {
                if current.argv.is_empty() {
                    return Err(ParseError::EmptyStage);
                }
                stages.push(std::mem::replace(
                    &mut current,
                    Stage::new(Vec::<String>::new()),
                ));
            }
            Token::RedirectIn | Token::RedirectOut => {
                let target = match tokens.next() {
                    Some(Token::Word(w)) => PathBuf::from(w),
                    _ => return Err(ParseError::MissingTarget),
                };
                if token == Token::RedirectIn {
                    current.input = Some(target);
                } else {
                    current.output = Some(target);
                }
            }
            Token::Ampersand => {
                if tokens.peek().is_some() {
                    return Err(ParseError::MisplacedAmpersand);
                }
                blocking = false;
            }
        }
    }

    if current.argv.is_empty() {
        // `& ` だけの行はコマンドなし、`ls |` はステージ欠落
        return Err(if stages.is_empty() {
            ParseError::Empty
        } else {
            ParseError::EmptyStage
        });
    }
    stages.push(current);

    Ok(Pipeline::new(stages, blocking))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// パース結果の各ステージの引数を文字列ベクタとして取り出す。
    fn parse_args(input: &str) -> Vec<Vec<String>> {
        parse(input)
            .unwrap()
            .stages
            .iter()
            .map(|s| s.argv.clone())
            .collect()
    }

    // ── 単純コマンド ──

    #[test]
    fn simple_command() {
        assert_eq!(
            parse_args("echo hello world\n"),
            vec![vec!["echo", "hello", "world"]],
        );
    }

    #[test]
    fn extra_whitespace() {
        assert_eq!(parse_args("  echo   hello  \t"), vec![vec!["echo", "hello"]]);
    }

    #[test]
    fn empty_line() {
        assert_eq!(parse("\n"), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
    }

    // ── パイプライン ──

    #[test]
    fn three_stage_pipeline() {
        assert_eq!(
            parse_args("cat f | grep x | wc -l"),
            vec![vec!["cat", "f"], vec!["grep", "x"], vec!["wc", "-l"]],
        );
    }

    #[test]
    fn pipe_without_spaces() {
        assert_eq!(parse_args("ls|wc"), vec![vec!["ls"], vec!["wc"]]);
    }

    #[test]
    fn missing_stage() {
        assert_eq!(parse("| wc"), Err(ParseError::EmptyStage));
        assert_eq!(parse("ls |"), Err(ParseError::EmptyStage));
        assert_eq!(parse("ls || wc"), Err(ParseError::EmptyStage));
    }

    // ── リダイレクト ──

    #[test]
    fn redirects_on_single_stage() {
        let p = parse("sort < in.txt > out.txt").unwrap();
        assert_eq!(p.stages[0].argv, vec!["sort"]);
        assert_eq!(p.stages[0].input, Some(PathBuf::from("in.txt")));
        assert_eq!(p.stages[0].output, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn attached_redirect_target() {
        let p = parse("echo hi >out.txt").unwrap();
        assert_eq!(p.stages[0].output, Some(PathBuf::from("out.txt")));
        assert_eq!(p.stages[0].argv, vec!["echo", "hi"]);
    }

    #[test]
    fn interior_redirect_is_kept_for_validation() {
        let p = parse("ls > a | wc").unwrap();
        assert_eq!(p.stages[0].output, Some(PathBuf::from("a")));
        assert!(!crate::pipeline::is_valid(&p));
    }

    #[test]
    fn missing_redirect_target() {
        assert_eq!(parse("cat <"), Err(ParseError::MissingTarget));
        assert_eq!(parse("echo > | wc"), Err(ParseError::MissingTarget));
    }

    // ── バックグラウンド ──

    #[test]
    fn trailing_ampersand_clears_blocking() {
        let p = parse("sleep 5 &\n").unwrap();
        assert!(!p.blocking);
        assert_eq!(p.stages[0].argv, vec!["sleep", "5"]);

        let p = parse("sleep 5&").unwrap();
        assert!(!p.blocking);
    }

    #[test]
    fn default_is_blocking() {
        assert!(parse("ls").unwrap().blocking);
    }

    #[test]
    fn ampersand_not_at_end() {
        assert_eq!(parse("sleep 1 & ls"), Err(ParseError::MisplacedAmpersand));
        assert_eq!(parse("&"), Err(ParseError::Empty));
    }
}
