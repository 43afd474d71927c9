//! 標準ストリームの差し替え。fork 後、exec 前の子プロセスからだけ呼ばれる。
//!
//! - [`apply_redirection`]: ファイルへのリダイレクト（`<` / `>`）
//! - [`bind_pipe`]: パイプ端を stdin / stdout に複製する
//!
//! どちらも失敗すれば [`RedirectionError`] を返し、呼び出し側の子プロセスは
//! exec せずに終了しなければならない。ストリームが誤った先を向いたまま
//! プログラムを実行させないため。

use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;
use thiserror::Error;

/// 差し替え対象の標準ストリーム。stderr は対象外。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
}

impl StdStream {
    pub fn fd(self) -> RawFd {
        match self {
            Self::Stdin => libc::STDIN_FILENO,
            Self::Stdout => libc::STDOUT_FILENO,
        }
    }

    /// stdin は読み取り専用、stdout は書き込み + 作成 + 追記。
    fn open_flags(self) -> OFlag {
        match self {
            Self::Stdin => OFlag::O_RDONLY,
            Self::Stdout => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
        }
    }
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::Stdout => f.write_str("stdout"),
        }
    }
}

/// ストリーム差し替えの失敗。
#[derive(Debug, Error)]
pub enum RedirectionError {
    #[error("couldn't close {stream}: {source}")]
    Close {
        stream: StdStream,
        #[source]
        source: Errno,
    },
    #[error("couldn't open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Errno,
    },
    /// 解放した番号とは別の fd が返ってきた（迷子の fd は閉じ済み）。
    #[error("open returned fd {got}, expected {expected}")]
    Misplaced { expected: RawFd, got: RawFd },
    #[error("couldn't duplicate fd {fd} onto {stream}: {source}")]
    Dup {
        fd: RawFd,
        stream: StdStream,
        #[source]
        source: Errno,
    },
}

/// 新規作成される出力ファイルのパーミッション（rwxr--r--）。
const OUTPUT_MODE: u32 = 0o744;

/// `stream` を閉じてから `path` を開き直し、同じ fd 番号に収める。
///
/// カーネルは未使用 fd の最小番号を割り当てるため、直前に閉じた番号が
/// そのまま返ってくるはず。別の番号が返った場合はそれを閉じて失敗とする。
pub fn apply_redirection(path: &Path, stream: StdStream) -> Result<(), RedirectionError> {
    let target = stream.fd();

    unistd::close(target).map_err(|source| RedirectionError::Close { stream, source })?;

    let mode = Mode::from_bits_truncate(OUTPUT_MODE as _);
    let fd = fcntl::open(path, stream.open_flags(), mode).map_err(|source| {
        RedirectionError::Open {
            path: path.to_path_buf(),
            source,
        }
    })?;

    if fd != target {
        let _ = unistd::close(fd);
        return Err(RedirectionError::Misplaced {
            expected: target,
            got: fd,
        });
    }
    Ok(())
}

/// パイプ端 `end` を `stream` に `dup2` する。
///
/// `end` 自体は呼び出し側が所有したまま。パイプは `O_CLOEXEC` 付きで作られるので
/// 元の番号は exec 時に閉じられ、複製先の 0/1 だけが残る。
pub fn bind_pipe(end: &impl AsRawFd, stream: StdStream) -> Result<(), RedirectionError> {
    let fd = end.as_raw_fd();
    unistd::dup2(fd, stream.fd()).map_err(|source| RedirectionError::Dup { fd, stream, source })?;
    Ok(())
}
