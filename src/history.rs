//! コマンド履歴のリングバッファ。
//!
//! 容量 N の固定スロットに入力行をそのまま（末尾の改行込みで）保存する。
//! 満杯で追加すると最古のエントリを上書きし、`oldest` カーソルが 1 つ進む。
//!
//! ## 参照構文
//!
//! - `!!` — 最新のエントリ（履歴が空なら何もしない）
//! - `!N` — 現存する最古のエントリから数えて N 番目（0 始まり）
//!
//! 参照の解決は [`HistoryRef::parse`] + [`HistoryRing::resolve`]。

use thiserror::Error;

/// `-n` 未指定時の容量。
pub const DEFAULT_CAPACITY: usize = 20;

/// 履歴参照の失敗。メッセージはユーザにそのまま表示される。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// `!` の後が数字だけではない。
    #[error("not an index.")]
    NotAnIndex,
    /// 範囲外、または空スロット。
    #[error("invalid index.")]
    InvalidIndex,
}

/// 入力行の先頭トークンが表す履歴参照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRef {
    /// `!!`
    Last,
    /// `!N`
    Index(usize),
}

impl HistoryRef {
    /// `token` が `!` で始まらなければ `None`。
    ///
    /// `!-3` のような負数は数値としては読めるので [`HistoryError::InvalidIndex`]、
    /// `!abc` や `!` 単体は [`HistoryError::NotAnIndex`]。
    pub fn parse(token: &str) -> Option<Result<Self, HistoryError>> {
        let rest = token.strip_prefix('!')?;
        if rest == "!" {
            return Some(Ok(Self::Last));
        }
        let digits = rest.strip_prefix('-').unwrap_or(rest);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Err(HistoryError::NotAnIndex));
        }
        if rest.starts_with('-') {
            return Some(Err(HistoryError::InvalidIndex));
        }
        Some(
            digits
                .parse::<usize>()
                .map(Self::Index)
                .map_err(|_| HistoryError::InvalidIndex),
        )
    }
}

/// 固定容量の履歴リング。
#[derive(Debug)]
pub struct HistoryRing {
    slots: Vec<Option<String>>,
    /// 最古エントリのスロット。空のときは `None`。
    oldest: Option<usize>,
    /// 最新エントリのスロット。空のときは `None`。
    newest: Option<usize>,
}

impl HistoryRing {
    /// 容量 `capacity` のリングを作る。0 は 1 に切り上げる。
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            oldest: None,
            newest: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        match (self.oldest, self.newest) {
            (Some(o), Some(n)) => (n + self.capacity() - o) % self.capacity() + 1,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.newest.is_none()
    }

    /// 行を末尾に追加する。満杯なら最古を上書きして `oldest` を進める。
    pub fn push(&mut self, line: &str) {
        let cap = self.capacity();
        let newest = self.newest.map_or(0, |n| (n + 1) % cap);
        let oldest = self.oldest.unwrap_or(0);

        self.oldest = Some(if self.slots[newest].is_some() {
            (oldest + 1) % cap
        } else {
            oldest
        });
        self.slots[newest] = Some(line.to_string());
        self.newest = Some(newest);
    }

    /// 最新のエントリ。
    pub fn newest(&self) -> Option<&str> {
        self.newest.and_then(|n| self.slots[n].as_deref())
    }

    /// 最古から数えて `n` 番目のエントリ。
    pub fn get(&self, n: usize) -> Result<&str, HistoryError> {
        let oldest = self.oldest.ok_or(HistoryError::InvalidIndex)?;
        if n >= self.capacity() {
            return Err(HistoryError::InvalidIndex);
        }
        self.slots[(oldest + n) % self.capacity()]
            .as_deref()
            .ok_or(HistoryError::InvalidIndex)
    }

    /// 参照を解決する。`!!` で履歴が空なら `Ok(None)`（何もしない）。
    pub fn resolve(&self, reference: HistoryRef) -> Result<Option<&str>, HistoryError> {
        match reference {
            HistoryRef::Last => Ok(self.newest()),
            HistoryRef::Index(n) => self.get(n).map(Some),
        }
    }

    /// 最古から順に走査する。
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let cap = self.capacity();
        let start = self.oldest.unwrap_or(0);
        (0..self.len()).filter_map(move |i| self.slots[(start + i) % cap].as_deref())
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(capacity: usize, lines: &[&str]) -> HistoryRing {
        let mut h = HistoryRing::new(capacity);
        for line in lines {
            h.push(line);
        }
        h
    }

    #[test]
    fn empty_ring() {
        let h = HistoryRing::new(3);
        assert!(h.is_empty());
        assert_eq!(h.len(), 0);
        assert_eq!(h.newest(), None);
        assert_eq!(h.get(0), Err(HistoryError::InvalidIndex));
        assert_eq!(h.resolve(HistoryRef::Last), Ok(None));
        assert_eq!(h.iter().count(), 0);
    }

    #[test]
    fn push_keeps_lines_verbatim() {
        let h = ring_with(3, &["ls -l\n", "pwd\n"]);
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(0), Ok("ls -l\n"));
        assert_eq!(h.newest(), Some("pwd\n"));
        assert_eq!(h.get(2), Err(HistoryError::InvalidIndex));
    }

    #[test]
    fn overflow_evicts_oldest_once_per_push() {
        let mut h = ring_with(3, &["a\n", "b\n", "c\n"]);
        assert_eq!(h.len(), 3);

        h.push("d\n");
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["b\n", "c\n", "d\n"]);

        h.push("e\n");
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["c\n", "d\n", "e\n"]);
        assert_eq!(h.len(), 3);
        assert_eq!(h.get(0), Ok("c\n"));
        assert_eq!(h.get(3), Err(HistoryError::InvalidIndex));
    }

    #[test]
    fn wraps_many_times() {
        let lines: Vec<String> = (0..47).map(|i| format!("cmd {i}\n")).collect();
        let mut h = HistoryRing::new(DEFAULT_CAPACITY);
        for line in &lines {
            h.push(line);
        }
        assert_eq!(h.len(), DEFAULT_CAPACITY);
        assert_eq!(h.get(0), Ok("cmd 27\n"));
        assert_eq!(h.newest(), Some("cmd 46\n"));
    }

    #[test]
    fn capacity_one() {
        let h = ring_with(1, &["a\n", "b\n"]);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(0), Ok("b\n"));
        assert_eq!(HistoryRing::new(0).capacity(), 1);
    }

    #[test]
    fn parse_references() {
        assert_eq!(HistoryRef::parse("ls"), None);
        assert_eq!(HistoryRef::parse("!!"), Some(Ok(HistoryRef::Last)));
        assert_eq!(HistoryRef::parse("!0"), Some(Ok(HistoryRef::Index(0))));
        assert_eq!(HistoryRef::parse("!12"), Some(Ok(HistoryRef::Index(12))));
        assert_eq!(HistoryRef::parse("!"), Some(Err(HistoryError::NotAnIndex)));
        assert_eq!(HistoryRef::parse("!1a"), Some(Err(HistoryError::NotAnIndex)));
        assert_eq!(HistoryRef::parse("!-1"), Some(Err(HistoryError::InvalidIndex)));
    }

    #[test]
    fn resolve_index() {
        let h = ring_with(3, &["a\n", "b\n"]);
        assert_eq!(h.resolve(HistoryRef::Index(1)), Ok(Some("b\n")));
        assert_eq!(h.resolve(HistoryRef::Last), Ok(Some("b\n")));
        assert_eq!(
            h.resolve(HistoryRef::Index(2)),
            Err(HistoryError::InvalidIndex)
        );
    }
}
