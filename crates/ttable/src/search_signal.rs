//! 探索終了の待ち合わせ
//!
//! 置換表のリサイズ・クリアは探索と並行して実行できない。
//! 呼び出し側は `SearchBarrier` を介して「探索中でない」状態を待つ。

use parking_lot::{Condvar, Mutex};

/// 探索が終わるまで呼び出しスレッドをブロックするトレイト
pub trait SearchBarrier: Send + Sync {
    fn wait_for_search_finished(&self);
}

/// 探索を持たない呼び出し元用のダミー実装
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSearch;

impl SearchBarrier for NoSearch {
    #[inline]
    fn wait_for_search_finished(&self) {}
}

/// 実行中の探索数を数えるシグナル
///
/// 探索スレッドは `begin` で得たガードを探索中保持し、
/// `wait_for_search_finished` は全ガードが破棄されるまで待つ。
#[derive(Default)]
pub struct SearchSignal {
    active: Mutex<usize>,
    finished: Condvar,
}

impl SearchSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 探索開始を通知する
    pub fn begin(&self) -> SearchGuard<'_> {
        *self.active.lock() += 1;
        SearchGuard { signal: self }
    }

    /// 実行中の探索数
    pub fn active(&self) -> usize {
        *self.active.lock()
    }

    fn end(&self) {
        let mut active = self.active.lock();
        *active -= 1;
        if *active == 0 {
            self.finished.notify_all();
        }
    }
}

impl SearchBarrier for SearchSignal {
    fn wait_for_search_finished(&self) {
        let mut active = self.active.lock();
        while *active > 0 {
            self.finished.wait(&mut active);
        }
    }
}

/// 探索中であることを示すガード（drop で終了を通知）
pub struct SearchGuard<'a> {
    signal: &'a SearchSignal,
}

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        self.signal.end();
    }
}
