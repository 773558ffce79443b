//! 置換表の並列ゼロクリア
//!
//! クラスター配列をスレッド数で等分し、各スレッドが自分の区間を
//! ゼロで埋める。割り切れない余りは最後のスレッドが受け持つ。

use super::BIND_THREAD_THRESHOLD;
use super::table::Cluster;
use crate::affinity::ThreadBinder;
use std::ops::Range;
use std::ptr::NonNull;

/// idx 番目のスレッドが受け持つクラスター区間
pub(super) fn stripe(len: usize, threads: usize, idx: usize) -> Range<usize> {
    debug_assert!(threads > 0 && idx < threads);
    let stride = len / threads;
    let start = stride * idx;
    let end = if idx + 1 == threads { len } else { start + stride };
    start..end
}

/// `clusters` から始まる `len` 個のクラスターをゼロクリアする
///
/// 全スレッドの完了を待ってから戻る。
///
/// # Safety
/// `clusters` は `len` 個のクラスターに対して書き込み可能で、
/// 実行中は他のスレッドからアクセスされないこと。
pub(super) unsafe fn clear_clusters(
    clusters: NonNull<Cluster>,
    len: usize,
    threads: usize,
    binder: &dyn ThreadBinder,
) {
    let threads = threads.max(1);
    if threads == 1 {
        unsafe { std::ptr::write_bytes(clusters.as_ptr(), 0, len) };
        return;
    }

    let base = clusters.as_ptr() as usize;
    let bind = threads > BIND_THREAD_THRESHOLD;

    // スレッドを分割してゼロクリア
    std::thread::scope(|scope| {
        for idx in 0..threads {
            let range = stripe(len, threads, idx);
            scope.spawn(move || {
                // first-touch ポリシーのため書き込み前にバインドする
                if bind {
                    binder.bind_this_thread(idx);
                }
                let ptr = base as *mut Cluster;
                // SAFETY: 各スレッドの区間は互いに素で、配列内に収まる
                unsafe { std::ptr::write_bytes(ptr.add(range.start), 0, range.len()) };
            });
        }
    });
}
