//! TranspositionTable本体
//!
//! - Cluster: エントリのグループ
//! - TranspositionTable: テーブル本体
//! - probe/write操作

use super::alloc::{AllocKind, Allocation, large_page_privilege};
use super::clear::clear_clusters;
use super::entry::{TTData, TTEntry};
use super::{CACHE_LINE_SIZE, CLUSTER_SIZE, GENERATION_DELTA, HASHFULL_SAMPLE};
use crate::affinity::{OsThreadBinder, ThreadBinder};
use crate::options::TtOptions;
use crate::prefetch::TtPrefetch;
use crate::search_signal::{NoSearch, SearchBarrier};
use crate::types::{Bound, Depth, Move, Value};
use log::{debug, error, info};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// クラスター構造
/// 同じハッシュインデックスに対して複数のエントリを持つ
/// 10bytes × 3 + 34 = 64bytes（キャッシュライン1本）
#[repr(C, align(64))]
pub struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
    _padding: [u8; 34],
}

impl Cluster {
    /// 新しいクラスターを作成
    const fn new() -> Self {
        Self {
            entries: [TTEntry::new(); CLUSTER_SIZE],
            _padding: [0; 34],
        }
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

// クラスターは64バイトであることを保証（キャッシュラインサイズ）
const _: () = assert!(std::mem::size_of::<Cluster>() == CACHE_LINE_SIZE);
const _: () = assert!(std::mem::align_of::<Cluster>() == CACHE_LINE_SIZE);

/// 確保済みメモリ上のクラスター配列
///
/// スライスとしては公開せず、エントリへは生ポインタ経由でのみアクセスする。
struct ClusterTable {
    alloc: Option<Allocation>,
    clusters: NonNull<Cluster>,
    len: usize,
}

impl ClusterTable {
    /// len 個分のメモリを確保する（ゼロクリアは呼び出し側で行う）
    fn new(len: usize, large_pages: bool) -> Self {
        let bytes = len * std::mem::size_of::<Cluster>();
        let alloc = Allocation::allocate(bytes, large_pages);
        let clusters = alloc.table_ptr().cast::<Cluster>();
        Self {
            alloc: Some(alloc),
            clusters,
            len,
        }
    }

    /// 確保したメモリを解放する
    fn release(&mut self) {
        self.alloc = None;
        self.clusters = NonNull::dangling();
        self.len = 0;
    }

    fn uses_large_pages(&self) -> bool {
        self.alloc.as_ref().is_some_and(|a| a.kind() == AllocKind::LargePages)
    }

    #[inline]
    fn cluster_ptr(&self, index: usize) -> *mut Cluster {
        debug_assert!(index < self.len);
        // SAFETY: index < len
        unsafe { self.clusters.as_ptr().add(index) }
    }

    #[inline]
    fn entry_ptr(&self, index: usize, slot: usize) -> *mut TTEntry {
        debug_assert!(slot < CLUSTER_SIZE);
        let cluster = self.cluster_ptr(index);
        // SAFETY: cluster は有効なクラスターを指し、slot < CLUSTER_SIZE
        unsafe { (&raw mut (*cluster).entries).cast::<TTEntry>().add(slot) }
    }

    /// エントリのスナップショットを読む
    ///
    /// 他スレッドの書き込みと競合した場合はフィールドが混ざりうる。
    #[inline]
    fn read_entry(&self, index: usize, slot: usize) -> TTEntry {
        // SAFETY: entry_ptr は確保済み領域内を指す
        unsafe { self.entry_ptr(index, slot).read() }
    }
}

// SAFETY: ClusterTable はメモリを排他的に所有し、エントリの競合は探索側で許容する
unsafe impl Send for ClusterTable {}
unsafe impl Sync for ClusterTable {}

/// 置換表
///
/// 全探索スレッドで共有する。`probe` / `ProbeResult::write` は `&self` で
/// ロックなしに呼べるが、`resize` / `clear` は `&mut self` を要求し、
/// さらに `SearchBarrier` で探索の終了を待ってから実行する。
pub struct TranspositionTable {
    /// クラスターの配列
    table: ClusterTable,
    /// 世代カウンター（下位3bitは使用しない）
    generation8: AtomicU8,
    /// 最後に指定された 0 以外のサイズ（MiB）
    hash_mb: usize,
    /// クリアに使うスレッド数
    threads: usize,
    /// Large Pages を試すか（次の resize から有効）
    large_pages: bool,
    binder: Box<dyn ThreadBinder + Send>,
    barrier: Arc<dyn SearchBarrier>,
}

impl TranspositionTable {
    /// 新しい置換表を作成（サイズは `options.hash_mb` MiB）
    ///
    /// `options` は `TtOptions::validate` を通したものを渡すこと。
    /// release ビルドでは `hash_mb: 0` を 1 MiB に切り上げる。
    pub fn new(options: TtOptions) -> Self {
        debug_assert!(options.validate().is_ok(), "invalid options: {options:?}");
        let hash_mb = options.hash_mb.max(1);
        Self::build(Self::cluster_count_or_exit(hash_mb), hash_mb, options)
    }

    /// クラスター数を直接指定して作成する
    ///
    /// 小さなテーブルで置換の挙動を確かめるときに使う。
    /// MiB 指定の履歴を持たないため、この後の `resize(0)` は何もしない。
    pub fn with_cluster_count(cluster_count: usize, options: TtOptions) -> Self {
        assert!(cluster_count > 0, "cluster_count must be positive");
        Self::build(cluster_count, 0, options)
    }

    fn build(cluster_count: usize, hash_mb: usize, options: TtOptions) -> Self {
        let large_pages = options.large_pages && large_page_privilege();
        let mut tt = Self {
            table: ClusterTable::new(cluster_count, large_pages),
            generation8: AtomicU8::new(0),
            hash_mb,
            threads: options.threads.max(1),
            large_pages: options.large_pages,
            binder: Box::new(OsThreadBinder),
            barrier: Arc::new(NoSearch),
        };
        tt.clear_table();
        tt.report_size();
        tt
    }

    /// 探索終了を待つためのシグナルを設定する
    pub fn with_search_barrier(mut self, barrier: Arc<dyn SearchBarrier>) -> Self {
        self.barrier = barrier;
        self
    }

    /// クリア時のスレッドバインド方法を設定する
    pub fn set_thread_binder(&mut self, binder: Box<dyn ThreadBinder + Send>) {
        self.binder = binder;
    }

    /// クリアに使うスレッド数を設定する（次の clear / resize から有効）
    pub fn set_threads(&mut self, threads: usize) {
        debug_assert!(threads > 0);
        self.threads = threads.max(1);
    }

    /// Large Pages の使用を設定する（次の resize から有効）
    pub fn set_large_pages(&mut self, enabled: bool) {
        self.large_pages = enabled;
    }

    /// `mb_size` MiB に収まるクラスター数（バイト数が usize に収まらなければ None）
    fn cluster_count_for(mb_size: usize) -> Option<usize> {
        let bytes = mb_size.checked_mul(1024 * 1024)?;
        Some((bytes / std::mem::size_of::<Cluster>()).max(1))
    }

    fn cluster_count_or_exit(mb_size: usize) -> usize {
        match Self::cluster_count_for(mb_size) {
            Some(count) => count,
            None => {
                error!("Failed to allocate {mb_size} MiB for transposition table.");
                std::process::exit(1);
            }
        }
    }

    /// サイズを変更（MiB単位、0 は前回のサイズを再利用）
    ///
    /// クラスター数と実際に使われている確保方法が同じなら何もしない
    /// （内容も保持される）。Large Pages を要求して通常確保に落ちていた場合は
    /// 確保し直して再び Large Pages を試す。それ以外も古いメモリを解放してから
    /// 確保し直し、ゼロクリアする。
    pub fn resize(&mut self, mb_size: usize) {
        self.barrier.wait_for_search_finished();

        let mb_size = if mb_size == 0 { self.hash_mb } else { mb_size };
        if mb_size == 0 {
            return;
        }
        self.hash_mb = mb_size;

        let large_pages = self.large_pages && large_page_privilege();
        let new_count = Self::cluster_count_or_exit(mb_size);
        if new_count == self.table.len && large_pages == self.table.uses_large_pages() {
            debug!("TT resize to {mb_size} MiB skipped: same size and allocation");
            return;
        }

        // 旧メモリを解放してから確保し直す
        self.table.release();
        self.table = ClusterTable::new(new_count, large_pages);

        self.clear_table();
        self.report_size();
    }

    /// クリア
    pub fn clear(&mut self) {
        self.barrier.wait_for_search_finished();
        self.clear_table();
    }

    fn clear_table(&mut self) {
        #[cfg(feature = "diagnostics")]
        let start = std::time::Instant::now();

        // SAFETY: &mut self なので他スレッドからのアクセスはない
        unsafe {
            clear_clusters(self.table.clusters, self.table.len, self.threads, self.binder.as_ref());
        }

        #[cfg(feature = "diagnostics")]
        debug!(
            "TT cleared {} clusters with {} threads in {:?}",
            self.table.len,
            self.threads,
            start.elapsed()
        );
    }

    fn report_size(&self) {
        let bytes = self.table.len * std::mem::size_of::<Cluster>();
        info!(
            "Hash {} MiB ({} clusters, {})",
            bytes >> 20,
            self.table.len,
            if self.uses_large_pages() {
                "large pages"
            } else {
                "regular pages"
            }
        );
    }

    /// 新しい探索を開始（世代を進める）
    pub fn new_search(&self) {
        self.generation8.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    /// 現在の世代を取得
    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    /// 置換表を検索
    ///
    /// 同じ key16 か空きのエントリがあればその世代を更新して返す。
    /// 見つからなければ置換価値が最小のエントリを書き込み先として返す。
    pub fn probe(&self, key: u64) -> ProbeResult<'_> {
        let index = self.cluster_index(key);
        // クラスター内のマッチングにはキーの上位16bitを使う
        let key16 = (key >> 48) as u16;
        let gen8 = self.generation();

        for slot in 0..CLUSTER_SIZE {
            let entry = self.table.read_entry(index, slot);
            if entry.key16() == 0 || entry.key16() == key16 {
                let ptr = self.table.entry_ptr(index, slot);
                // SAFETY: 確保済み領域内のエントリ。競合する書き込みは許容する
                unsafe { (*ptr).refresh(gen8) };

                let found = entry.is_occupied();
                return ProbeResult {
                    found,
                    data: if found { entry.read() } else { TTData::EMPTY },
                    writer: ptr,
                    generation8: gen8,
                    _table: PhantomData,
                };
            }
        }

        // 置換するエントリを選択（価値が最小のもの、同値なら先頭側）
        let mut replace = self.table.entry_ptr(index, 0);
        let mut min_value = i32::MAX;

        for slot in 0..CLUSTER_SIZE {
            // 置換価値 = depth8 - relative_age
            let value = self.table.read_entry(index, slot).replace_value(gen8);
            if value < min_value {
                min_value = value;
                replace = self.table.entry_ptr(index, slot);
            }
        }

        ProbeResult {
            found: false,
            data: TTData::EMPTY,
            writer: replace,
            generation8: gen8,
            _table: PhantomData,
        }
    }

    /// 置換表の使用率を1000分率で返す
    ///
    /// 先頭の最大1000クラスターを調べ、現在の世代で書かれたエントリを数える。
    pub fn hashfull(&self) -> i32 {
        let gen8 = self.generation();
        let sample_count = HASHFULL_SAMPLE.min(self.table.len);
        if sample_count == 0 {
            return 0;
        }

        let mut count = 0;
        for index in 0..sample_count {
            for slot in 0..CLUSTER_SIZE {
                let entry = self.table.read_entry(index, slot);
                if entry.is_occupied() && entry.generation8() == gen8 {
                    count += 1;
                }
            }
        }

        (count * HASHFULL_SAMPLE / (sample_count * CLUSTER_SIZE)) as i32
    }

    /// Large Pagesを使って確保されたかを返す
    pub fn uses_large_pages(&self) -> bool {
        self.table.uses_large_pages()
    }

    /// クラスター数
    pub fn cluster_count(&self) -> usize {
        self.table.len
    }

    /// 最後に指定された 0 以外のサイズ（MiB）。`with_cluster_count` のみなら 0
    pub fn hash_mb(&self) -> usize {
        self.hash_mb
    }

    /// クリアに使うスレッド数
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// クラスターインデックスを計算
    #[inline]
    fn cluster_index(&self, key: u64) -> usize {
        // key * cluster_count / 2^64 でインデックスを計算
        ((key as u128 * self.table.len as u128) >> 64) as usize
    }

    /// 指定キーのクラスターをプリフェッチ
    #[inline]
    pub fn prefetch(&self, key: u64) {
        let cluster = self.table.cluster_ptr(self.cluster_index(key));

        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_MM_HINT_T0, _mm_prefetch};
            _mm_prefetch::<_MM_HINT_T0>(cluster as *const i8);
        }

        #[cfg(target_arch = "aarch64")]
        unsafe {
            std::arch::asm!("prfm pldl1keep, [{0}]", in(reg) cluster, options(nostack, readonly));
        }

        #[cfg(all(not(target_arch = "x86_64"), not(target_arch = "aarch64")))]
        let _ = cluster; // 何もしない
    }
}

/// probe結果
///
/// 置換表を借用しているため、resize / clear とは同時に存在できない。
pub struct ProbeResult<'a> {
    /// ヒットしたか
    pub found: bool,
    /// 読み取ったデータ（ヒットしなかった場合は `TTData::EMPTY`）
    pub data: TTData,
    /// 書き込み用エントリ
    writer: *mut TTEntry,
    /// probe時の世代
    generation8: u8,
    _table: PhantomData<&'a TranspositionTable>,
}

impl ProbeResult<'_> {
    /// エントリに書き込む
    ///
    /// 同じ key で probe した結果に対して呼ぶこと。
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        key: u64,
        value: Value,
        is_pv: bool,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Value,
    ) {
        // SAFETY: writerはprobe()で取得した有効なポインタで、
        // ライフタイムにより置換表のメモリより長生きしない
        unsafe {
            (*self.writer).save(
                (key >> 48) as u16,
                value,
                is_pv,
                bound,
                depth,
                mv,
                eval,
                self.generation8,
            );
        }
    }

    /// 書き込み先エントリの現在の内容
    pub fn entry(&self) -> TTEntry {
        // SAFETY: write と同じ
        unsafe { self.writer.read() }
    }
}

impl TtPrefetch for TranspositionTable {
    #[inline]
    fn prefetch(&self, key: u64) {
        TranspositionTable::prefetch(self, key);
    }
}
