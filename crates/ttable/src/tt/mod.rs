//! 置換表モジュール
//!
//! 探索結果をキャッシュする置換表（Transposition Table）。
//!
//! - `TTEntry`: エントリ（10バイト、16bitキー）
//! - `Cluster`: エントリのグループ（64バイト = 1キャッシュライン）
//! - `TranspositionTable`: テーブル本体
//! - 世代管理
//! - Large Pages 確保と並列クリア
//!
//! クラスターインデックスは64bitキーとクラスター数の積の上位64bitで決定し、
//! クラスター内マッチングにはキーの上位16bitを使用する。
//! 10バイトエントリ × 3 + 34パディング = 64バイト/クラスター。
//!
//! # 並行アクセス
//!
//! エントリの読み書きにはロックもアトミック命令も使わない。複数スレッドが
//! 同じクラスターへ同時に書き込むと、フィールド単位で新旧が混ざったエントリが
//! 観測されうる。全フィールドが固定幅で自己完結しているため、混ざっても
//! 範囲外アクセスにはならず、探索側は値の誤りとして許容する。

mod alloc;
mod clear;
mod entry;
mod table;

pub use entry::{TTData, TTEntry};
pub use table::{Cluster, ProbeResult, TranspositionTable};

/// クラスターサイズ（エントリ数）
pub const CLUSTER_SIZE: usize = 3;

/// キャッシュラインサイズ（バイト）
pub const CACHE_LINE_SIZE: usize = 64;

/// Generation関連の定数
///
/// gen_bound8 の下位3bitは pv/bound に使うため、世代は8刻みで進む。
pub const GENERATION_BITS: u32 = 3;
pub const GENERATION_DELTA: u8 = 1 << GENERATION_BITS; // 8
/// 256（u8の周期）+ 7（下位3bitの影響を打ち消す）
pub const GENERATION_CYCLE: u16 = 255 + GENERATION_DELTA as u16;
pub const GENERATION_MASK: u16 = 0xF8; // (0xFF << GENERATION_BITS) as u8

/// 同一局面の上書きに必要な深さの差（depth8単位）
pub const DEPTH_REPLACE_MARGIN: i32 = 4;

/// hashfull で調べるクラスター数の上限
pub const HASHFULL_SAMPLE: usize = 1000;

/// この数を超えるスレッドでクリアするときだけスレッドをバインドする
pub const BIND_THREAD_THRESHOLD: usize = 8;
