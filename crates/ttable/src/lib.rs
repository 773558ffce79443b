//! 探索用の共有置換表
//!
//! 64bitの局面ハッシュから過去の探索結果を引くための固定サイズのキャッシュ。
//! 複数の探索スレッドがロックなしで同時に読み書きする前提で設計されている。
//!
//! - `tt`: 置換表本体（エントリ、クラスター、確保、並列クリア）
//! - `types`: 評価値・境界・指し手・深さ
//! - `options`: 外部から与えられる設定値
//! - `affinity`: クリア時のスレッドバインド
//! - `search_signal`: リサイズ前の探索終了待ち
//! - `prefetch`: クラスターのプリフェッチ

pub mod affinity;
pub mod options;
pub mod prefetch;
pub mod search_signal;
pub mod tt;
pub mod types;

pub use options::{OptionsError, TtOptions};
pub use tt::{ProbeResult, TTData, TranspositionTable};
pub use types::{Bound, Depth, Move, Value};
