//! 置換表プリフェッチのトレイト定義
//!
//! 探索中に次の局面の置換表クラスターを事前にキャッシュに読み込むことで、
//! メモリアクセスのレイテンシを隠蔽します。

/// 置換表のプリフェッチを行うトレイト
///
/// 指し手を進めた直後に次の局面のキーでプリフェッチしておくと、
/// 実際の probe 時にはキャッシュにヒットしやすくなります。
pub trait TtPrefetch {
    /// 指定されたキーに対応する置換表クラスターをプリフェッチする
    fn prefetch(&self, key: u64);
}

/// プリフェッチを行わないダミー実装
///
/// 探索以外の用途（局面生成、テストなど）で使用します。
pub struct NoPrefetch;

impl TtPrefetch for NoPrefetch {
    #[inline]
    fn prefetch(&self, _key: u64) {}
}
