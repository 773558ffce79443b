//! 置換表の設定値
//!
//! USI の `USI_Hash` / `Threads` / `LargePages` に相当する値を外部から受け取る。

use serde::Deserialize;
use thiserror::Error;

/// 置換表サイズの上限（MiB）
pub const MAX_HASH_MB: usize = 1 << 25;

/// 置換表サイズの既定値（MiB）
pub const DEFAULT_HASH_MB: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("hash size must be at least 1 MiB")]
    ZeroHash,
    #[error("hash size {0} MiB exceeds the maximum of {MAX_HASH_MB} MiB")]
    HashTooLarge(usize),
    #[error("thread count must be at least 1")]
    ZeroThreads,
}

/// 置換表の設定
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TtOptions {
    /// 置換表サイズ（MiB）
    pub hash_mb: usize,
    /// クリアに使うスレッド数
    pub threads: usize,
    /// Large Pages を試すか
    pub large_pages: bool,
}

impl Default for TtOptions {
    fn default() -> Self {
        Self {
            hash_mb: DEFAULT_HASH_MB,
            threads: 1,
            large_pages: false,
        }
    }
}

impl TtOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.hash_mb == 0 {
            return Err(OptionsError::ZeroHash);
        }
        if self.hash_mb > MAX_HASH_MB {
            return Err(OptionsError::HashTooLarge(self.hash_mb));
        }
        if self.threads == 0 {
            return Err(OptionsError::ZeroThreads);
        }
        Ok(())
    }
}
