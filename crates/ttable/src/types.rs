//! 置換表が扱う基本型
//!
//! 評価値・境界・指し手はいずれも探索側で生成され、置換表には
//! 16bit 以下に詰めて保存される。

/// 探索深さ
pub type Depth = i32;

/// 深さ未設定
pub const DEPTH_NONE: Depth = -6;

/// TT格納用オフセット（表現可能な最小の深さが depth8 = 0 に対応する）
pub const DEPTH_ENTRY_OFFSET: Depth = -7;

/// depth8 に格納できる最大の深さ
pub const DEPTH_MAX_STORABLE: Depth = DEPTH_ENTRY_OFFSET + u8::MAX as Depth;

// 定数間の関係をコンパイル時に検証する
const _: () = {
    assert!(DEPTH_NONE > DEPTH_ENTRY_OFFSET);
    assert!(DEPTH_MAX_STORABLE == 248);
};

/// 評価値
///
/// 置換表内では `i16` に切り詰めて保存するため、探索側は
/// `[Value::MIN_STORABLE, Value::MAX_STORABLE]` の範囲で扱うこと。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Value(i32);

impl Value {
    /// ゼロ
    pub const ZERO: Value = Value(0);
    /// 無効値
    pub const NONE: Value = Value(32002);
    /// 格納可能な最大値
    pub const MAX_STORABLE: Value = Value(i16::MAX as i32);
    /// 格納可能な最小値
    pub const MIN_STORABLE: Value = Value(i16::MIN as i32);

    /// 値から生成
    #[inline]
    pub const fn new(v: i32) -> Value {
        Value(v)
    }

    /// 生の値を取得
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// 境界タイプ
///
/// 下位2bitで表現し、`Upper | Lower == Exact` になるよう割り当てている。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Bound {
    None = 0,
    Upper = 1,
    Lower = 2,
    Exact = 3,
}

impl Bound {
    /// 2bit値から変換
    #[inline]
    pub const fn from_u8(v: u8) -> Option<Bound> {
        match v {
            0 => Some(Bound::None),
            1 => Some(Bound::Upper),
            2 => Some(Bound::Lower),
            3 => Some(Bound::Exact),
            _ => None,
        }
    }

    /// 値が下界として使えるか
    #[inline]
    pub const fn is_lower_or_exact(self) -> bool {
        (self as u8 & Bound::Lower as u8) != 0
    }

    /// 値が上界として使えるか
    #[inline]
    pub const fn is_upper_or_exact(self) -> bool {
        (self as u8 & Bound::Upper as u8) != 0
    }
}

/// 16bitに符号化された指し手
///
/// 置換表は中身を解釈しない。0 は「指し手なし」として予約されている。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    /// 指し手なし
    pub const NONE: Move = Move(0);

    /// 16bit形式から生成
    #[inline]
    pub const fn from_u16(v: u16) -> Move {
        Move(v)
    }

    /// 16bit形式に変換
    #[inline]
    pub const fn to_u16(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}
