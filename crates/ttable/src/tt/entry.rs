//! 置換表エントリー
//!
//! TTEntry: 10バイトのコンパクトなエントリ構造
//! TTData: 読み取り用のデータ構造

use super::{DEPTH_REPLACE_MARGIN, GENERATION_CYCLE, GENERATION_MASK};
use crate::types::{Bound, DEPTH_ENTRY_OFFSET, Depth, Move, Value};

/// gen_bound8 のうち pv/bound が使う下位3bit
const PV_BOUND_MASK: u8 = 0x7;
const PV_BIT: u8 = 0x4;
const BOUND_MASK: u8 = 0x3;

/// 置換表エントリー
///
/// バイナリレイアウト（リトルエンディアン、計10バイト）:
///
/// | offset | 型  | 内容                                   |
/// |--------|-----|----------------------------------------|
/// | 0      | u16 | key16: キーの上位16bit（0 = 空き）     |
/// | 2      | u8  | depth8: 深さ - DEPTH_ENTRY_OFFSET       |
/// | 3      | u8  | generation(5bit) \| pv(1bit) \| bound(2bit) |
/// | 4      | u16 | move16: 最善手                          |
/// | 6      | i16 | value16: 探索値                         |
/// | 8      | i16 | eval16: 静的評価値                      |
///
/// フィールドはまとめて書き込まれるがアトミックではない。
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct TTEntry {
    key16: u16,
    depth8: u8,
    gen_bound8: u8,
    move16: u16,
    value16: i16,
    eval16: i16,
}

// エントリサイズが10バイトであることを保証
const _: () = assert!(std::mem::size_of::<TTEntry>() == 10);

impl TTEntry {
    /// 新しい空のエントリを作成
    #[inline]
    pub const fn new() -> Self {
        Self {
            key16: 0,
            depth8: 0,
            gen_bound8: 0,
            move16: 0,
            value16: 0,
            eval16: 0,
        }
    }

    /// エントリが使用されているか（key16 == 0 は空きとみなす）
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.key16 != 0
    }

    #[inline]
    pub fn key16(&self) -> u16 {
        self.key16
    }

    /// 保存されている生のdepth8を取得
    #[inline]
    pub fn depth8(&self) -> u8 {
        self.depth8
    }

    /// 深さを取得（DEPTH_ENTRY_OFFSETを加算）
    #[inline]
    pub fn depth(&self) -> Depth {
        self.depth8 as Depth + DEPTH_ENTRY_OFFSET
    }

    #[inline]
    pub fn gen_bound8(&self) -> u8 {
        self.gen_bound8
    }

    /// 世代部分（上位5bit）
    #[inline]
    pub fn generation8(&self) -> u8 {
        self.gen_bound8 & GENERATION_MASK as u8
    }

    #[inline]
    pub fn bound(&self) -> Bound {
        Bound::from_u8(self.gen_bound8 & BOUND_MASK).unwrap_or(Bound::None)
    }

    #[inline]
    pub fn is_pv(&self) -> bool {
        (self.gen_bound8 & PV_BIT) != 0
    }

    /// エントリを読み取る
    pub fn read(&self) -> TTData {
        TTData {
            mv: Move::from_u16(self.move16),
            value: Value::new(self.value16 as i32),
            eval: Value::new(self.eval16 as i32),
            depth: self.depth(),
            bound: self.bound(),
            is_pv: self.is_pv(),
        }
    }

    /// 世代だけを現在の世代に更新する（pv/boundは保持）
    #[inline]
    pub fn refresh(&mut self, generation8: u8) {
        self.gen_bound8 = generation8 | (self.gen_bound8 & PV_BOUND_MASK);
    }

    /// エントリに保存
    ///
    /// 手は新しい手があるかキーが変わったときだけ書き換える。
    /// 残りのフィールドはキーが変わった、十分に深い、EXACT のいずれかで書き換える。
    #[allow(clippy::too_many_arguments)]
    pub fn save(
        &mut self,
        key16: u16,
        value: Value,
        is_pv: bool,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Value,
        generation8: u8,
    ) {
        debug_assert!(
            depth >= DEPTH_ENTRY_OFFSET,
            "depth {depth} is below DEPTH_ENTRY_OFFSET"
        );

        // 判定は書き込み前の状態で行う
        let stored_key = self.key16;
        let stored_depth8 = self.depth8 as i32;

        // 新しい手がない場合は古い手を保持
        if mv != Move::NONE || key16 != stored_key {
            self.move16 = mv.to_u16();
        }

        // 上書き条件：
        // - 異なるキー（空きを含む）
        // - 十分に深い探索
        // - BOUND_EXACT（確定値）
        let d8 = depth - DEPTH_ENTRY_OFFSET;
        if key16 != stored_key || d8 > stored_depth8 + DEPTH_REPLACE_MARGIN || bound == Bound::Exact
        {
            debug_assert!((0..256).contains(&d8));

            self.key16 = key16;
            self.value16 = value.raw() as i16;
            self.eval16 = eval.raw() as i16;
            self.gen_bound8 = generation8 | ((is_pv as u8) << 2) | bound as u8;
            self.depth8 = d8 as u8;
        }
    }

    /// 相対的な世代（0 = 最新、8刻み）
    ///
    /// generation8 が u8 で一周しても正しく経過世代数を求めるため、
    /// 256 + 7 を足してから下位3bitを落とす。
    #[inline]
    pub fn relative_age(&self, generation8: u8) -> u8 {
        let age = GENERATION_CYCLE
            .wrapping_add(generation8 as u16)
            .wrapping_sub(self.gen_bound8 as u16);
        (age & GENERATION_MASK) as u8
    }

    /// 置換価値 = depth8 - relative_age（小さいほど追い出されやすい）
    #[inline]
    pub fn replace_value(&self, generation8: u8) -> i32 {
        self.depth8 as i32 - self.relative_age(generation8) as i32
    }
}

/// 置換表から読み取ったデータ
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TTData {
    /// 最善手
    pub mv: Move,
    /// 探索値
    pub value: Value,
    /// 評価値
    pub eval: Value,
    /// 探索深さ
    pub depth: Depth,
    /// 境界タイプ
    pub bound: Bound,
    /// PVノードかどうか
    pub is_pv: bool,
}

impl TTData {
    /// 空のデータ
    pub const EMPTY: Self = Self {
        mv: Move::NONE,
        value: Value::NONE,
        eval: Value::NONE,
        depth: DEPTH_ENTRY_OFFSET,
        bound: Bound::None,
        is_pv: false,
    };
}

impl Default for TTData {
    fn default() -> Self {
        Self::EMPTY
    }
}
