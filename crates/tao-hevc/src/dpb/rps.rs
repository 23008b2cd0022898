//! 参考图像集 (RPS) 分类.
//!
//! 将已解析的短期/长期 RPS 按当前 POC 拆分为五类, 每个条目立即解析为槽位索引:
//! - 负 delta 且 used: CurrBefore
//! - 正 delta 且 used: CurrAfter
//! - 短期 unused: FollShort (先负后正)
//! - 长期 used: CurrLong
//! - 长期 unused: FollLong
//!
//! 此顺序决定参考列表的构建顺序, 必须严格保持.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{DpbError, DpbResult};
use crate::picture::FrameAllocator;

use super::Dpb;

/// 短期 RPS: 负 delta 前缀 + 正 delta 后缀
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShortTermRps {
    /// DeltaPocS0 (负值) 后接 DeltaPocS1 (正值)
    pub delta_poc: Vec<i32>,
    /// 每个条目的 used_by_curr_pic 标志
    pub used: Vec<bool>,
    /// 负 delta 条目数 (NumNegativePics)
    pub num_negative: usize,
}

impl ShortTermRps {
    /// 由 (delta, used) 对构建
    pub fn new(negative: &[(i32, bool)], positive: &[(i32, bool)]) -> Self {
        let entries = negative.iter().chain(positive.iter());
        Self {
            delta_poc: entries.clone().map(|&(delta, _)| delta).collect(),
            used: entries.map(|&(_, used)| used).collect(),
            num_negative: negative.len(),
        }
    }

    fn validate(&self) -> DpbResult<()> {
        if self.used.len() != self.delta_poc.len() {
            return Err(DpbError::InvalidArgument(format!(
                "短期 RPS used 数量 {} 与 delta 数量 {} 不一致",
                self.used.len(),
                self.delta_poc.len()
            )));
        }
        if self.num_negative > self.delta_poc.len() {
            return Err(DpbError::InvalidArgument(format!(
                "短期 RPS num_negative={} 超过条目数 {}",
                self.num_negative,
                self.delta_poc.len()
            )));
        }
        Ok(())
    }

    fn num_used(&self) -> usize {
        self.used.iter().filter(|&&used| used).count()
    }
}

/// 长期 RPS 条目
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LongTermEntry {
    /// PocLsbLt
    pub poc_lsb: i32,
    /// DeltaPocMsbCycleLt, 存在时条目携带完整 POC
    #[serde(default)]
    pub delta_poc_msb_cycle: Option<u32>,
    /// used_by_curr_pic_lt_flag
    pub used_by_curr: bool,
}

/// 长期 RPS (来自 SPS 候选与 slice header 的合并结果)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LongTermRps {
    /// 长期条目
    #[serde(default)]
    pub entries: Vec<LongTermEntry>,
}

/// RPS 分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpsCategory {
    /// StCurrBefore
    CurrBefore = 0,
    /// StCurrAfter
    CurrAfter = 1,
    /// StFoll
    FollShort = 2,
    /// LtCurr
    CurrLong = 3,
    /// LtFoll
    FollLong = 4,
}

impl RpsCategory {
    /// 全部分类, 按存储顺序
    pub const ALL: [RpsCategory; 5] = [
        Self::CurrBefore,
        Self::CurrAfter,
        Self::FollShort,
        Self::CurrLong,
        Self::FollLong,
    ];

    /// 是否被当前图像使用
    pub fn is_current(&self) -> bool {
        matches!(self, Self::CurrBefore | Self::CurrAfter | Self::CurrLong)
    }
}

/// 分类条目: POC 与解析到的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefPocEntry {
    /// 参考图像 POC
    pub poc: i32,
    /// 槽位索引, Foll 类条目允许缺失
    pub slot: Option<usize>,
}

/// 五类 RPS 分类结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefPicSetCategories {
    lists: [Vec<RefPocEntry>; 5],
}

impl RefPicSetCategories {
    /// 取某一类的条目
    pub fn get(&self, category: RpsCategory) -> &[RefPocEntry] {
        &self.lists[category as usize]
    }

    fn push(&mut self, category: RpsCategory, entry: RefPocEntry) {
        self.lists[category as usize].push(entry);
    }

    /// NumPicTotalCurr: CurrBefore + CurrAfter + CurrLong
    pub fn count_current_total(&self) -> usize {
        self.get(RpsCategory::CurrBefore).len()
            + self.get(RpsCategory::CurrAfter).len()
            + self.get(RpsCategory::CurrLong).len()
    }

    /// 所有分类引用到的槽位并集, 按槽位索引标记
    pub fn used_slots(&self, slot_count: usize) -> Vec<bool> {
        let mut used = vec![false; slot_count];
        for entry in self.lists.iter().flatten() {
            if let Some(idx) = entry.slot.filter(|&idx| idx < slot_count) {
                used[idx] = true;
            }
        }
        used
    }

    /// 第一个未解析到槽位的 Curr 类条目
    pub fn first_missing_current(&self) -> Option<i32> {
        RpsCategory::ALL
            .iter()
            .filter(|cat| cat.is_current())
            .flat_map(|&cat| self.get(cat))
            .find(|entry| entry.slot.is_none())
            .map(|entry| entry.poc)
    }
}

/// 不做槽位解析, 直接由 RPS 统计 NumPicTotalCurr (解析重排命令前使用)
pub fn num_poc_total_curr(short_term: Option<&ShortTermRps>, long_term: &LongTermRps) -> usize {
    let short = short_term.map(ShortTermRps::num_used).unwrap_or(0);
    let long = long_term
        .entries
        .iter()
        .filter(|entry| entry.used_by_curr)
        .count();
    short + long
}

/// 携带 DeltaPocMsbCycleLt 的长期条目的完整 POC:
/// `poc_lsb + poc - cycle * MaxPicOrderCntLsb - slice_poc_lsb`
fn long_term_full_poc(
    poc_lsb: i32,
    cycle: u32,
    poc: i32,
    current_poc_lsb: i32,
    max_lsb: i32,
) -> DpbResult<i32> {
    i32::try_from(cycle)
        .ok()
        .and_then(|cycle| cycle.checked_mul(max_lsb))
        .and_then(|msb| {
            poc_lsb
                .checked_add(poc)?
                .checked_sub(msb)?
                .checked_sub(current_poc_lsb)
        })
        .ok_or_else(|| {
            DpbError::InvalidArgument(format!(
                "长期 RPS 条目 poc_lsb={}, delta_poc_msb_cycle={} 使 POC 溢出",
                poc_lsb, cycle
            ))
        })
}

impl<A: FrameAllocator> Dpb<A> {
    /// 对当前图像的 RPS 分类, 结果保存在解码上下文中
    ///
    /// Curr 类条目缺失时返回 `ReferenceNotFound`, 已解析的部分结果仍保存在上下文中;
    /// Foll 类缺失只记录日志. 条目 POC 计算溢出时返回 `InvalidArgument`, 上下文不变.
    pub fn classify_rps(
        &mut self,
        short_term: &ShortTermRps,
        long_term: &LongTermRps,
    ) -> DpbResult<&RefPicSetCategories> {
        let poc = self.ctx.current_poc.ok_or(DpbError::NoCurrentPicture)?;
        short_term.validate()?;

        let mut categories = RefPicSetCategories::default();
        for (i, (&delta, &used)) in short_term
            .delta_poc
            .iter()
            .zip(short_term.used.iter())
            .enumerate()
        {
            let ref_poc = poc.checked_add(delta).ok_or_else(|| {
                DpbError::InvalidArgument(format!("短期 RPS delta={} 使 POC {} 溢出", delta, poc))
            })?;
            let category = match (i < short_term.num_negative, used) {
                (true, true) => RpsCategory::CurrBefore,
                (false, true) => RpsCategory::CurrAfter,
                (_, false) => RpsCategory::FollShort,
            };
            let slot = self.find_by_poc(ref_poc, false).ok();
            categories.push(category, RefPocEntry { poc: ref_poc, slot });
        }

        let max_lsb = self.config.max_poc_lsb();
        for entry in &long_term.entries {
            let (lookup_poc, lsb_only) = match entry.delta_poc_msb_cycle {
                Some(cycle) => {
                    let full_poc = long_term_full_poc(
                        entry.poc_lsb,
                        cycle,
                        poc,
                        self.ctx.current_poc_lsb,
                        max_lsb,
                    )?;
                    (full_poc, false)
                }
                None => (entry.poc_lsb, true),
            };
            let slot = self.find_by_poc(lookup_poc, lsb_only).ok();
            let ref_poc = slot.map(|idx| self.slots[idx].poc).unwrap_or(lookup_poc);
            let category = if entry.used_by_curr {
                RpsCategory::CurrLong
            } else {
                RpsCategory::FollLong
            };
            categories.push(category, RefPocEntry { poc: ref_poc, slot });
        }

        for category in [RpsCategory::FollShort, RpsCategory::FollLong] {
            for entry in categories.get(category).iter().filter(|e| e.slot.is_none()) {
                debug!(
                    "HEVC DPB: Foll 参考帧缺失, poc={}, category={:?}",
                    entry.poc, category
                );
            }
        }

        let missing = categories.first_missing_current();
        self.ctx.categories = categories;
        if let Some(missing_poc) = missing {
            return Err(DpbError::ReferenceNotFound { poc: missing_poc });
        }
        Ok(&self.ctx.categories)
    }
}
