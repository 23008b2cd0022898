use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{DpbError, DpbResult};
use crate::picture::FrameAllocator;

use super::Dpb;
use super::rps::{RefPicSetCategories, RpsCategory};

// ============================================================
// 参考列表类型
// ============================================================

/// slice 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SliceType {
    /// 双向预测
    B,
    /// 单向预测
    P,
    /// 帧内
    #[default]
    I,
}

impl SliceType {
    /// 需要构建的参考列表数量
    pub fn num_lists(&self) -> usize {
        match self {
            Self::B => 2,
            Self::P => 1,
            Self::I => 0,
        }
    }
}

/// 参考列表条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefListEntry {
    /// DPB 槽位索引
    pub slot: usize,
    /// 参考图像 POC
    pub poc: i32,
    /// 是否来自 CurrLong
    pub is_long_term: bool,
}

/// 单方向参考列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefPicList {
    /// 按 ref_idx 排列的条目
    pub entries: Vec<RefListEntry>,
}

impl RefPicList {
    /// 条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按 ref_idx 取条目
    pub fn get(&self, ref_idx: usize) -> Option<&RefListEntry> {
        self.entries.get(ref_idx)
    }

    /// 全部 POC, 按 ref_idx 顺序
    pub fn pocs(&self) -> Vec<i32> {
        self.entries.iter().map(|entry| entry.poc).collect()
    }
}

/// list0/list1 参考列表对, 构建后不可变, 由 CTB 参考表共享
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefPicListPair {
    /// [list0, list1]
    pub lists: [RefPicList; 2],
}

impl RefPicListPair {
    /// 取指定方向的列表
    pub fn list(&self, direction: usize) -> &RefPicList {
        &self.lists[direction]
    }
}

/// slice header 中的参考列表参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SliceRefParams {
    /// slice 类型
    pub slice_type: SliceType,
    /// slice_segment_address (光栅扫描 CTB 地址)
    #[serde(default)]
    pub address: usize,
    /// num_ref_idx_l0/l1_active
    #[serde(default)]
    pub num_ref_idx_active: [u32; 2],
    /// list_entry_l0/l1, 仅当 ref_pic_list_modification_flag_lx 为真时存在
    #[serde(default)]
    pub list_entry: [Option<Vec<u32>>; 2],
}

// ============================================================
// 参考列表构建
// ============================================================

/// 按 RPS 分类结果构建 slice 的参考列表对
///
/// list0 顺序为 CurrBefore, CurrAfter, CurrLong; list1 交换前两类.
/// 即使激活数小于候选总数也先拼接全部候选, 重排命令可能引用截断位置之后的条目.
pub fn build_ref_lists(
    categories: &RefPicSetCategories,
    params: &SliceRefParams,
) -> DpbResult<RefPicListPair> {
    let mut pair = RefPicListPair::default();
    let total = categories.count_current_total();

    for direction in 0..params.slice_type.num_lists() {
        let (first, second) = if direction == 0 {
            (RpsCategory::CurrBefore, RpsCategory::CurrAfter)
        } else {
            (RpsCategory::CurrAfter, RpsCategory::CurrBefore)
        };

        let mut candidates = Vec::with_capacity(total);
        for (category, is_long_term) in [
            (first, false),
            (second, false),
            (RpsCategory::CurrLong, true),
        ] {
            for entry in categories.get(category) {
                let slot = entry
                    .slot
                    .ok_or(DpbError::ReferenceNotFound { poc: entry.poc })?;
                candidates.push(RefListEntry {
                    slot,
                    poc: entry.poc,
                    is_long_term,
                });
            }
        }

        let active = total.min(params.num_ref_idx_active[direction] as usize);
        let entries = match &params.list_entry[direction] {
            Some(list_entry) => {
                if list_entry.len() < active {
                    return Err(DpbError::MalformedReorder {
                        list: direction,
                        index: list_entry.len(),
                        limit: active,
                    });
                }
                list_entry[..active]
                    .iter()
                    .map(|&idx| {
                        candidates
                            .get(idx as usize)
                            .copied()
                            .ok_or(DpbError::MalformedReorder {
                                list: direction,
                                index: idx as usize,
                                limit: candidates.len(),
                            })
                    })
                    .collect::<DpbResult<Vec<_>>>()?
            }
            None => candidates[..active].to_vec(),
        };
        pair.lists[direction] = RefPicList { entries };
    }
    Ok(pair)
}

impl<A: FrameAllocator> Dpb<A> {
    /// 将参考列表对绑定到槽位 CTB 参考表的 [address, ctb_count) 区间
    ///
    /// 只替换句柄, 不修改之前共享的列表.
    pub(crate) fn install_ref_lists(
        &mut self,
        slot_idx: usize,
        address: usize,
        pair: RefPicListPair,
    ) -> DpbResult<()> {
        let ctb_count = self.layout.ctb_count();
        if address >= ctb_count {
            return Err(DpbError::InvalidArgument(format!(
                "slice 地址 {} 超出 CTB 总数 {}",
                address, ctb_count
            )));
        }
        let slot = &mut self.slots[slot_idx];
        if slot.is_free() || slot.ref_table.len() != ctb_count {
            return Err(DpbError::Internal(format!(
                "槽位 {} 的参考表未初始化",
                slot_idx
            )));
        }
        trace!(
            "HEVC DPB: 安装参考列表, slot={}, address={}, l0={:?}, l1={:?}",
            slot_idx,
            address,
            pair.lists[0].pocs(),
            pair.lists[1].pocs()
        );
        let handle = Arc::new(pair);
        for entry in &mut slot.ref_table[address..] {
            *entry = Arc::clone(&handle);
        }
        self.ctx.current_address = address;
        Ok(())
    }

    /// 当前图像正在填充的参考列表对
    pub fn current_ref_lists(&self) -> DpbResult<Arc<RefPicListPair>> {
        let idx = self.ctx.current_slot.ok_or(DpbError::NoCurrentPicture)?;
        self.slots[idx]
            .ref_table
            .get(self.ctx.current_address)
            .cloned()
            .ok_or(DpbError::NoCurrentPicture)
    }

    /// 按亮度坐标查询槽位中覆盖该位置的参考列表对 (运动补偿/时域 MV 预测使用)
    pub fn ref_lists_at(&self, slot_idx: usize, x: u32, y: u32) -> DpbResult<Arc<RefPicListPair>> {
        let slot = self.slots.get(slot_idx).ok_or_else(|| {
            DpbError::InvalidArgument(format!("槽位索引 {} 越界", slot_idx))
        })?;
        if slot.is_free() {
            return Err(DpbError::InvalidArgument(format!(
                "槽位 {} 为空",
                slot_idx
            )));
        }
        let addr = self.layout.ctb_addr(x, y).ok_or_else(|| {
            DpbError::InvalidArgument(format!("坐标 ({}, {}) 超出图像范围", x, y))
        })?;
        slot.ref_table.get(addr).cloned().ok_or_else(|| {
            DpbError::Internal(format!("槽位 {} 的参考表缺少 CTB {}", slot_idx, addr))
        })
    }
}
