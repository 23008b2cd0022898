//! 槽位回收.
//!
//! 槽位在 "仍被参考" 与 "等待输出" 均为假时释放. 释放只丢弃 DPB 持有的引用,
//! 调用方持有的输出别名不受影响.

use log::trace;

use crate::picture::FrameAllocator;

use super::rps::RefPicSetCategories;
use super::{Dpb, SlotFlags};

impl<A: FrameAllocator> Dpb<A> {
    /// 按当前图像的 RPS 分类结果降级并回收槽位, 返回释放数量
    pub fn mark_unused_and_reclaim(&mut self, categories: &RefPicSetCategories) -> usize {
        let used = categories.used_slots(self.slots.len());
        self.reclaim_unused(&used)
    }

    pub(crate) fn reclaim_unused(&mut self, used: &[bool]) -> usize {
        let mut released = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_free() {
                continue;
            }
            if !used.get(idx).copied().unwrap_or(false) {
                slot.flags.remove(SlotFlags::SHORT_TERM_REF);
            }
            if slot.flags.is_empty() {
                trace!("HEVC DPB: 回收槽位 {}, poc={}", idx, slot.poc);
                slot.release();
                released += 1;
            }
        }
        self.debug_check_slots();
        released
    }

    /// 序列边界: 释放所有不再等待输出的槽位
    pub fn clear_all_unneeded(&mut self) -> usize {
        let mut released = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.flags.contains(SlotFlags::NEEDED_FOR_OUTPUT) {
                continue;
            }
            if !slot.is_free() {
                trace!("HEVC DPB: 序列边界回收槽位 {}, poc={}", idx, slot.poc);
                released += 1;
            }
            slot.release();
        }
        self.debug_check_slots();
        released
    }

    /// 硬复位: 无论输出状态释放全部槽位
    pub fn clear_all(&mut self) -> usize {
        let released = self.slots.iter().filter(|slot| !slot.is_free()).count();
        for slot in &mut self.slots {
            slot.release();
        }
        self.ctx.current_slot = None;
        self.ctx.current_poc = None;
        trace!("HEVC DPB: 硬复位, 释放 {} 个槽位", released);
        released
    }

    fn debug_check_slots(&self) {
        for (idx, slot) in self.slots.iter().enumerate() {
            debug_assert!(
                !slot.is_free() || (slot.flags.is_empty() && slot.ref_table.is_empty()),
                "空槽位 {} 仍有状态位或参考表",
                idx
            );
            debug_assert!(
                slot.is_free() || !slot.flags.is_empty(),
                "槽位 {} 状态位已清空但缓冲未释放",
                idx
            );
        }
    }
}
