use log::{debug, trace};

use crate::picture::FrameAllocator;

use super::{Dpb, SlotFlags};

// ============================================================
// 输出调度
// ============================================================

/// 可显示图像
#[derive(Debug, Clone)]
pub struct OutputPicture<H> {
    /// 帧缓冲别名, 不受槽位后续回收影响
    pub frame: H,
    /// 显示顺序 POC
    pub poc: i32,
    /// 显示时间戳
    pub pts: i64,
    /// 输出时所在槽位
    pub slot: usize,
}

impl<A: FrameAllocator> Dpb<A> {
    /// 取出一幅可显示图像
    ///
    /// 非刷新模式下, 当前序列待输出图像数不超过 `num_reorder_pics + 1` 时继续等待.
    /// 输出游标落后于解码序列时, 先输出旧序列的剩余图像.
    pub fn pull_displayable(&mut self, flush: bool) -> Option<OutputPicture<A::Handle>> {
        loop {
            let mut nb_output = 0usize;
            let mut min: Option<(usize, i32)> = None;
            for (idx, slot) in self.slots.iter().enumerate() {
                if slot.is_free()
                    || slot.sequence != self.ctx.output_sequence
                    || !slot.flags.contains(SlotFlags::NEEDED_FOR_OUTPUT)
                {
                    continue;
                }
                nb_output += 1;
                if min.is_none_or(|(_, poc)| slot.poc < poc) {
                    min = Some((idx, slot.poc));
                }
            }

            // 缓冲图像不足以保证输出顺序
            if !flush
                && self.ctx.output_sequence == self.ctx.decode_sequence
                && nb_output <= self.config.num_reorder_pics as usize + 1
            {
                trace!(
                    "HEVC DPB: 等待更多图像, pending={}, num_reorder_pics={}",
                    nb_output, self.config.num_reorder_pics
                );
                return None;
            }

            if let Some((idx, poc)) = min {
                let slot = &mut self.slots[idx];
                slot.flags.remove(SlotFlags::NEEDED_FOR_OUTPUT);
                let frame = slot.buffer.clone()?;
                debug!("HEVC DPB: 输出 POC {}, slot={}", poc, idx);
                return Some(OutputPicture {
                    frame,
                    poc,
                    pts: slot.pts,
                    slot: idx,
                });
            }

            if self.ctx.output_sequence != self.ctx.decode_sequence {
                self.ctx.output_sequence = self.ctx.output_sequence.wrapping_add(1);
                debug!(
                    "HEVC DPB: 输出序列前进到 {}",
                    self.ctx.output_sequence
                );
            } else {
                return None;
            }
        }
    }

    /// 连续取出全部当前可显示的图像
    pub fn drain(&mut self, flush: bool) -> Vec<OutputPicture<A::Handle>> {
        let mut out = Vec::new();
        while let Some(pic) = self.pull_displayable(flush) {
            out.push(pic);
        }
        out
    }
}
