//! HEVC 解码图像缓冲 (DPB).
//!
//! 固定容量的槽位数组, 以槽位索引在 RPS 分类、参考列表与 CTB 参考表之间互相引用.
//!
//! 每幅图像的调用顺序:
//! 1. `begin_picture()`: 计算 POC, 必要时开启新的编码视频序列
//! 2. 对每个 slice 调用 `decode_slice()`: RPS 分类 -> (首个 slice) 回收并分配槽位
//!    -> 构建参考列表并写入 CTB 参考表. 参考缺失不会丢弃图像
//! 3. 任意时刻调用 `pull_displayable()` 取出 0 或 1 幅可显示图像
//!
//! 所有状态 (解码序列号、输出序列游标、`poc_tid0` 锚点) 都保存在实例内,
//! 一个 `Dpb` 只服务一路解码上下文.

mod output;
pub mod poc;
mod reclaim;
pub mod ref_list;
pub mod rps;

use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, warn};

use crate::config::{CtbLayout, DpbConfig};
use crate::error::{DpbError, DpbResult};
use crate::nal::HevcNalUnitType;
use crate::picture::{FrameAllocator, PlaneAllocator};

pub use output::OutputPicture;
pub use ref_list::{RefListEntry, RefPicList, RefPicListPair, SliceRefParams, SliceType};
pub use rps::{
    LongTermEntry, LongTermRps, RefPicSetCategories, RefPocEntry, RpsCategory, ShortTermRps,
};

bitflags! {
    /// 槽位状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SlotFlags: u8 {
        /// 等待输出显示
        const NEEDED_FOR_OUTPUT = 1 << 0;
        /// 仍被用作参考 (短期或长期)
        const SHORT_TERM_REF    = 1 << 1;
    }
}

/// DPB 槽位
#[derive(Debug)]
pub struct Slot<H> {
    buffer: Option<H>,
    poc: i32,
    sequence: u8,
    flags: SlotFlags,
    pts: i64,
    /// 每个 CTB (光栅扫描顺序) 的参考列表句柄, 连续区间共享同一个 `Arc`
    ref_table: Vec<Arc<RefPicListPair>>,
}

impl<H> Slot<H> {
    fn empty() -> Self {
        Self {
            buffer: None,
            poc: 0,
            sequence: 0,
            flags: SlotFlags::empty(),
            pts: 0,
            ref_table: Vec::new(),
        }
    }

    /// 槽位是否空闲
    pub fn is_free(&self) -> bool {
        self.buffer.is_none()
    }

    /// 图像的 POC
    pub fn poc(&self) -> i32 {
        self.poc
    }

    /// 分配时的解码序列号
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// 当前状态位
    pub fn flags(&self) -> SlotFlags {
        self.flags
    }

    /// 显示时间戳
    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// 帧缓冲句柄
    pub fn buffer(&self) -> Option<&H> {
        self.buffer.as_ref()
    }

    /// CTB 参考表
    pub fn ref_table(&self) -> &[Arc<RefPicListPair>] {
        &self.ref_table
    }

    /// 释放 DPB 持有的缓冲引用与参考表
    fn release(&mut self) {
        self.buffer = None;
        self.flags = SlotFlags::empty();
        self.ref_table = Vec::new();
    }
}

/// 解码上下文: 每个解码实例独立持有的跨图像状态
#[derive(Debug, Clone)]
pub struct DecodeContext {
    decode_sequence: u8,
    output_sequence: u8,
    poc_tid0: i32,
    /// 下一幅 IRAP 是否开启新序列 (码流开头或 EOS 之后)
    pending_sequence_start: bool,
    /// 当前 IRAP 的 NoRaslOutputFlag, 关联的 RASL 图像不可解码
    skip_rasl: bool,
    current_poc: Option<i32>,
    current_poc_lsb: i32,
    current_pts: i64,
    current_slot: Option<usize>,
    current_address: usize,
    categories: RefPicSetCategories,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self {
            decode_sequence: 0,
            output_sequence: 0,
            poc_tid0: 0,
            pending_sequence_start: true,
            skip_rasl: false,
            current_poc: None,
            current_poc_lsb: 0,
            current_pts: 0,
            current_slot: None,
            current_address: 0,
            categories: RefPicSetCategories::default(),
        }
    }
}

impl DecodeContext {
    /// 当前解码序列号
    pub fn decode_sequence(&self) -> u8 {
        self.decode_sequence
    }

    /// 当前输出序列游标
    pub fn output_sequence(&self) -> u8 {
        self.output_sequence
    }

    /// 最近一幅 TemporalId=0 参考图像的 POC
    pub fn poc_tid0(&self) -> i32 {
        self.poc_tid0
    }

    /// 当前图像的 POC
    pub fn current_poc(&self) -> Option<i32> {
        self.current_poc
    }

    /// 当前图像占用的槽位
    pub fn current_slot(&self) -> Option<usize> {
        self.current_slot
    }

    /// 当前图像的 RPS 分类结果
    pub fn categories(&self) -> &RefPicSetCategories {
        &self.categories
    }
}

/// 图像级输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureParams {
    /// NAL 单元类型
    pub nal_type: HevcNalUnitType,
    /// TemporalId (nuh_temporal_id_plus1 - 1)
    pub temporal_id: u8,
    /// slice_pic_order_cnt_lsb (IDR 为 0)
    pub poc_lsb: u32,
    /// 显示时间戳
    pub pts: i64,
}

/// `begin_picture()` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureStart {
    /// 图像可解码
    Decode { poc: i32 },
    /// 随机接入点之后不可解码的 RASL 图像, 调用方应丢弃
    SkipRasl,
}

/// slice 的参考图像集输入
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpsInput {
    /// 短期 RPS
    pub short_term: ShortTermRps,
    /// 长期 RPS
    pub long_term: LongTermRps,
}

/// slice 级输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceParams {
    /// first_slice_segment_in_pic_flag
    pub first_slice: bool,
    /// 参考图像集, IDR 等无参考图像时为 `None`
    pub rps: Option<RpsInput>,
    /// 参考列表构建参数
    pub refs: SliceRefParams,
}

/// HEVC 解码图像缓冲
pub struct Dpb<A: FrameAllocator = PlaneAllocator> {
    config: DpbConfig,
    layout: CtbLayout,
    slots: Vec<Slot<A::Handle>>,
    ctx: DecodeContext,
    allocator: A,
}

impl Dpb<PlaneAllocator> {
    /// 使用默认 YUV420P 分配器创建 DPB
    pub fn with_plane_allocator(config: DpbConfig) -> DpbResult<Self> {
        let allocator = PlaneAllocator::new(config.width, config.height);
        Self::new(config, allocator)
    }
}

impl<A: FrameAllocator> Dpb<A> {
    /// 创建 DPB
    pub fn new(config: DpbConfig, allocator: A) -> DpbResult<Self> {
        config.validate()?;
        let layout = config.ctb_layout();
        let slots = (0..config.capacity).map(|_| Slot::empty()).collect();
        debug!(
            "HEVC DPB: 创建, 容量={}, log2_max_poc_lsb={}, num_reorder_pics={}, ctb={}x{}",
            config.capacity,
            config.log2_max_poc_lsb,
            config.num_reorder_pics,
            layout.width_in_ctbs,
            layout.height_in_ctbs
        );
        Ok(Self {
            config,
            layout,
            slots,
            ctx: DecodeContext::default(),
            allocator,
        })
    }

    /// 当前配置
    pub fn config(&self) -> &DpbConfig {
        &self.config
    }

    /// CTB 布局
    pub fn layout(&self) -> CtbLayout {
        self.layout
    }

    /// 全部槽位
    pub fn slots(&self) -> &[Slot<A::Handle>] {
        &self.slots
    }

    /// 按索引取槽位
    pub fn slot(&self, idx: usize) -> Option<&Slot<A::Handle>> {
        self.slots.get(idx)
    }

    /// 解码上下文
    pub fn context(&self) -> &DecodeContext {
        &self.ctx
    }

    /// 帧缓冲分配器
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// 当前图像的重建输出缓冲
    pub fn current_frame(&self) -> Option<&A::Handle> {
        self.ctx
            .current_slot
            .and_then(|idx| self.slots[idx].buffer.as_ref())
    }

    /// 激活新 SPS 时更新重排深度
    pub fn set_num_reorder_pics(&mut self, num_reorder_pics: u32) -> DpbResult<()> {
        if num_reorder_pics as usize >= self.config.capacity {
            return Err(DpbError::InvalidArgument(format!(
                "num_reorder_pics={} 必须小于 DPB 容量 {}",
                num_reorder_pics, self.config.capacity
            )));
        }
        self.config.num_reorder_pics = num_reorder_pics;
        Ok(())
    }

    // ============================================================
    // 图像/slice 驱动
    // ============================================================

    /// 开始一幅新图像: 计算 POC, IDR/BLA (以及码流开头/EOS 后的 CRA) 开启新序列
    pub fn begin_picture(&mut self, pic: &PictureParams) -> DpbResult<PictureStart> {
        let max_lsb = self.config.max_poc_lsb();
        if pic.poc_lsb as i64 >= max_lsb as i64 {
            return Err(DpbError::InvalidArgument(format!(
                "poc_lsb={} 超出 MaxPicOrderCntLsb={}",
                pic.poc_lsb, max_lsb
            )));
        }

        let nal = pic.nal_type;
        let new_sequence =
            nal.starts_sequence() || (nal.is_irap() && self.ctx.pending_sequence_start);
        if nal.is_irap() {
            self.ctx.skip_rasl = new_sequence;
        }
        self.ctx.current_poc = None;
        self.ctx.current_slot = None;
        self.ctx.current_address = 0;
        self.ctx.categories = RefPicSetCategories::default();

        if matches!(nal, HevcNalUnitType::RaslN | HevcNalUnitType::RaslR) && self.ctx.skip_rasl {
            debug!("HEVC DPB: 跳过随机接入点之后的 RASL 图像, poc_lsb={}", pic.poc_lsb);
            return Ok(PictureStart::SkipRasl);
        }

        if new_sequence {
            self.start_new_sequence();
        }

        // 开启新序列的 IRAP (含全部 IDR/BLA) MSB 取 0, 其余图像按锚点推导
        let poc_lsb = pic.poc_lsb as i32;
        let log2_max_poc_lsb = self.config.log2_max_poc_lsb;
        let poc = if new_sequence {
            poc::compute_poc_msb_reset(poc_lsb, log2_max_poc_lsb, true, self.ctx.poc_tid0)?
        } else {
            poc::compute_poc(poc_lsb, log2_max_poc_lsb, nal, self.ctx.poc_tid0)?
        };
        if poc::updates_poc_tid0(nal, pic.temporal_id) {
            self.ctx.poc_tid0 = poc;
        }

        self.ctx.current_poc = Some(poc);
        self.ctx.current_poc_lsb = pic.poc_lsb as i32;
        self.ctx.current_pts = pic.pts;
        debug!(
            "HEVC DPB: 开始图像, nal={:?}, tid={}, poc={}, seq={}",
            nal, pic.temporal_id, poc, self.ctx.decode_sequence
        );
        Ok(PictureStart::Decode { poc })
    }

    /// 处理一个 slice, 返回当前图像所在槽位
    ///
    /// Curr 类参考缺失时图像仍占有槽位并参与输出: 该 slice 的区间绑定空参考列表,
    /// 返回 `ReferenceNotFound`, 由调用方做错误隐藏. 后续 slice 可继续解码.
    pub fn decode_slice(&mut self, slice: &SliceParams) -> DpbResult<usize> {
        let poc = self.ctx.current_poc.ok_or(DpbError::NoCurrentPicture)?;
        if !slice.first_slice && self.ctx.current_slot.is_none() {
            return Err(DpbError::NoCurrentPicture);
        }

        let missing = match &slice.rps {
            Some(rps) => match self.classify_rps(&rps.short_term, &rps.long_term) {
                Ok(_) => None,
                Err(DpbError::ReferenceNotFound { poc: missing_poc }) => Some(missing_poc),
                Err(e) => return Err(e),
            },
            None => {
                self.ctx.categories = RefPicSetCategories::default();
                None
            }
        };

        // 回收只依据已解析的条目
        let slot = self.acquire_free_slot(poc, slice.first_slice)?;
        if let Some(missing_poc) = missing {
            warn!(
                "HEVC DPB: POC {} 缺失参考帧 POC {}, slice 地址 {} 起使用空参考列表",
                poc, missing_poc, slice.refs.address
            );
            self.install_ref_lists(slot, slice.refs.address, RefPicListPair::default())?;
            return Err(DpbError::ReferenceNotFound { poc: missing_poc });
        }

        let pair = if slice.rps.is_some() && slice.refs.slice_type != SliceType::I {
            ref_list::build_ref_lists(&self.ctx.categories, &slice.refs)?
        } else {
            RefPicListPair::default()
        };
        self.install_ref_lists(slot, slice.refs.address, pair)?;
        Ok(slot)
    }

    /// 收到 EOS NAL: 下一幅 IRAP 开启新序列
    pub fn end_of_sequence(&mut self) {
        self.ctx.pending_sequence_start = true;
    }

    /// 码流结束: 刷新输出全部剩余图像
    pub fn finish_stream(&mut self) -> Vec<OutputPicture<A::Handle>> {
        self.ctx.current_poc = None;
        self.ctx.current_slot = None;
        self.drain(true)
    }

    fn start_new_sequence(&mut self) {
        self.clear_all_unneeded();
        self.ctx.decode_sequence = self.ctx.decode_sequence.wrapping_add(1);
        self.ctx.pending_sequence_start = false;
        debug!("HEVC DPB: 开启新编码视频序列, seq={}", self.ctx.decode_sequence);
    }

    // ============================================================
    // 槽位池
    // ============================================================

    /// 为 POC 为 `poc` 的图像取得槽位
    ///
    /// 首个 slice 先按当前 RPS 分类结果回收, 再取索引最小的空槽位;
    /// 后续 slice 只按 POC 找回已分配的槽位.
    pub fn acquire_free_slot(&mut self, poc: i32, first_slice: bool) -> DpbResult<usize> {
        if !first_slice {
            if let Some(idx) = self.ctx.current_slot {
                let slot = &self.slots[idx];
                if !slot.is_free()
                    && slot.poc == poc
                    && slot.sequence == self.ctx.decode_sequence
                {
                    return Ok(idx);
                }
            }
            return self.find_by_poc(poc, false);
        }

        let used = self.ctx.categories.used_slots(self.slots.len());
        self.reclaim_unused(&used);

        let Some(idx) = self.slots.iter().position(Slot::is_free) else {
            warn!("HEVC DPB: DPB 已满, 无法为 POC {} 分配槽位", poc);
            return Err(DpbError::DpbFull { poc });
        };
        let buffer = self.allocator.allocate(poc)?;
        let empty = Arc::new(RefPicListPair::default());
        let slot = &mut self.slots[idx];
        slot.buffer = Some(buffer);
        slot.poc = poc;
        slot.flags = SlotFlags::NEEDED_FOR_OUTPUT | SlotFlags::SHORT_TERM_REF;
        slot.sequence = self.ctx.decode_sequence;
        slot.pts = self.ctx.current_pts;
        slot.ref_table = vec![empty; self.layout.ctb_count()];
        self.ctx.current_slot = Some(idx);
        debug!("HEVC DPB: 分配槽位 {} 给 POC {}", idx, poc);
        Ok(idx)
    }

    /// 按 POC 查找当前序列中的参考槽位
    ///
    /// 先做精确匹配; 仅当 `allow_lsb_only_match` 时再按 POC LSB 匹配 (长期参考).
    /// 同时满足时索引最小者优先.
    pub fn find_by_poc(&self, poc: i32, allow_lsb_only_match: bool) -> DpbResult<usize> {
        let seq = self.ctx.decode_sequence;
        let is_ref = |slot: &Slot<A::Handle>| {
            !slot.is_free()
                && slot.sequence == seq
                && slot.flags.contains(SlotFlags::SHORT_TERM_REF)
        };

        if let Some(idx) = self
            .slots
            .iter()
            .position(|slot| is_ref(slot) && slot.poc == poc)
        {
            return Ok(idx);
        }

        if allow_lsb_only_match {
            let mask = self.config.max_poc_lsb() - 1;
            if let Some(idx) = self
                .slots
                .iter()
                .position(|slot| is_ref(slot) && (slot.poc & mask) == poc)
            {
                return Ok(idx);
            }
        }

        debug!(
            "HEVC DPB: 未找到参考帧, poc={}, lsb_only={}",
            poc, allow_lsb_only_match
        );
        Err(DpbError::ReferenceNotFound { poc })
    }
}
