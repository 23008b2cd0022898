use std::sync::Arc;

use crate::config::DpbConfig;
use crate::error::DpbResult;
use crate::nal::HevcNalUnitType;
use crate::picture::FrameAllocator;

use super::super::{
    Dpb, PictureParams, PictureStart, RefPicListPair, RpsInput, ShortTermRps, SliceParams,
    SliceRefParams, SliceType, SlotFlags,
};

/// 64x64 图像, 16x16 CTB (4x4 网格), log2_max_poc_lsb=8
pub fn build_test_config(capacity: usize, num_reorder_pics: u32) -> DpbConfig {
    DpbConfig {
        capacity,
        log2_max_poc_lsb: 8,
        num_reorder_pics,
        width: 64,
        height: 64,
        log2_ctb_size: 4,
    }
}

pub fn build_test_dpb(capacity: usize, num_reorder_pics: u32) -> Dpb {
    let _ = env_logger::builder().is_test(true).try_init();
    Dpb::with_plane_allocator(build_test_config(capacity, num_reorder_pics))
        .expect("测试配置应有效")
}

/// 直接写入一个占用槽位 (绕过 POC 计算与回收)
pub fn insert_test_slot(dpb: &mut Dpb, idx: usize, poc: i32, flags: SlotFlags) {
    let buffer = dpb.allocator.allocate(poc).expect("分配应成功");
    let ctb_count = dpb.layout.ctb_count();
    let seq = dpb.ctx.decode_sequence;
    let slot = &mut dpb.slots[idx];
    slot.buffer = Some(buffer);
    slot.poc = poc;
    slot.sequence = seq;
    slot.flags = flags;
    slot.ref_table = vec![Arc::new(RefPicListPair::default()); ctb_count];
}

/// 插入一个仍被参考且等待输出的槽位
pub fn insert_reference(dpb: &mut Dpb, idx: usize, poc: i32) {
    insert_test_slot(
        dpb,
        idx,
        poc,
        SlotFlags::NEEDED_FOR_OUTPUT | SlotFlags::SHORT_TERM_REF,
    );
}

/// 设置当前图像 POC (不分配槽位)
pub fn set_current_poc(dpb: &mut Dpb, poc: i32) {
    dpb.ctx.current_poc = Some(poc);
    dpb.ctx.current_poc_lsb = poc.rem_euclid(dpb.config.max_poc_lsb());
}

pub fn trail_r(poc_lsb: u32) -> PictureParams {
    PictureParams {
        nal_type: HevcNalUnitType::TrailR,
        temporal_id: 0,
        poc_lsb,
        pts: poc_lsb as i64,
    }
}

pub fn idr() -> PictureParams {
    PictureParams {
        nal_type: HevcNalUnitType::IdrWRadl,
        temporal_id: 0,
        poc_lsb: 0,
        pts: 0,
    }
}

pub fn slice_refs(slice_type: SliceType, address: usize, active: [u32; 2]) -> SliceRefParams {
    SliceRefParams {
        slice_type,
        address,
        num_ref_idx_active: active,
        list_entry: [None, None],
    }
}

pub fn short_rps(negative: &[(i32, bool)], positive: &[(i32, bool)]) -> Option<RpsInput> {
    Some(RpsInput {
        short_term: ShortTermRps::new(negative, positive),
        long_term: Default::default(),
    })
}

/// 开始图像并解码其首个 slice, 返回 (POC, 槽位)
pub fn decode_picture(
    dpb: &mut Dpb,
    pic: PictureParams,
    rps: Option<RpsInput>,
    refs: SliceRefParams,
) -> DpbResult<(i32, usize)> {
    let poc = match dpb.begin_picture(&pic)? {
        PictureStart::Decode { poc } => poc,
        PictureStart::SkipRasl => panic!("测试图像不应被跳过"),
    };
    let slot = dpb.decode_slice(&SliceParams {
        first_slice: true,
        rps,
        refs,
    })?;
    Ok((poc, slot))
}

/// 解码一幅 IDR 图像
pub fn decode_idr(dpb: &mut Dpb) -> usize {
    decode_picture(dpb, idr(), None, SliceRefParams::default())
        .expect("IDR 解码应成功")
        .1
}
