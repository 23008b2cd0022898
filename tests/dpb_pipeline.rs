//! HEVC DPB 端到端集成测试
//!
//! 通过 `tao_dpb::hevc` 直接驱动 DPB, 以及通过 JSON 轨迹回放验证显示顺序.

use std::io::Write;

use serde_json::{Value, json};
use tao_dpb::hevc::config::DpbConfig;
use tao_dpb::hevc::dpb::{
    Dpb, PictureParams, PictureStart, RpsInput, ShortTermRps, SliceParams, SliceRefParams,
    SliceType,
};
use tao_dpb::hevc::error::DpbError;
use tao_dpb::hevc::nal::HevcNalUnitType;
use tao_dpb::trace::{ReplayOptions, load_trace, parse_trace, replay};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================
// 直接驱动
// ============================================================

/// 解码一幅单 slice 图像, 返回 POC
fn decode(
    dpb: &mut Dpb,
    nal_type: HevcNalUnitType,
    poc_lsb: u32,
    rps: Option<ShortTermRps>,
    slice_type: SliceType,
) -> Result<i32, DpbError> {
    let poc = match dpb.begin_picture(&PictureParams {
        nal_type,
        temporal_id: 0,
        poc_lsb,
        pts: poc_lsb as i64,
    })? {
        PictureStart::Decode { poc } => poc,
        PictureStart::SkipRasl => panic!("测试图像不应被跳过"),
    };
    dpb.decode_slice(&SliceParams {
        first_slice: true,
        rps: rps.map(|short_term| RpsInput {
            short_term,
            long_term: Default::default(),
        }),
        refs: SliceRefParams {
            slice_type,
            address: 0,
            num_ref_idx_active: [2, 2],
            list_entry: [None, None],
        },
    })?;
    Ok(poc)
}

#[test]
fn test_hierarchical_gop_displays_in_poc_order() {
    init_logger();
    let config = DpbConfig {
        capacity: 4,
        num_reorder_pics: 2,
        log2_ctb_size: 4,
        ..DpbConfig::new(64, 64)
    };
    let mut dpb = Dpb::with_plane_allocator(config).expect("配置应有效");

    let mut displayed = Vec::new();
    let steps: [(HevcNalUnitType, u32, Option<ShortTermRps>, SliceType); 5] = [
        (HevcNalUnitType::IdrWRadl, 0, None, SliceType::I),
        (
            HevcNalUnitType::TrailR,
            4,
            Some(ShortTermRps::new(&[(-4, true)], &[])),
            SliceType::P,
        ),
        (
            HevcNalUnitType::TrailR,
            2,
            Some(ShortTermRps::new(&[(-2, true)], &[(2, true)])),
            SliceType::B,
        ),
        (
            HevcNalUnitType::TrailN,
            1,
            Some(ShortTermRps::new(&[(-1, true)], &[(1, true), (3, true)])),
            SliceType::B,
        ),
        (
            HevcNalUnitType::TrailN,
            3,
            Some(ShortTermRps::new(&[(-1, true), (-2, true)], &[(1, true)])),
            SliceType::B,
        ),
    ];
    for (nal_type, lsb, rps, slice_type) in steps {
        let poc = decode(&mut dpb, nal_type, lsb, rps, slice_type).expect("图像解码应成功");
        assert_eq!(poc, lsb as i32);
        if poc == 1 {
            let lists = dpb.current_ref_lists().expect("应有当前参考列表");
            assert_eq!(lists.list(0).pocs(), vec![0, 2]);
            assert_eq!(lists.list(1).pocs(), vec![2, 4]);
        }
        displayed.extend(dpb.drain(false).into_iter().map(|p| p.poc));
    }
    displayed.extend(dpb.finish_stream().into_iter().map(|p| p.poc));
    assert_eq!(displayed, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_missing_reference_keeps_picture_in_dpb() {
    init_logger();
    let mut dpb = Dpb::with_plane_allocator(DpbConfig::new(64, 64)).expect("配置应有效");
    decode(&mut dpb, HevcNalUnitType::IdrNLp, 0, None, SliceType::I).expect("IDR 解码应成功");

    let err = decode(
        &mut dpb,
        HevcNalUnitType::TrailR,
        2,
        Some(ShortTermRps::new(&[(-1, true), (-2, true)], &[])),
        SliceType::P,
    )
    .expect_err("缺失参考应报错");
    assert_eq!(err, DpbError::ReferenceNotFound { poc: 1 });
    assert!(dpb.context().current_slot().is_some(), "图像应保留槽位供错误隐藏");

    let poc = decode(
        &mut dpb,
        HevcNalUnitType::TrailR,
        3,
        Some(ShortTermRps::new(&[(-1, true), (-3, true)], &[])),
        SliceType::P,
    )
    .expect("后续图像应可继续解码");
    assert_eq!(poc, 3);
    let pocs: Vec<i32> = dpb.finish_stream().into_iter().map(|p| p.poc).collect();
    assert_eq!(pocs, vec![0, 2, 3]);
}

// ============================================================
// 轨迹回放
// ============================================================

fn picture(nal_type: u8, poc_lsb: u32, slice: Value) -> Value {
    json!({ "nal_type": nal_type, "poc_lsb": poc_lsb, "slices": [slice] })
}

fn p_slice(negative: &[i32]) -> Value {
    json!({
        "slice_type": "P",
        "short_term_rps": {
            "delta_poc": negative,
            "used": vec![true; negative.len()],
            "num_negative": negative.len(),
        },
        "num_ref_idx_active": [1, 0],
    })
}

fn b_slice(negative: &[i32], positive: &[i32]) -> Value {
    let deltas: Vec<i32> = negative.iter().chain(positive).copied().collect();
    json!({
        "slice_type": "B",
        "short_term_rps": {
            "delta_poc": deltas,
            "used": vec![true; deltas.len()],
            "num_negative": negative.len(),
        },
        "num_ref_idx_active": [2, 2],
    })
}

fn intra_slice() -> Value {
    json!({ "slice_type": "I" })
}

fn hierarchical_trace() -> Value {
    json!({
        "config": {
            "capacity": 4,
            "num_reorder_pics": 2,
            "width": 64,
            "height": 64,
            "log2_ctb_size": 4,
        },
        "pictures": [
            picture(19, 0, intra_slice()),
            picture(1, 4, p_slice(&[-4])),
            picture(1, 2, b_slice(&[-2], &[2])),
            picture(0, 1, b_slice(&[-1], &[1, 3])),
            picture(0, 3, b_slice(&[-1, -2], &[1])),
        ],
    })
}

#[test]
fn test_trace_file_replay_display_order() {
    init_logger();
    let mut file = tempfile::NamedTempFile::new().expect("创建临时文件失败");
    file.write_all(hierarchical_trace().to_string().as_bytes())
        .expect("写入轨迹失败");

    let trace = load_trace(file.path()).expect("轨迹应能读取");
    assert_eq!(trace.pictures.len(), 5);
    let report = replay(&trace, &ReplayOptions::default()).expect("回放应完成");
    assert_eq!(report.display_pocs(), vec![0, 1, 2, 3, 4]);
    assert!(report.failures.is_empty());
    let pts: Vec<i64> = report.displayed.iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 3, 2, 4, 1], "缺省 pts 为解码序号");
}

#[test]
fn test_trace_replay_forced_flush_follows_decode_order() {
    let trace = parse_trace(&hierarchical_trace().to_string()).expect("轨迹应能解析");
    let report = replay(&trace, &ReplayOptions { flush_every: 1 }).expect("回放应完成");
    assert_eq!(
        report.display_pocs(),
        vec![0, 4, 2, 1, 3],
        "每幅图像后强制刷新时按解码顺序输出"
    );
}

#[test]
fn test_trace_replay_sequence_boundaries() {
    init_logger();
    let mut eos_picture = picture(1, 1, p_slice(&[-1]));
    eos_picture["end_of_sequence"] = json!(true);
    let trace = json!({
        "config": { "width": 64, "height": 64, "num_reorder_pics": 1 },
        "pictures": [
            picture(19, 0, intra_slice()),
            eos_picture,
            // EOS 之后的 CRA 开启新序列, 其 RASL 被跳过
            picture(21, 16, intra_slice()),
            picture(8, 14, b_slice(&[-2], &[2])),
            picture(1, 17, p_slice(&[-1])),
            // IDR 开启第三个序列
            picture(20, 0, intra_slice()),
            picture(1, 1, p_slice(&[-1])),
        ],
    });
    let trace = parse_trace(&trace.to_string()).expect("轨迹应能解析");
    let report = replay(&trace, &ReplayOptions::default()).expect("回放应完成");

    assert_eq!(report.skipped_rasl, 1);
    assert!(report.failures.is_empty(), "失败: {:?}", report.failures);
    assert_eq!(
        report.display_pocs(),
        vec![0, 1, 16, 17, 0, 1],
        "每个序列内按 POC 输出, 序列之间按解码顺序"
    );
}

#[test]
fn test_trace_replay_records_recoverable_failures() {
    let trace = json!({
        "config": { "width": 64, "height": 64 },
        "pictures": [
            picture(19, 0, intra_slice()),
            picture(1, 1, p_slice(&[-1])),
            picture(1, 2, p_slice(&[-1, -5])),
            picture(1, 3, p_slice(&[-2])),
        ],
    });
    let trace = parse_trace(&trace.to_string()).expect("轨迹应能解析");
    let report = replay(&trace, &ReplayOptions::default()).expect("回放应完成");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert_eq!(
        report.failures[0].error,
        DpbError::ReferenceNotFound { poc: -3 }
    );
    assert_eq!(report.display_pocs(), vec![0, 1, 2, 3], "参考缺失的图像仍输出");
}

#[test]
fn test_trace_replay_rejects_invalid_config() {
    let trace = json!({
        "config": { "width": 64, "height": 64, "capacity": 0 },
        "pictures": [],
    });
    let trace = parse_trace(&trace.to_string()).expect("轨迹应能解析");
    assert!(replay(&trace, &ReplayOptions::default()).is_err());
}
