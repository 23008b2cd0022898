//! H.265/HEVC NAL 单元类型分类.
//!
//! DPB 只关心 NAL 头中的两项信息:
//! - nal_unit_type (6 bits): 判定 IRAP/BLA/IDR 边界与子层非参考图像
//! - nuh_temporal_id_plus1 (3 bits): 判定是否更新 `poc_tid0` 锚点

use crate::error::{DpbError, DpbResult};

/// HEVC NAL 单元类型 (仅 VCL 与 DPB 相关的类型)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// TSA_N
    TsaN,
    /// TSA_R
    TsaR,
    /// STSA_N
    StsaN,
    /// STSA_R
    StsaR,
    /// RADL_N
    RadlN,
    /// RADL_R
    RadlR,
    /// RASL_N
    RaslN,
    /// RASL_R
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    /// 保留的 VCL 类型 (10-15, 22-31)
    ReservedVcl(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建, 非 VCL 类型返回错误
    pub fn from_type_id(id: u8) -> DpbResult<Self> {
        let nal_type = match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            10..=15 | 22..=31 => Self::ReservedVcl(id),
            _ => {
                return Err(DpbError::InvalidArgument(format!(
                    "nal_unit_type={} 不是 VCL 类型",
                    id
                )));
            }
        };
        Ok(nal_type)
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::ReservedVcl(id) => *id,
        }
    }

    /// 是否为 IRAP (Intra Random Access Point)
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=23)
    }

    /// 是否为 IDR
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// 是否为 BLA (断链访问), 其 POC MSB 强制为 0
    pub fn is_bla(&self) -> bool {
        matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
    }

    /// 是否开启新的编码视频序列 (IDR/BLA)
    pub fn starts_sequence(&self) -> bool {
        self.is_idr() || self.is_bla()
    }

    /// 是否为 RASL/RADL 前置图像
    pub fn is_leading(&self) -> bool {
        matches!(
            self,
            Self::RadlN | Self::RadlR | Self::RaslN | Self::RaslR
        )
    }

    /// 是否为子层非参考图像 (SLNR)
    ///
    /// 类型编号 <= 14 的偶数值均为子层非参考.
    pub fn is_sub_layer_non_reference(&self) -> bool {
        let id = self.type_id();
        id <= 14 && id % 2 == 0
    }
}

/// 从 2 字节 NAL 头中提取 (nal_unit_type, temporal_id)
pub fn parse_nal_header(header: &[u8]) -> DpbResult<(HevcNalUnitType, u8)> {
    if header.len() < 2 {
        return Err(DpbError::InvalidArgument("HEVC NAL 头不足 2 字节".into()));
    }
    let nal_type = HevcNalUnitType::from_type_id((header[0] >> 1) & 0x3F)?;
    let temporal_id_plus1 = header[1] & 0x07;
    if temporal_id_plus1 == 0 {
        return Err(DpbError::InvalidArgument(
            "nuh_temporal_id_plus1 不能为 0".into(),
        ));
    }
    Ok((nal_type, temporal_id_plus1 - 1))
}
