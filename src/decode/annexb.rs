//! Annex-B H.264 stream inspection
//!
//! The pipeline treats payloads as opaque except for one concern: locating
//! SPS/PPS parameter sets so the decoder can be configured before coded
//! picture data arrives. Only 4-byte start codes are recognized, matching
//! what the capture side emits.

use bytes::{Bytes, BytesMut};

const START_CODE: &[u8] = &[0, 0, 0, 1];

const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

/// Baseline-profile fallback used when a stream carries no in-band parameter
/// sets and none were supplied out of band.
pub const DEFAULT_SPS: &[u8] = &[
    0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x80, 0x1f, 0xda, 0x01, 0x40, 0x16, 0xec, 0x04, 0x40,
    0x00, 0x00, 0x03, 0x00, 0x40, 0x00, 0x00, 0x0f, 0x03, 0xc5, 0x8b, 0xb8,
];

/// Fallback PPS paired with [`DEFAULT_SPS`]
pub const DEFAULT_PPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x38, 0x80];

/// Decoder configuration data: one SPS and one PPS, each with its leading
/// start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Bytes,
    pub pps: Bytes,
}

impl ParameterSets {
    /// The hardcoded fallback parameter sets
    pub fn fallback() -> Self {
        Self {
            sps: Bytes::from_static(DEFAULT_SPS),
            pps: Bytes::from_static(DEFAULT_PPS),
        }
    }

    /// Both parameter sets concatenated as one Annex-B run, suitable for
    /// prefixing the first input unit after (re)configuration.
    pub fn annex_b(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.sps.len() + self.pps.len());
        out.extend_from_slice(&self.sps);
        out.extend_from_slice(&self.pps);
        out.freeze()
    }
}

/// Byte span of one NAL unit, start code included
struct NalUnit<'a> {
    nal_type: u8,
    span: &'a [u8],
}

/// Split an Annex-B buffer into NAL unit spans
fn nal_units(data: &[u8]) -> Vec<NalUnit<'_>> {
    let mut starts = Vec::new();
    let mut i = 0usize;
    while i + START_CODE.len() < data.len() {
        if &data[i..i + START_CODE.len()] == START_CODE {
            starts.push(i);
            i += START_CODE.len();
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(data.len());
        let header = start + START_CODE.len();
        if header < end {
            units.push(NalUnit {
                nal_type: data[header] & 0x1F,
                span: &data[start..end],
            });
        }
    }
    units
}

/// True if the access unit contains an IDR slice (type 5) or SPS/PPS (7/8)
pub fn contains_idr_or_parameter_sets(data: &[u8]) -> bool {
    nal_units(data)
        .iter()
        .any(|unit| matches!(unit.nal_type, NAL_IDR | NAL_SPS | NAL_PPS))
}

/// Scan an access unit for embedded parameter sets.
///
/// Returns `Some` when an SPS is present; a missing PPS falls back to the
/// default one. Returns `None` when no SPS is found, in which case the
/// caller decides between an out-of-band configuration and
/// [`ParameterSets::fallback`].
pub fn extract_parameter_sets(data: &[u8]) -> Option<ParameterSets> {
    let mut sps: Option<Bytes> = None;
    let mut pps: Option<Bytes> = None;

    for unit in nal_units(data) {
        match unit.nal_type {
            NAL_SPS if sps.is_none() => sps = Some(Bytes::copy_from_slice(unit.span)),
            NAL_PPS if pps.is_none() => pps = Some(Bytes::copy_from_slice(unit.span)),
            _ => {}
        }
    }

    sps.map(|sps| ParameterSets {
        sps,
        pps: pps.unwrap_or_else(|| Bytes::from_static(DEFAULT_PPS)),
    })
}
