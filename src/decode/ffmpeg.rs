//! FFmpeg-backed decoder handle
//!
//! Production implementation of [`DecoderHandle`] over FFmpeg's `h264`
//! decoder. Parameter sets arrive in-band: the session prefixes them to the
//! first input unit after every (re)configuration, so no out-of-band
//! extradata channel is needed.

use crate::decode::{DecodeError, DecoderConfig, DecoderFactory, DecoderHandle, InputStatus};
use crate::surface::DecodedFrame;
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::video::VideoDecoder;
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use anyhow::{Context, Result};
use std::time::Duration;

/// Creates [`FfmpegHandle`]s; safe to consult repeatedly across recoveries
pub struct FfmpegDecoderFactory;

impl DecoderFactory for FfmpegDecoderFactory {
    fn create(&self, config: &DecoderConfig) -> Result<Box<dyn DecoderHandle>> {
        let decoder = VideoDecoder::builder("h264")
            .context("h264 decoder unavailable")?
            .time_base(TimeBase::new(1, 90_000))
            .build()
            .context("failed to build h264 decoder")?;

        log::debug!(
            "FfmpegDecoderFactory: created {}x{} decoder",
            config.width,
            config.height
        );
        Ok(Box::new(FfmpegHandle {
            decoder,
            frame_count: 0,
            packed_buffer: Vec::new(),
            cached_dims: None,
        }))
    }
}

/// H.264 decoder instance wrapping FFmpeg push/take
pub struct FfmpegHandle {
    decoder: VideoDecoder,
    frame_count: i64,
    /// Reusable buffer for packed YUV output to avoid per-frame allocation
    packed_buffer: Vec<u8>,
    /// Cached dimensions for buffer reuse
    cached_dims: Option<(usize, usize)>,
}

unsafe impl Send for FfmpegHandle {}

impl DecoderHandle for FfmpegHandle {
    fn queue_input(
        &mut self,
        data: &[u8],
        _pts_micros: i64,
        _timeout: Duration,
    ) -> Result<InputStatus, DecodeError> {
        // FFmpeg's push is synchronous, so the bounded wait the trait allows
        // is never exercised here. The pts is synthesized on the decoder's
        // 90 kHz clock; presentation timing is the render target's concern.
        self.frame_count += 1;
        let pts = Timestamp::new(self.frame_count, TimeBase::new(1, 90_000));
        let packet = PacketMut::from(data).with_pts(pts).freeze();

        self.decoder
            .try_push(packet)
            .map_err(|err| DecodeError::Input(err.to_string()))?;
        Ok(InputStatus::Queued)
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<Option<DecodedFrame>, DecodeError> {
        let frame = match self.decoder.take() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(err) => return Err(DecodeError::Output(err.to_string())),
        };

        let w = frame.width();
        let h = frame.height();
        let planes = frame.planes();
        let (y_d, u_d, v_d) = (planes[0].data(), planes[1].data(), planes[2].data());
        let (y_s, u_s, v_s) = (
            planes[0].line_size(),
            planes[1].line_size(),
            planes[2].line_size(),
        );
        let (uw, uh) = (w / 2, h / 2);
        let total = w * h + uw * uh * 2;

        if self.cached_dims != Some((w, h)) {
            self.packed_buffer.resize(total, 0);
            self.cached_dims = Some((w, h));
        }

        pack_yuv420(
            &mut self.packed_buffer,
            Plane {
                data: y_d,
                stride: y_s,
                width: w,
                height: h,
            },
            Plane {
                data: u_d,
                stride: u_s,
                width: uw,
                height: uh,
            },
            Plane {
                data: v_d,
                stride: v_s,
                width: uw,
                height: uh,
            },
        );

        let pts_micros = self.frame_count * 1_000_000 / 90_000;
        Ok(Some(DecodedFrame {
            data: self.packed_buffer.clone(),
            width: w as u32,
            height: h as u32,
            pts_micros,
        }))
    }

    fn stop(&mut self) {
        // FFmpeg releases codec resources on drop; nothing to flush since
        // undrained output is stale by the time a stop happens.
    }
}

#[derive(Clone, Copy)]
struct Plane<'a> {
    data: &'a [u8],
    stride: usize,
    width: usize,
    height: usize,
}

fn pack_yuv420(dst: &mut [u8], y: Plane<'_>, u: Plane<'_>, v: Plane<'_>) {
    let y_size = y.width * y.height;
    let u_size = u.width * u.height;
    extract_plane(&mut dst[..y_size], y.data, y.stride, y.width, y.height);
    extract_plane(
        &mut dst[y_size..y_size + u_size],
        u.data,
        u.stride,
        u.width,
        u.height,
    );
    extract_plane(
        &mut dst[y_size + u_size..],
        v.data,
        v.stride,
        v.width,
        v.height,
    );
}

/// Extract a plane from padded source to contiguous destination.
///
/// Fast path for unpadded strides, row-by-row copy otherwise.
#[inline]
fn extract_plane(dst: &mut [u8], src: &[u8], stride: usize, width: usize, height: usize) {
    let total_src = height * stride;

    if stride == width && src.len() >= total_src {
        dst.copy_from_slice(&src[..width * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * stride;
        let dst_start = r * width;
        if src_start + width > src.len() || dst_start + width > dst.len() {
            break;
        }
        dst[dst_start..dst_start + width].copy_from_slice(&src[src_start..src_start + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plane_unpadded() {
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        extract_plane(&mut dst, &src, 3, 3, 2);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_extract_plane_strips_padding() {
        // 2x2 plane with stride 4
        let src = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let mut dst = [0u8; 4];
        extract_plane(&mut dst, &src, 4, 2, 2);
        assert_eq!(dst, [1, 2, 3, 4]);
    }
}
