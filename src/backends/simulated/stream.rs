// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic encoded frames
//!
//! Each frame carries its index so a written stream can be checked for
//! ordering. H.264 frames are Annex-B NAL units (SPS and PPS ahead of the
//! first IDR); MJPEG frames are SOI..EOI images. No byte after a header is
//! ever zero, so start codes cannot be emulated inside a payload.

use crate::backends::Encoding;

const START_CODE: [u8; 4] = [0, 0, 0, 1];
const NAL_SPS: u8 = 0x67;
const NAL_PPS: u8 = 0x68;
const NAL_IDR: u8 = 0x65;
const NAL_SLICE: u8 = 0x41;
const INDEX_BYTES: usize = 10;

/// Build one encoded frame of exactly `size` bytes (truncated if headers do not fit)
pub(super) fn synthetic_frame(encoding: Encoding, index: u64, gop: u64, size: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(size.max(64));

    match encoding {
        Encoding::Mjpeg => {
            frame.extend_from_slice(&[0xff, 0xd8, 0xff, 0xfe]);
            push_index(&mut frame, index);
        }
        _ => {
            if index == 0 {
                frame.extend_from_slice(&START_CODE);
                frame.extend_from_slice(&[NAL_SPS, 0x64, 0x80, 0x28, 0xac]);
                frame.extend_from_slice(&START_CODE);
                frame.extend_from_slice(&[NAL_PPS, 0xee, 0x9c, 0x80]);
            }
            let keyframe = gop == 0 || index % gop == 0;
            frame.extend_from_slice(&START_CODE);
            frame.push(if keyframe { NAL_IDR } else { NAL_SLICE });
            push_index(&mut frame, index);
        }
    }

    let trailer: &[u8] = if encoding == Encoding::Mjpeg {
        &[0xff, 0xd9]
    } else {
        &[]
    };

    let filler = size.saturating_sub(frame.len() + trailer.len());
    frame.extend((0..filler).map(|i| 0x80 | (i as u8 & 0x7f)));
    frame.extend_from_slice(trailer);
    frame.truncate(size);
    frame
}

/// Index as 7-bit groups with the high bit set
fn push_index(frame: &mut Vec<u8>, index: u64) {
    for group in 0..INDEX_BYTES {
        frame.push(0x80 | ((index >> (7 * group)) & 0x7f) as u8);
    }
}

fn read_index(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < INDEX_BYTES {
        return None;
    }
    let index = bytes[..INDEX_BYTES]
        .iter()
        .enumerate()
        .fold(0u64, |acc, (group, b)| {
            acc | (((b & 0x7f) as u64) << (7 * group))
        });
    Some(index)
}

/// Frame indices found in a synthetic H.264 stream, in stream order
pub fn parse_frame_indices(stream: &[u8]) -> Vec<u64> {
    let mut indices = Vec::new();
    let mut pos = 0;

    while pos + START_CODE.len() < stream.len() {
        if stream[pos..].starts_with(&START_CODE) {
            let nal = pos + START_CODE.len();
            if matches!(stream[nal], NAL_IDR | NAL_SLICE)
                && let Some(index) = read_index(&stream[nal + 1..])
            {
                indices.push(index);
            }
            pos = nal;
        } else {
            pos += 1;
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_carries_parameter_sets() {
        let frame = synthetic_frame(Encoding::H264, 0, 30, 256);
        assert_eq!(frame.len(), 256);
        assert_eq!(&frame[..5], &[0, 0, 0, 1, NAL_SPS]);
    }

    #[test]
    fn test_indices_survive_concatenation() {
        let mut stream = Vec::new();
        for index in 0..40 {
            stream.extend(synthetic_frame(Encoding::H264, index, 30, 128));
        }
        assert_eq!(parse_frame_indices(&stream), (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_mjpeg_frame_is_delimited() {
        let frame = synthetic_frame(Encoding::Mjpeg, 3, 0, 64);
        assert_eq!(&frame[..2], &[0xff, 0xd8]);
        assert_eq!(&frame[62..], &[0xff, 0xd9]);
    }
}
