use anyhow::{Result, anyhow};
use rayon::prelude::*;

use crate::{
    device::{Image, ImageFormat},
    types::{ChannelLayout, PixelBuffer},
};

/// Converts a sensor image into a 4-channel buffer ready for a frame sink.
pub fn convert_image(image: &Image) -> Result<PixelBuffer> {
    let width = image.width;
    let height = image.height;
    if image.is_empty() {
        return Err(anyhow!("{:?} image is empty", image.format));
    }

    let (layout, bytes) = match image.format {
        ImageFormat::ColourBgra32 => (
            ChannelLayout::Bgra8,
            bgra_passthrough(&image.data, width, height, image.stride)?,
        ),
        ImageFormat::Depth16 | ImageFormat::Ir16 => (
            ChannelLayout::Rgba8,
            sample16_to_rgba(&image.data, width, height, image.stride)?,
        ),
        ImageFormat::BodyIndex8 => (
            ChannelLayout::Rgba8,
            body_index_to_rgba(&image.data, width, height, image.stride)?,
        ),
    };

    Ok(PixelBuffer::new(width, height, layout, bytes))
}

fn check_len(kind: &str, data: &[u8], stride: usize, row_bytes: usize, height: u32) -> Result<()> {
    if row_bytes == 0 || height == 0 {
        return Err(anyhow!("{kind} image has no pixels"));
    }
    if stride < row_bytes {
        return Err(anyhow!(
            "{kind} stride too small: got {stride}, expected at least {row_bytes}"
        ));
    }
    let expected_len = stride * (height as usize).saturating_sub(1) + row_bytes;
    if data.len() < expected_len {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Copies BGRA rows into a tightly packed buffer with a 4 x width pitch.
pub fn bgra_passthrough(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let row_bytes = width as usize * 4;
    check_len("BGRA", data, stride, row_bytes, height)?;

    if stride == row_bytes {
        return Ok(data[..row_bytes * height as usize].to_vec());
    }

    let mut bgra = vec![0u8; row_bytes * height as usize];
    bgra.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst)| {
            let src = &data[y * stride..y * stride + row_bytes];
            dst.copy_from_slice(src);
        });
    Ok(bgra)
}

/// Expands 16-bit depth or infrared samples.
///
/// Bytes 0 and 1 carry the little-endian sample unchanged, byte 2 is 0x00
/// for a non-zero sample and 0xFF for a zero (invalid) one, byte 3 is 0xFF.
pub fn sample16_to_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let row_bytes = width as usize * 2;
    check_len("16-bit", data, stride, row_bytes, height)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    rgba.par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let src_row = &data[y * stride..y * stride + row_bytes];
            for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(2)) {
                let sample = u16::from_le_bytes([src[0], src[1]]);
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = if sample > 0 { 0x00 } else { 0xFF };
                dst[3] = 0xFF;
            }
        });

    Ok(rgba)
}

/// Replicates each body index into R, G and B with an opaque alpha.
pub fn body_index_to_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let row_bytes = width as usize;
    check_len("body index", data, stride, row_bytes, height)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    rgba.par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let src_row = &data[y * stride..y * stride + row_bytes];
            for (dst, &value) in dst_row.chunks_exact_mut(4).zip(src_row) {
                dst[0] = value;
                dst[1] = value;
                dst[2] = value;
                dst[3] = 0xFF;
            }
        });

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sample_marks_invalid_channel() {
        let out = sample16_to_rgba(&[0x00, 0x00, 0x01, 0x00], 2, 1, 4).unwrap();
        assert_eq!(&out[0..4], &[0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(&out[4..8], &[0x01, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn high_byte_only_sample_counts_as_valid() {
        let out = sample16_to_rgba(&[0x00, 0x02], 1, 1, 2).unwrap();
        assert_eq!(out, vec![0x00, 0x02, 0x00, 0xFF]);
    }

    #[test]
    fn body_index_replicates_value() {
        let out = body_index_to_rgba(&[3, 255], 2, 1, 2).unwrap();
        assert_eq!(out, vec![3, 3, 3, 0xFF, 255, 255, 255, 0xFF]);
    }

    #[test]
    fn bgra_drops_row_padding() {
        // 1x2 image with 2 bytes of padding per row.
        let data = [1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        let out = bgra_passthrough(&data, 1, 2, 6).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn rejects_zero_sized_images() {
        assert!(bgra_passthrough(&[], 0, 4, 0).is_err());
        assert!(sample16_to_rgba(&[], 0, 4, 0).is_err());
        assert!(body_index_to_rgba(&[], 0, 4, 0).is_err());
        assert!(sample16_to_rgba(&[0; 8], 4, 0, 8).is_err());
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(sample16_to_rgba(&[0; 3], 2, 1, 4).is_err());
        assert!(body_index_to_rgba(&[0; 4], 2, 2, 1).is_err());
    }

    #[test]
    fn convert_image_reports_layout_and_pitch() {
        let depth = Image::from_data(ImageFormat::Depth16, 640, 576, vec![0; 640 * 576 * 2]);
        let buffer = convert_image(&depth).unwrap();
        assert_eq!(buffer.size(), (640, 576));
        assert_eq!(buffer.layout, ChannelLayout::Rgba8);
        assert_eq!(buffer.row_pitch, 640 * 4);
        assert_eq!(buffer.bytes.len(), 640 * 576 * 4);

        let colour = Image::new(ImageFormat::ColourBgra32, 4, 2);
        assert_eq!(convert_image(&colour).unwrap().layout, ChannelLayout::Bgra8);

        let empty = Image::new(ImageFormat::Ir16, 0, 0);
        assert!(convert_image(&empty).is_err());
    }
}
