use crate::models::frame::DecodedImage;
use crate::models::geometry::CropRect;

/// Copy `rect` out of `image` into a new tightly packed buffer.
///
/// The result is always `rect.width * rect.height` pixels. Parts of the
/// rectangle outside the source image are left zeroed (transparent black).
pub fn crop(image: &DecodedImage, rect: CropRect) -> Vec<u8> {
    let bpp = image.format.bytes_per_pixel();
    let dst_stride = rect.width as usize * bpp;
    let mut out = vec![0u8; dst_stride * rect.height as usize];
    if out.is_empty() {
        return out;
    }

    // Intersection of the rectangle with the source, in source coordinates.
    let left = i64::from(rect.x).max(0);
    let top = i64::from(rect.y).max(0);
    let right = (i64::from(rect.x) + i64::from(rect.width)).min(i64::from(image.width));
    let bottom = (i64::from(rect.y) + i64::from(rect.height)).min(i64::from(image.height));
    if left >= right || top >= bottom {
        return out;
    }

    let src_stride = image.stride();
    let row_bytes = (right - left) as usize * bpp;
    let dst_x = (left - i64::from(rect.x)) as usize * bpp;

    for src_y in top..bottom {
        let dst_y = (src_y - i64::from(rect.y)) as usize;
        let src_start = src_y as usize * src_stride + left as usize * bpp;
        let dst_start = dst_y * dst_stride + dst_x;
        out[dst_start..dst_start + row_bytes]
            .copy_from_slice(&image.data[src_start..src_start + row_bytes]);
    }
    out
}
