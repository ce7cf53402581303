use crate::foundation::error::{WarpError, WarpResult};
use crate::foundation::math::unpremultiply_rgba8;
use crate::raster::composite::{BlendMode, PremulRgba8, blend};

/// Pixel layout of a [`RasterBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixelFormat {
    /// Opaque single-channel 8-bit.
    Gray8,
    /// Opaque 8-bit RGB.
    Rgb8,
    /// Premultiplied RGBA8.
    Rgba8Premul,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8Premul => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8Premul)
    }
}

/// A tightly packed, row-major pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl RasterBuffer {
    /// Zero-filled buffer (black for opaque formats, transparent otherwise).
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> WarpResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| WarpError::validation("raster buffer size overflow"))?;
        if data.len() != expected {
            return Err(WarpError::validation(format!(
                "raster buffer expects {expected} bytes for {width}x{height} {format:?}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub(crate) fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * self.format.bytes_per_pixel()
    }

    #[inline]
    pub(crate) fn raw_pixel(&self, x: u32, y: u32) -> &[u8] {
        let i = self.offset(x, y);
        &self.data[i..i + self.format.bytes_per_pixel()]
    }

    #[inline]
    pub(crate) fn raw_pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let i = self.offset(x, y);
        let bpp = self.format.bytes_per_pixel();
        &mut self.data[i..i + bpp]
    }

    /// Pixel as premultiplied RGBA8; opaque formats report alpha 255.
    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let p = self.raw_pixel(x, y);
        match self.format {
            PixelFormat::Gray8 => [p[0], p[0], p[0], 255],
            PixelFormat::Rgb8 => [p[0], p[1], p[2], 255],
            PixelFormat::Rgba8Premul => [p[0], p[1], p[2], p[3]],
        }
    }

    /// Store a premultiplied pixel. Opaque formats drop alpha; gray keeps the red channel.
    pub fn set_pixel(&mut self, x: u32, y: u32, px: PremulRgba8) {
        let format = self.format;
        let p = self.raw_pixel_mut(x, y);
        match format {
            PixelFormat::Gray8 => p[0] = px[0],
            PixelFormat::Rgb8 => p.copy_from_slice(&px[..3]),
            PixelFormat::Rgba8Premul => p.copy_from_slice(&px),
        }
    }

    /// Composite `src` onto the pixel at `(x, y)`.
    pub fn blend_pixel(&mut self, x: u32, y: u32, src: PremulRgba8, mode: BlendMode) {
        let dst = self.pixel(x, y);
        self.set_pixel(x, y, blend(mode, dst, src));
    }

    /// Copy the alpha channel into a separate mask. Opaque formats yield a fully opaque mask.
    pub fn extract_alpha(&self) -> AlphaMask {
        let mut mask = AlphaMask::new(self.width, self.height);
        match self.format {
            PixelFormat::Rgba8Premul => {
                for (m, px) in mask.data.iter_mut().zip(self.data.chunks_exact(4)) {
                    *m = px[3];
                }
            }
            PixelFormat::Gray8 | PixelFormat::Rgb8 => mask.data.fill(255),
        }
        mask
    }

    /// Straight-alpha RGBA image, for encoding.
    pub fn to_rgba_image(&self) -> WarpResult<image::RgbaImage> {
        let mut out = Vec::with_capacity((self.width as usize) * (self.height as usize) * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                out.extend_from_slice(&unpremultiply_rgba8(self.pixel(x, y)));
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| WarpError::render("rgba image buffer size mismatch"))
    }
}

/// Single-channel 8-bit coverage mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, v: u8) {
        self.data[(y as usize) * (self.width as usize) + (x as usize)] = v;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/buffer.rs"]
mod tests;
