use std::collections::HashMap;

use crate::raster::buffer::{PixelFormat, RasterBuffer};

/// Retention limits for pooled range buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RasterPoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained buffers per (w,h,format) bucket.
    pub max_buffers_per_bucket: usize,
}

impl Default for RasterPoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 128 * 1024 * 1024,
            max_buffers_per_bucket: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    w: u32,
    h: u32,
    format: PixelFormat,
}

impl BufferKey {
    fn byte_len(self) -> usize {
        (self.w as usize)
            .saturating_mul(self.h as usize)
            .saturating_mul(self.format.bytes_per_pixel())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RasterPoolStats {
    pub retained_buffers: usize,
    pub retained_bytes: usize,
    pub alloc_buffers: u64,
    pub reused_buffers: u64,
    pub dropped_on_release: u64,
}

/// Bounded pool of range-sized pixel buffers.
///
/// Every viewport change reallocates one or two buffers per range, all of the same padded size, so
/// buffers released by the previous snapshot are handed to the next one. Borrowed buffers are
/// always zeroed.
#[derive(Debug)]
pub struct RasterPool {
    opts: RasterPoolOpts,
    stats: RasterPoolStats,
    buckets: HashMap<BufferKey, Vec<Vec<u8>>>,
}

impl RasterPool {
    pub fn new(opts: RasterPoolOpts) -> Self {
        Self {
            opts,
            stats: RasterPoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub fn stats(&self) -> RasterPoolStats {
        self.stats.clone()
    }

    pub fn borrow(&mut self, w: u32, h: u32, format: PixelFormat) -> RasterBuffer {
        let key = BufferKey { w, h, format };
        if let Some(mut data) = self.buckets.get_mut(&key).and_then(Vec::pop) {
            self.stats.retained_buffers = self.stats.retained_buffers.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
            self.stats.reused_buffers = self.stats.reused_buffers.saturating_add(1);
            data.fill(0);
            if let Ok(buf) = RasterBuffer::from_raw(w, h, format, data) {
                return buf;
            }
        }

        self.stats.alloc_buffers = self.stats.alloc_buffers.saturating_add(1);
        RasterBuffer::new(w, h, format)
    }

    pub fn release(&mut self, buf: RasterBuffer) {
        let key = BufferKey {
            w: buf.width(),
            h: buf.height(),
            format: buf.format(),
        };
        let bytes = key.byte_len();
        if self.opts.max_pool_bytes == 0
            || self.opts.max_buffers_per_bucket == 0
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.opts.max_buffers_per_bucket {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        bucket.push(buf.into_raw());
        self.stats.retained_buffers = self.stats.retained_buffers.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/pool.rs"]
mod tests;
