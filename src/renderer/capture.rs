//! Texture readback into CPU frames
//!
//! Rows in a copy buffer are padded to `COPY_BYTES_PER_ROW_ALIGNMENT`; the
//! padding is stripped while copying into the destination [`Frame`].

use log::debug;
use std::sync::mpsc;
use std::sync::Arc;
use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Device, Extent3d, ImageCopyBuffer,
    ImageDataLayout, Queue, Texture,
};

use crate::error::{MosaicError, MosaicResult};
use crate::frame::Frame;

const BYTES_PER_PIXEL: u32 = 4;

/// Row pitch of a readback buffer for `width` RGBA8 pixels
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Reads RGBA8 render targets back into frames through a reused buffer
pub struct FrameCapture {
    device: Arc<Device>,
    queue: Arc<Queue>,
    buffer: Option<(Buffer, u32, u32)>,
}

impl FrameCapture {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        Self {
            device,
            queue,
            buffer: None,
        }
    }

    fn ensure_buffer(&mut self, width: u32, height: u32) {
        let stale = !matches!(&self.buffer, Some((_, w, h)) if *w == width && *h == height);
        if stale {
            debug!("Allocating readback buffer for {}x{}", width, height);
            let buffer = self.device.create_buffer(&BufferDescriptor {
                label: Some("Frame Capture Buffer"),
                size: (padded_bytes_per_row(width) * height) as u64,
                usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            self.buffer = Some((buffer, width, height));
        }
    }

    /// Copy `texture` into `target`, blocking until the GPU is done.
    ///
    /// `target` must already have the texture's size.
    pub fn capture_into(&mut self, texture: &Texture, target: &mut Frame) -> MosaicResult<()> {
        let (width, height) = target.size();
        let padded = padded_bytes_per_row(width);
        let unpadded = width * BYTES_PER_PIXEL;

        self.ensure_buffer(width, height);
        let Some((buffer, _, _)) = &self.buffer else {
            return Err(MosaicError::Readback {
                target: "output".to_string(),
                message: "no readback buffer".to_string(),
            });
        };

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Frame Capture Encoder"),
        });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            ImageCopyBuffer {
                buffer,
                layout: ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        let mapped = rx.recv().map_err(|e| MosaicError::Readback {
            target: "output".to_string(),
            message: e.to_string(),
        })?;
        mapped.map_err(|e| MosaicError::Readback {
            target: "output".to_string(),
            message: e.to_string(),
        })?;

        {
            let data = slice.get_mapped_range();
            let pixels = target.pixels_mut();
            for row in 0..height {
                let start = (row * padded) as usize;
                let src = &data[start..start + unpadded as usize];
                let dst_start = (row * width) as usize;
                let dst = &mut pixels[dst_start..dst_start + width as usize];
                dst.copy_from_slice(bytemuck::cast_slice(src));
            }
        }
        buffer.unmap();
        Ok(())
    }
}
