//! Sampled textures with a full mip chain.
//!
//! A [`Texture`] is uploaded once from tightly packed RGBA8 pixels:
//! staging buffer, copy into mip 0, then every further level is blitted
//! from the one above it. All levels end in `SHADER_READ_ONLY_OPTIMAL`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, submit_one_shot};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::physical_device::tiling_supports;

/// Texel format of every uploaded texture.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Number of mip levels for a `width x height` image, `floor(log2(max)) + 1`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height);
    (u32::BITS - largest.leading_zeros()).max(1)
}

/// Dimensions of every mip level, largest first.
///
/// Each level halves the previous one (rounding down) and never drops
/// below 1.
pub fn mip_extents(width: u32, height: u32) -> Vec<(u32, u32)> {
    let levels = mip_level_count(width, height);
    let mut extents = Vec::with_capacity(levels as usize);
    let (mut w, mut h) = (width.max(1), height.max(1));
    for _ in 0..levels {
        extents.push((w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    extents
}

/// Fails unless `format` can be linearly filtered as an optimal-tiled
/// blit source.
fn ensure_linear_blit(device: &Device, format: vk::Format) -> RhiResult<()> {
    let props = device.format_properties(format);
    if !tiling_supports(
        &props,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
    ) {
        return Err(RhiError::UnsupportedFormat(format!(
            "{:?} does not support linear blitting",
            format
        )));
    }
    Ok(())
}

fn mip_barrier(
    image: vk::Image,
    level: u32,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .image(image)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(level)
                .level_count(1)
                .layer_count(1),
        )
        .old_layout(old)
        .new_layout(new)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

fn mip_layers(level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(level)
        .layer_count(1)
}

/// Records the blit chain for an image whose levels are all in
/// `TRANSFER_DST_OPTIMAL` and whose level 0 holds the source texels.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] before recording anything if the
/// format lacks `SAMPLED_IMAGE_FILTER_LINEAR` under optimal tiling.
pub fn generate_mipmaps(cmd: &CommandBuffer, image: &Image) -> RhiResult<()> {
    ensure_linear_blit(image.device(), image.format())?;

    let handle = image.handle();
    let extent = image.extent();
    let extents = mip_extents(extent.width, extent.height);
    let levels = image.mip_levels().min(extents.len() as u32);

    for level in 1..levels {
        let (src_w, src_h) = extents[level as usize - 1];
        let (dst_w, dst_h) = extents[level as usize];

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            &[mip_barrier(
                handle,
                level - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            )],
        );

        let blit = vk::ImageBlit::default()
            .src_subresource(mip_layers(level - 1))
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src_w as i32,
                    y: src_h as i32,
                    z: 1,
                },
            ])
            .dst_subresource(mip_layers(level))
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst_w as i32,
                    y: dst_h as i32,
                    z: 1,
                },
            ]);

        cmd.blit_image(
            handle,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            handle,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::LINEAR,
        );

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[mip_barrier(
                handle,
                level - 1,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            )],
        );
    }

    // The last level was only ever written.
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[mip_barrier(
            handle,
            levels - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        )],
    );

    Ok(())
}

/// Mipmapped, shader-readable RGBA8 texture.
pub struct Texture {
    image: Image,
    path: PathBuf,
}

impl Texture {
    /// Uploads `pixels` (row-major RGBA8, `width * height * 4` bytes).
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel count does not match, the format cannot
    /// be blitted linearly, or any GPU step fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
        path: &Path,
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture {} has {} bytes, expected {} for {}x{} RGBA8",
                path.display(),
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        ensure_linear_blit(&device, TEXTURE_FORMAT)?;

        let mip_levels = mip_level_count(width, height);
        let image = Image::new(
            device.clone(),
            &ImageDesc {
                width,
                height,
                mip_levels,
                samples: vk::SampleCountFlags::TYPE_1,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        let staging = Buffer::new_with_data(device, BufferUsage::Staging, pixels)?;

        submit_one_shot(pool, |cmd| {
            image.record_transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            image.record_copy_from_buffer(cmd, staging.handle());
            generate_mipmaps(cmd, &image)
        })?;

        info!(
            "Texture loaded: {} ({}x{}, {} mips)",
            path.display(),
            width,
            height,
            mip_levels
        );

        Ok(Self {
            image,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.extent().width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.extent().height
    }

    /// Source file the texture was decoded from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(4096, 4096), 13);
        assert_eq!(mip_level_count(512, 256), 10);
        assert_eq!(mip_level_count(300, 20), 9);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_mip_extents_halve_to_one() {
        let extents = mip_extents(300, 20);
        assert_eq!(extents.len() as u32, mip_level_count(300, 20));
        assert_eq!(extents[0], (300, 20));
        assert_eq!(extents[1], (150, 10));
        assert_eq!(extents[4], (18, 1));
        assert_eq!(*extents.last().unwrap(), (1, 1));

        for pair in extents.windows(2) {
            let (w, h) = pair[0];
            assert_eq!(pair[1], ((w / 2).max(1), (h / 2).max(1)));
        }
    }

    #[test]
    fn test_mip_extents_square() {
        let extents = mip_extents(8, 8);
        assert_eq!(extents, vec![(8, 8), (4, 4), (2, 2), (1, 1)]);
    }
}
