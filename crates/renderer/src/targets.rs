//! Swapchain-sized render targets.
//!
//! The swapchain, render pass, multisampled color target, depth target and
//! framebuffers all depend on the surface extent and are rebuilt together.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use vkscene_rhi::RhiResult;
use vkscene_rhi::command::CommandPool;
use vkscene_rhi::device::Device;
use vkscene_rhi::image::{Image, ImageDesc};
use vkscene_rhi::instance::Instance;
use vkscene_rhi::render_pass::{Framebuffer, RenderPass};
use vkscene_rhi::swapchain::Swapchain;

/// Everything that has to be recreated when the swapchain goes out of date.
///
/// Fields are declared in drop order: framebuffers reference the attachment
/// views and the render pass, and the resolve views belong to the swapchain.
pub struct SwapchainTargets {
    framebuffers: Vec<Framebuffer>,
    _color: Image,
    _depth: Image,
    render_pass: RenderPass,
    swapchain: Swapchain,
}

impl SwapchainTargets {
    /// Builds the swapchain and every target sized to it.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created, or no depth
    /// format is supported.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        pool: &CommandPool,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(instance, device.clone(), surface, width, height)?;
        let extent = swapchain.extent();
        let samples = device.msaa_samples();
        let depth_format = device.depth_format()?;

        let render_pass =
            RenderPass::new(device.clone(), swapchain.format(), depth_format, samples)?;

        let color = Image::new(
            device.clone(),
            &ImageDesc::attachment(
                extent.width,
                extent.height,
                swapchain.format(),
                samples,
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            ),
        )?;
        color.transition_layout(
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;

        let depth = Image::new(
            device.clone(),
            &ImageDesc::attachment(
                extent.width,
                extent.height,
                depth_format,
                samples,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            ),
        )?;
        depth.transition_layout(
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    &render_pass,
                    &[color.view(), depth.view(), view],
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Swapchain targets built: {}x{}, {} framebuffer(s), {:?}",
            extent.width,
            extent.height,
            framebuffers.len(),
            samples
        );

        Ok(Self {
            framebuffers,
            _color: color,
            _depth: depth,
            render_pass,
            swapchain,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    /// Framebuffer presenting into swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
    }
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Clear values in attachment order: black opaque color, far depth.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        assert_eq!(viewport.width, 1920.0);
        assert_eq!(viewport.height, 1080.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_full_scissor() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values();
        unsafe {
            assert_eq!(values[0].color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
        }
    }
}
