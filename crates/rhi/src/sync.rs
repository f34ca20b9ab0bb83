//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - GPU-to-GPU ordering between acquire, submit and present
//! - [`Fence`] - GPU-to-CPU completion, waited on before a frame slot is reused
//! - [`FrameSync`] - the three objects one frame-in-flight slot needs
//! - [`ImagesInFlight`] - which frame slot last submitted work for each swapchain image
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkscene_rhi::device::Device;
//! use vkscene_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkscene_rhi::RhiError> {
//! let frames = FrameSync::new_set(device, MAX_FRAMES_IN_FLIGHT)?;
//!
//! let slot = &frames[0];
//! slot.in_flight_fence().wait(u64::MAX)?;
//! slot.in_flight_fence().reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Returns the frame slot that follows `current`.
#[inline]
pub fn next_frame_slot(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

/// Tracks the frame slot whose submission last used each swapchain image.
///
/// The swapchain may hand back an image whose previous frame belongs to a
/// different slot, so that slot's fence has to be waited on before any
/// per-image resource is rewritten.
#[derive(Clone, Debug, Default)]
pub struct ImagesInFlight {
    slots: Vec<Option<usize>>,
}

impl ImagesInFlight {
    pub fn new(image_count: u32) -> Self {
        Self {
            slots: vec![None; image_count as usize],
        }
    }

    /// Forgets every owner, e.g. after the swapchain was rebuilt.
    pub fn reset(&mut self, image_count: u32) {
        self.slots.clear();
        self.slots.resize(image_count as usize, None);
    }

    /// Records `slot` as the owner of `image_index`.
    ///
    /// Returns the previous owner when it is another slot, whose fence must
    /// be waited on first.
    pub fn claim(&mut self, image_index: u32, slot: usize) -> Option<usize> {
        let owner = self.slots.get_mut(image_index as usize)?;
        let previous = owner.replace(slot);
        previous.filter(|&prev| prev != slot)
    }
}

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Create the fence already signaled so the first wait
    ///   returns immediately
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` on timeout, or any other wait failure.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects for one frame-in-flight slot.
///
/// ```text
/// 1. wait + reset in_flight_fence
/// 2. acquire (signals image_available)
/// 3. submit  (waits image_available, signals render_finished + in_flight_fence)
/// 4. present (waits render_finished)
/// ```
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates the objects for one slot. The fence starts signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if any object creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight_fence: Fence::new(device, true)?,
        })
    }

    /// Creates `count` slots.
    ///
    /// # Errors
    ///
    /// Returns the first creation error; already created slots are dropped.
    pub fn new_set(device: Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let frames = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        info!("Created synchronization for {} frame(s) in flight", count);
        Ok(frames)
    }

    /// Semaphore signaled by image acquisition.
    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    /// Semaphore signaled when the frame's commands finish.
    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    /// Fence signaled when the frame's submission completes.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        debug!("Destroying frame synchronization objects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_frames_in_flight() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_next_frame_slot_wraps() {
        assert_eq!(next_frame_slot(0), 1);
        assert_eq!(next_frame_slot(1), 0);

        let mut slot = 0;
        for _ in 0..5 {
            slot = next_frame_slot(slot);
        }
        assert_eq!(slot, 1);
    }

    #[test]
    fn test_images_in_flight_claim() {
        let mut images = ImagesInFlight::new(3);

        assert_eq!(images.claim(0, 0), None);
        assert_eq!(images.claim(1, 1), None);
        // Same slot again: its fence was already waited on.
        assert_eq!(images.claim(0, 0), None);
        // Image 1 comes back on slot 0 while slot 1 may still be running.
        assert_eq!(images.claim(1, 0), Some(1));
        assert_eq!(images.claim(1, 1), Some(0));
    }

    #[test]
    fn test_images_in_flight_reset_and_out_of_range() {
        let mut images = ImagesInFlight::new(2);
        images.claim(0, 1);
        assert_eq!(images.claim(5, 0), None);

        images.reset(4);
        assert_eq!(images.claim(0, 0), None);
        assert_eq!(images.claim(3, 1), None);
    }

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
