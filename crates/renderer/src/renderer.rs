//! Main renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object and all scene state. It is an
//! explicit context struct driven by the application once per frame.

use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, info, warn};

use vkscene_core::RendererConfig;
use vkscene_platform::{Surface, Window};
use vkscene_resources::{AtlasManifest, AtlasPacker, MeshData, Model, PackOutcome};
use vkscene_rhi::buffer::{Buffer, BufferUsage};
use vkscene_rhi::bundle::{
    DescriptorKind, DescriptorResource, DescriptorSchemaEntry, PipelineBundle,
};
use vkscene_rhi::command::{CommandBuffer, CommandPool};
use vkscene_rhi::device::Device;
use vkscene_rhi::instance::Instance;
use vkscene_rhi::physical_device::select_physical_device;
use vkscene_rhi::sampler::Sampler;
use vkscene_rhi::shader::ShaderPair;
use vkscene_rhi::sync::{FrameSync, ImagesInFlight, MAX_FRAMES_IN_FLIGHT, next_frame_slot};
use vkscene_rhi::texture::Texture;
use vkscene_rhi::{RhiError, RhiResult};
use vkscene_scene::{
    Camera, InstanceStore, LightData, LightList, MAX_RENDER_INSTANCES, Projection,
};

use crate::error::RenderResult;
use crate::targets::{SwapchainTargets, clear_values, full_scissor, full_viewport};
use crate::textures::TextureStore;
use crate::ubo::{LightCount, PushConstants, UniformBufferObject};

/// Binding 0: per-image camera uniforms.
pub const UNIFORM_BUFFER: &str = "Uniform Buffer";
/// Binding 1: the texture atlas.
pub const TEXTURE: &str = "Texture";
/// Binding 2: instance transforms.
pub const STORAGE_BUFFER: &str = "Storage Buffer";
/// Binding 3: point lights.
pub const LIGHT_BUFFER: &str = "Light Buffer";

/// Push constant slot of [`PushConstants`].
const VERTEX_PUSH_SLOT: usize = 0;
/// Push constant slot of [`LightCount`].
const FRAGMENT_PUSH_SLOT: usize = 1;

const TRANSFORM_BUFFER_SIZE: usize = std::mem::size_of::<Mat4>() * MAX_RENDER_INSTANCES;
const LIGHT_BUFFER_SIZE: usize = std::mem::size_of::<LightData>() * MAX_RENDER_INSTANCES;

/// The descriptor bindings of the scene pipeline, in binding order.
pub fn descriptor_schema() -> Vec<DescriptorSchemaEntry> {
    let vertex_fragment = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    vec![
        DescriptorSchemaEntry::new(
            UNIFORM_BUFFER,
            DescriptorKind::UniformBuffer,
            vertex_fragment,
            UniformBufferObject::SIZE as vk::DeviceSize,
        ),
        DescriptorSchemaEntry::new(
            TEXTURE,
            DescriptorKind::CombinedImageSampler,
            vk::ShaderStageFlags::FRAGMENT,
            0,
        ),
        DescriptorSchemaEntry::new(
            STORAGE_BUFFER,
            DescriptorKind::StorageBuffer,
            vk::ShaderStageFlags::VERTEX,
            TRANSFORM_BUFFER_SIZE as vk::DeviceSize,
        ),
        DescriptorSchemaEntry::new(
            LIGHT_BUFFER,
            DescriptorKind::StorageBuffer,
            vk::ShaderStageFlags::FRAGMENT,
            LIGHT_BUFFER_SIZE as vk::DeviceSize,
        ),
    ]
}

/// Push constant ranges: model parameters for the vertex stage, then the
/// light count for the fragment stage.
pub fn push_constant_layout() -> [(u32, vk::ShaderStageFlags); 2] {
    [
        (PushConstants::SIZE as u32, vk::ShaderStageFlags::VERTEX),
        (
            std::mem::size_of::<LightCount>() as u32,
            vk::ShaderStageFlags::FRAGMENT,
        ),
    ]
}

/// Resources rebuilt whenever the swapchain is.
///
/// Field order is drop order.
struct SwapchainState {
    bundle: PipelineBundle,
    uniform_buffers: Vec<Buffer>,
    targets: SwapchainTargets,
}

/// Long-lived resources the pipeline bundle binds by name.
struct BoundResources<'a> {
    storage_buffer: &'a Buffer,
    light_buffer: &'a Buffer,
    sampler: &'a Sampler,
    atlas: &'a Texture,
}

/// Main renderer that manages all Vulkan resources.
///
/// Fields are declared in destruction order: swapchain-sized state, then
/// synchronization and command objects, then buffers and textures, then the
/// device, the surface and finally the instance.
pub struct Renderer {
    swapchain_state: Option<SwapchainState>,
    frame_sync: Vec<FrameSync>,
    images_in_flight: ImagesInFlight,
    command_buffers: Vec<vk::CommandBuffer>,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    storage_buffer: Buffer,
    light_buffer: Buffer,
    textures: TextureStore,
    atlas_texture: usize,
    sampler: Sampler,
    shaders: ShaderPair,
    command_pool: CommandPool,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,

    models: Vec<Model>,
    instances: InstanceStore,
    lights: LightList,
    camera: Camera,

    /// Frame-in-flight slot (0 to MAX_FRAMES_IN_FLIGHT - 1)
    current_frame: usize,
    framebuffer_resized: bool,
    width: u32,
    height: u32,
}

impl Renderer {
    /// Creates the renderer for `window`.
    ///
    /// Packs the texture atlas if its sources changed, loads every model
    /// listed in `config`, and builds the swapchain and pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created or any asset
    /// fails to load.
    pub fn new(window: &Window, config: &RendererConfig) -> RenderResult<Self> {
        let width = window.width();
        let height = window.height();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let instance = Instance::new(config.validation, Some(window.raw_display_handle()?))?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family()?)?;
        let shaders = ShaderPair::load(device.clone(), &config.paths.shaders)?;

        let packer = AtlasPacker::new(config.paths.textures.clone());
        match packer.pack()? {
            PackOutcome::Unchanged => debug!("Reusing existing texture atlas"),
            PackOutcome::Packed(entries) => {
                info!("Texture atlas repacked ({} images)", entries.len())
            }
        }
        let manifest = AtlasManifest::load(&packer.manifest_path())?;

        let mut mesh = MeshData::new();
        for model in &config.models {
            mesh.load_obj(
                &config.model_path(model),
                Vec4::from_array(model.tint),
                model.scale,
                &manifest,
            )?;
        }
        info!(
            "Loaded {} model(s): {} vertices, {} indices",
            mesh.model_count(),
            mesh.vertices.len(),
            mesh.indices.len()
        );

        let vertex_buffer = Buffer::new_device_local_with_data(
            device.clone(),
            &command_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = Buffer::new_device_local_with_data(
            device.clone(),
            &command_pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        let storage_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Storage,
            TRANSFORM_BUFFER_SIZE as vk::DeviceSize,
        )?;
        let light_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Storage,
            LIGHT_BUFFER_SIZE as vk::DeviceSize,
        )?;

        let mut textures = TextureStore::new();
        let atlas_texture = textures.load(device.clone(), &command_pool, &packer.atlas_path())?;
        let mip_levels = textures
            .get(atlas_texture)
            .map_or(1, Texture::mip_levels);
        let sampler = Sampler::new_linear_repeat(device.clone(), mip_levels)?;

        let swapchain_state = {
            let atlas = textures
                .get(atlas_texture)
                .ok_or_else(|| RhiError::InvalidHandle("atlas texture missing".to_string()))?;
            build_swapchain_state(
                &instance,
                &device,
                &surface,
                &command_pool,
                &shaders,
                &BoundResources {
                    storage_buffer: &storage_buffer,
                    light_buffer: &light_buffer,
                    sampler: &sampler,
                    atlas,
                },
                width,
                height,
            )?
        };

        let frame_sync = FrameSync::new_set(device.clone(), MAX_FRAMES_IN_FLIGHT)?;
        let images_in_flight = ImagesInFlight::new(swapchain_state.targets.image_count());
        let command_buffers =
            command_pool.allocate_command_buffers(swapchain_state.targets.image_count())?;

        let camera = Camera::new(
            config.camera.velocity,
            Projection {
                fov_y: config.fov_radians(),
                near: config.camera.near,
                far: config.camera.far,
            },
        );

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight",
            swapchain_state.targets.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            swapchain_state: Some(swapchain_state),
            frame_sync,
            images_in_flight,
            command_buffers,
            vertex_buffer,
            index_buffer,
            storage_buffer,
            light_buffer,
            textures,
            atlas_texture,
            sampler,
            shaders,
            command_pool,
            device,
            surface,
            instance,
            instances: InstanceStore::new(mesh.model_count()),
            models: mesh.models,
            lights: LightList::new(),
            camera,
            current_frame: 0,
            framebuffer_resized: false,
            width,
            height,
        })
    }

    // =========================================================================
    // Scene
    // =========================================================================

    /// Places an instance of `model_index` at `pos`.
    pub fn add_render_instance(&mut self, pos: Vec3, model_index: usize) {
        self.instances.add_render_instance(pos, model_index);
    }

    pub fn reset_render_instances(&mut self) {
        self.instances.reset_render_instances();
    }

    pub fn add_light(&mut self, pos: Vec3, color: Vec3, intensity: f32) {
        self.lights.add_light(pos, color, intensity);
    }

    pub fn reset_lights(&mut self) {
        self.lights.reset_lights();
    }

    /// Number of loaded models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    // =========================================================================
    // Camera
    // =========================================================================

    /// Moves the camera relative to its orientation. See
    /// [`Camera::change_position`].
    pub fn change_camera_pos(&mut self, x: f32, y: f32, z: f32) {
        self.camera.change_position(x, y, z);
    }

    pub fn set_camera_pos(&mut self, pos: Vec3) {
        self.camera.position = pos;
    }

    pub fn camera_pos(&self) -> Vec3 {
        self.camera.position
    }

    pub fn set_camera_angle(&mut self, angle: Vec3) {
        self.camera.angle = angle;
    }

    pub fn camera_angle(&self) -> Vec3 {
        self.camera.angle
    }

    pub fn proper_camera_velocity(&self, speed: f32) -> f32 {
        self.camera.proper_velocity(speed)
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Notifies the renderer that the window has been resized.
    ///
    /// The swapchain is rebuilt after the next present.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        if width != self.width || height != self.height {
            debug!(
                "Resize notified: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
        }
        self.width = width;
        self.height = height;
        self.framebuffer_resized = true;
    }

    /// Blocks until the GPU has finished all submitted work.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost.
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    /// Records, submits and presents one frame.
    ///
    /// An out-of-date swapchain is rebuilt and is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for any other Vulkan failure.
    pub fn draw_frame(&mut self) -> RenderResult<()> {
        if self.swapchain_state.is_none() {
            // The last rebuild was skipped while minimized.
            self.recreate_swapchain()?;
            if self.swapchain_state.is_none() {
                return Ok(());
            }
        }

        let sync = &self.frame_sync[self.current_frame];
        let image_available = sync.image_available();
        let render_finished = sync.render_finished();
        sync.in_flight_fence().wait(u64::MAX)?;

        let acquired = self
            .state()?
            .targets
            .swapchain()
            .acquire_next_image(image_available);
        let image_index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on acquire, recreating");
                self.recreate_swapchain()?;
                return Ok(());
            }
            Err(e) => return Err(RhiError::VulkanError(e).into()),
        };

        // The image's uniform buffer and command buffer may still be in use
        // by the last frame that rendered to it.
        if let Some(previous) = self.images_in_flight.claim(image_index, self.current_frame) {
            self.frame_sync[previous].in_flight_fence().wait(u64::MAX)?;
        }

        // Only reset once work is guaranteed to be submitted.
        let sync = &self.frame_sync[self.current_frame];
        sync.in_flight_fence().reset()?;
        let fence = sync.in_flight_fence().handle();

        self.update_uniform_buffer(image_index)?;
        self.update_storage_buffer()?;

        let command_buffer = self.record_command_buffer(image_index)?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.submit_graphics(&[submit_info], fence)?;
        }

        let presented = self.state()?.targets.swapchain().present(
            self.device.present_queue(),
            image_index,
            render_finished,
        );
        let needs_rebuild = match presented {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(RhiError::VulkanError(e).into()),
        };

        if needs_rebuild || self.framebuffer_resized {
            debug!("Swapchain suboptimal or resized, recreating");
            self.framebuffer_resized = false;
            self.recreate_swapchain()?;
        }

        self.current_frame = next_frame_slot(self.current_frame);
        Ok(())
    }

    /// Re-uploads every active instance transform and every light.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BufferOverflow`] if either payload exceeds its
    /// buffer, or any upload error.
    pub fn update_storage_buffer(&self) -> RenderResult<()> {
        let transforms = self.instances.flatten();
        self.storage_buffer
            .upload_staged(&self.command_pool, bytemuck::cast_slice(&transforms))?;
        self.light_buffer
            .upload_staged(&self.command_pool, bytemuck::cast_slice(self.lights.as_slice()))?;
        Ok(())
    }

    fn state(&self) -> RhiResult<&SwapchainState> {
        self.swapchain_state
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("swapchain not built".to_string()))
    }

    fn update_uniform_buffer(&self, image_index: u32) -> RenderResult<()> {
        let state = self.state()?;
        let extent = state.targets.extent();
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };

        let ubo = UniformBufferObject::from_camera(&self.camera, aspect);
        let buffer = state.uniform_buffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no uniform buffer for image {image_index}"))
        })?;
        buffer.write_data(0, bytemuck::bytes_of(&ubo))?;
        Ok(())
    }

    /// Re-records the command buffer for `image_index` and returns it.
    fn record_command_buffer(&self, image_index: u32) -> RenderResult<vk::CommandBuffer> {
        let state = self.state()?;
        let missing = |what: &str| RhiError::InvalidHandle(format!("no {what} for image {image_index}"));
        let handle = *self
            .command_buffers
            .get(image_index as usize)
            .ok_or_else(|| missing("command buffer"))?;
        let framebuffer = state
            .targets
            .framebuffer(image_index)
            .ok_or_else(|| missing("framebuffer"))?;
        let descriptor_set = state
            .bundle
            .descriptor_set(image_index)
            .ok_or_else(|| missing("descriptor set"))?;

        let extent = state.targets.extent();
        let cmd = CommandBuffer::from_handle(self.device.clone(), handle);
        cmd.reset()?;
        cmd.begin_reusable()?;

        let clear_values = clear_values();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(state.targets.render_pass().handle())
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);
        cmd.begin_render_pass(&begin_info);

        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));

        cmd.bind_graphics_pipeline(state.bundle.pipeline());
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.bind_descriptor_sets(state.bundle.pipeline_layout(), 0, &[descriptor_set]);

        let light_count = self.lights.len() as LightCount;
        let draws = self.models.iter().zip(self.instances.draw_ranges());
        for (model, (first_instance, count)) in draws {
            if count == 0 {
                continue;
            }
            let push = PushConstants::for_model(first_instance, model);
            state
                .bundle
                .push_constants(&cmd, VERTEX_PUSH_SLOT, bytemuck::bytes_of(&push))?;
            state
                .bundle
                .push_constants(&cmd, FRAGMENT_PUSH_SLOT, bytemuck::bytes_of(&light_count))?;
            cmd.draw_indexed(model.index_count, count, model.index_offset, 0, 0);
        }

        cmd.end_render_pass();
        cmd.end()?;
        Ok(handle)
    }

    /// Tears down and rebuilds every swapchain-sized object.
    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            debug!("Window minimized, deferring swapchain rebuild");
            return Ok(());
        }

        self.device.wait_idle()?;
        let old_image_count = self
            .swapchain_state
            .as_ref()
            .map(|state| state.targets.image_count());

        // The surface can only back one swapchain at a time.
        self.swapchain_state = None;

        let atlas = self
            .textures
            .get(self.atlas_texture)
            .ok_or_else(|| RhiError::InvalidHandle("atlas texture missing".to_string()))?;
        let state = build_swapchain_state(
            &self.instance,
            &self.device,
            &self.surface,
            &self.command_pool,
            &self.shaders,
            &BoundResources {
                storage_buffer: &self.storage_buffer,
                light_buffer: &self.light_buffer,
                sampler: &self.sampler,
                atlas,
            },
            self.width,
            self.height,
        )?;

        let image_count = state.targets.image_count();
        self.images_in_flight.reset(image_count);
        if old_image_count != Some(image_count) {
            debug!(
                "Swapchain image count changed ({:?} -> {}), reallocating command buffers",
                old_image_count, image_count
            );
            self.command_pool.free_command_buffers(&self.command_buffers);
            self.command_buffers = self.command_pool.allocate_command_buffers(image_count)?;
        }

        self.swapchain_state = Some(state);
        info!("Swapchain recreated: {}x{}", self.width, self.height);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Destroying renderer...");

        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during drop: {}", e);
        }
        self.command_pool.free_command_buffers(&self.command_buffers);
    }
}

/// Builds the targets, per-image uniform buffers and pipeline bundle, and
/// writes every descriptor set.
#[allow(clippy::too_many_arguments)]
fn build_swapchain_state(
    instance: &Instance,
    device: &Arc<Device>,
    surface: &Surface,
    pool: &CommandPool,
    shaders: &ShaderPair,
    resources: &BoundResources<'_>,
    width: u32,
    height: u32,
) -> RhiResult<SwapchainState> {
    let targets = SwapchainTargets::new(
        instance,
        device.clone(),
        surface.handle(),
        pool,
        width,
        height,
    )?;
    let image_count = targets.image_count();

    let uniform_buffers = (0..image_count)
        .map(|_| {
            Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                UniformBufferObject::SIZE as vk::DeviceSize,
            )
        })
        .collect::<RhiResult<Vec<_>>>()?;

    let mut bundle = PipelineBundle::new(
        device.clone(),
        targets.render_pass(),
        &descriptor_schema(),
        &push_constant_layout(),
        shaders,
        image_count,
    )?;

    bundle.update_descriptor_resource(
        UNIFORM_BUFFER,
        DescriptorResource::UniformBuffers(uniform_buffers.iter().map(Buffer::handle).collect()),
    )?;
    bundle.update_descriptor_resource(
        TEXTURE,
        DescriptorResource::Texture {
            sampler: resources.sampler.handle(),
            view: resources.atlas.view(),
        },
    )?;
    bundle.update_descriptor_resource(
        STORAGE_BUFFER,
        DescriptorResource::StorageBuffer(resources.storage_buffer.handle()),
    )?;
    bundle.update_descriptor_resource(
        LIGHT_BUFFER,
        DescriptorResource::StorageBuffer(resources.light_buffer.handle()),
    )?;
    bundle.update_all_descriptor_sets()?;

    Ok(SwapchainState {
        bundle,
        uniform_buffers,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkscene_rhi::bundle::{check_push_constant, push_constant_ranges};

    #[test]
    fn test_descriptor_schema_order() {
        let schema = descriptor_schema();
        let names: Vec<&str> = schema.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(
            names,
            [UNIFORM_BUFFER, TEXTURE, STORAGE_BUFFER, LIGHT_BUFFER]
        );
        assert_eq!(schema[1].kind, DescriptorKind::CombinedImageSampler);
        assert_eq!(schema[2].size, 64 * 50_000);
        assert_eq!(schema[3].size, 32 * 50_000);
    }

    #[test]
    fn test_push_constant_layout() {
        let ranges = push_constant_ranges(&push_constant_layout());
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].offset, ranges[0].size), (0, 40));
        assert_eq!((ranges[1].offset, ranges[1].size), (40, 4));
        assert_eq!(ranges[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);

        let push = PushConstants::default();
        assert!(check_push_constant(&ranges, VERTEX_PUSH_SLOT, bytemuck::bytes_of(&push)).is_ok());
        let count: LightCount = 3;
        assert!(
            check_push_constant(&ranges, FRAGMENT_PUSH_SLOT, bytemuck::bytes_of(&count)).is_ok()
        );
    }
}
