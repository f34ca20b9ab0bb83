//! Pipeline bundle: one graphics pipeline plus everything it binds.
//!
//! A bundle is built from a declared descriptor schema. The binding index
//! of each entry is its position in the schema, and one descriptor set is
//! allocated per swapchain image. Resources are attached by name with
//! [`PipelineBundle::update_descriptor_resource`] and written into a set
//! with [`PipelineBundle::update_descriptor_set`].
//! The name-to-resource bookkeeping lives in [`DescriptorCache`], which
//! needs no device.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkscene_rhi::bundle::{DescriptorKind, DescriptorResource, DescriptorSchemaEntry, PipelineBundle};
//! use vkscene_rhi::device::Device;
//! use vkscene_rhi::render_pass::RenderPass;
//! use vkscene_rhi::shader::ShaderPair;
//!
//! # fn example(device: Arc<Device>, render_pass: &RenderPass, shaders: &ShaderPair, ubos: Vec<vk::Buffer>) -> Result<(), vkscene_rhi::RhiError> {
//! let schema = [DescriptorSchemaEntry::new(
//!     "Uniform Buffer",
//!     DescriptorKind::UniformBuffer,
//!     vk::ShaderStageFlags::VERTEX,
//!     128,
//! )];
//! let mut bundle = PipelineBundle::new(
//!     device,
//!     render_pass,
//!     &schema,
//!     &[(4, vk::ShaderStageFlags::VERTEX)],
//!     shaders,
//!     ubos.len() as u32,
//! )?;
//!
//! bundle.update_descriptor_resource("Uniform Buffer", DescriptorResource::UniformBuffers(ubos))?;
//! bundle.update_descriptor_set(0)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::descriptor::{
    DescriptorPool, DescriptorSetLayout, sampled_image_info, update_descriptor_sets,
    whole_buffer_info,
};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use crate::render_pass::RenderPass;
use crate::shader::ShaderPair;
use crate::vertex::Vertex;

/// Kind of resource a schema entry binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
}

impl DescriptorKind {
    /// Converts to the Vulkan descriptor type.
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// One declared binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorSchemaEntry {
    pub name: String,
    pub kind: DescriptorKind,
    pub stages: vk::ShaderStageFlags,
    /// Byte size of the bound resource. Informational for samplers.
    pub size: vk::DeviceSize,
    pub count: u32,
}

impl DescriptorSchemaEntry {
    /// Entry with a descriptor count of 1.
    pub fn new(
        name: impl Into<String>,
        kind: DescriptorKind,
        stages: vk::ShaderStageFlags,
        size: vk::DeviceSize,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            stages,
            size,
            count: 1,
        }
    }
}

/// A resource attached to a binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorResource {
    /// One buffer per swapchain image, indexed by image.
    UniformBuffers(Vec<vk::Buffer>),
    StorageBuffer(vk::Buffer),
    Texture {
        sampler: vk::Sampler,
        view: vk::ImageView,
    },
}

impl DescriptorResource {
    fn kind(&self) -> DescriptorKind {
        match self {
            DescriptorResource::UniformBuffers(_) => DescriptorKind::UniformBuffer,
            DescriptorResource::StorageBuffer(_) => DescriptorKind::StorageBuffer,
            DescriptorResource::Texture { .. } => DescriptorKind::CombinedImageSampler,
        }
    }
}

/// Layout bindings in schema order.
pub fn layout_bindings(schema: &[DescriptorSchemaEntry]) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    schema
        .iter()
        .enumerate()
        .map(|(binding, entry)| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding as u32)
                .descriptor_type(entry.kind.to_vk())
                .descriptor_count(entry.count)
                .stage_flags(entry.stages)
        })
        .collect()
}

/// One pool size per entry, scaled by the number of sets.
pub fn pool_sizes(schema: &[DescriptorSchemaEntry], image_count: u32) -> Vec<vk::DescriptorPoolSize> {
    schema
        .iter()
        .map(|entry| {
            vk::DescriptorPoolSize::default()
                .ty(entry.kind.to_vk())
                .descriptor_count(entry.count * image_count)
        })
        .collect()
}

/// Packs `(size, stages)` pairs into ranges with running offsets.
pub fn push_constant_ranges(
    ranges: &[(u32, vk::ShaderStageFlags)],
) -> Vec<vk::PushConstantRange> {
    let mut offset = 0;
    ranges
        .iter()
        .map(|&(size, stages)| {
            let range = vk::PushConstantRange::default()
                .stage_flags(stages)
                .offset(offset)
                .size(size);
            offset += size;
            range
        })
        .collect()
}

/// Checks a push constant payload against its declared range.
pub fn check_push_constant(
    ranges: &[vk::PushConstantRange],
    slot: usize,
    bytes: &[u8],
) -> RhiResult<vk::PushConstantRange> {
    let range = ranges.get(slot).copied().ok_or(RhiError::PushConstantSize {
        index: slot,
        expected: 0,
        actual: bytes.len(),
    })?;

    if range.size as usize != bytes.len() {
        return Err(RhiError::PushConstantSize {
            index: slot,
            expected: range.size,
            actual: bytes.len(),
        });
    }

    Ok(range)
}

/// What one binding resolves to for a particular swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedBinding {
    Buffer(vk::Buffer),
    Image {
        sampler: vk::Sampler,
        view: vk::ImageView,
    },
}

/// Name-keyed resources attached to a schema, one slot per binding.
#[derive(Clone, Debug)]
pub struct DescriptorCache {
    schema: Vec<DescriptorSchemaEntry>,
    resources: Vec<Option<DescriptorResource>>,
}

impl DescriptorCache {
    pub fn new(schema: &[DescriptorSchemaEntry]) -> Self {
        Self {
            schema: schema.to_vec(),
            resources: vec![None; schema.len()],
        }
    }

    /// Stores `resource` for the binding called `name` and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnknownDescriptor`] if `name` is not declared or
    /// the resource kind does not match the binding.
    pub fn set(&mut self, name: &str, resource: DescriptorResource) -> RhiResult<usize> {
        let binding = self
            .schema
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| RhiError::UnknownDescriptor(name.to_string()))?;

        let expected = self.schema[binding].kind;
        if resource.kind() != expected {
            return Err(RhiError::UnknownDescriptor(format!(
                "{name}: expected {expected:?}, got {:?}",
                resource.kind()
            )));
        }

        self.resources[binding] = Some(resource);
        Ok(binding)
    }

    /// Resolves every binding, in schema order, for `image_index`.
    ///
    /// Uniform bindings pick the buffer at `image_index`. Storage and
    /// sampler bindings resolve to the same resource for every image.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorNotBound`] if a binding has no resource,
    /// or its per-image buffer list is shorter than `image_index + 1`.
    pub fn resolve(&self, image_index: u32) -> RhiResult<Vec<ResolvedBinding>> {
        self.schema
            .iter()
            .zip(&self.resources)
            .map(|(entry, resource)| {
                let resource = resource
                    .as_ref()
                    .ok_or_else(|| RhiError::DescriptorNotBound(entry.name.clone()))?;

                Ok(match resource {
                    DescriptorResource::UniformBuffers(buffers) => {
                        let buffer =
                            buffers.get(image_index as usize).copied().ok_or_else(|| {
                                RhiError::DescriptorNotBound(format!(
                                    "{} (image {image_index})",
                                    entry.name
                                ))
                            })?;
                        ResolvedBinding::Buffer(buffer)
                    }
                    DescriptorResource::StorageBuffer(buffer) => ResolvedBinding::Buffer(*buffer),
                    DescriptorResource::Texture { sampler, view } => ResolvedBinding::Image {
                        sampler: *sampler,
                        view: *view,
                    },
                })
            })
            .collect()
    }

    #[inline]
    pub fn schema(&self) -> &[DescriptorSchemaEntry] {
        &self.schema
    }
}

/// Graphics pipeline with its layouts, pool and per-image descriptor sets.
pub struct PipelineBundle {
    device: Arc<Device>,
    cache: DescriptorCache,
    push_ranges: Vec<vk::PushConstantRange>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    // Drop order: pipeline before its layout, sets' pool before the set layout.
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    _pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
}

impl PipelineBundle {
    /// Builds the set layout, pool, `image_count` sets, pipeline layout and
    /// pipeline for `render_pass`.
    ///
    /// Rasterization uses the device's MSAA sample count.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        schema: &[DescriptorSchemaEntry],
        push_constants: &[(u32, vk::ShaderStageFlags)],
        shaders: &ShaderPair,
        image_count: u32,
    ) -> RhiResult<Self> {
        let set_layout = DescriptorSetLayout::new(device.clone(), &layout_bindings(schema))?;
        let pool = DescriptorPool::new(
            device.clone(),
            image_count,
            &pool_sizes(schema, image_count),
        )?;
        let layouts = vec![set_layout.handle(); image_count as usize];
        let descriptor_sets = pool.allocate(&layouts)?;

        let push_ranges = push_constant_ranges(push_constants);
        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[set_layout.handle()], &push_ranges)?;

        let pipeline = GraphicsPipelineBuilder::new(render_pass.handle())
            .shaders(shaders)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .rasterization_samples(device.msaa_samples())
            .build(device.clone(), &pipeline_layout)?;

        info!(
            "Pipeline bundle created: {} binding(s), {} push range(s), {} set(s)",
            schema.len(),
            push_ranges.len(),
            descriptor_sets.len()
        );

        Ok(Self {
            device,
            cache: DescriptorCache::new(schema),
            push_ranges,
            descriptor_sets,
            pipeline,
            pipeline_layout,
            _pool: pool,
            set_layout,
        })
    }

    /// Attaches `resource` to the binding called `name`.
    ///
    /// No descriptor set is written until [`Self::update_descriptor_set`].
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnknownDescriptor`] if `name` is not declared or
    /// the resource kind does not match the binding.
    pub fn update_descriptor_resource(
        &mut self,
        name: &str,
        resource: DescriptorResource,
    ) -> RhiResult<()> {
        let binding = self.cache.set(name, resource)?;
        debug!("Descriptor '{}' (binding {}) updated", name, binding);
        Ok(())
    }

    /// Writes every binding of the set for `image_index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorNotBound`] if a binding has no resource
    /// and [`RhiError::InvalidHandle`] if `image_index` is out of range.
    pub fn update_descriptor_set(&self, image_index: u32) -> RhiResult<()> {
        let index = image_index as usize;
        let set = *self.descriptor_sets.get(index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no descriptor set for image {image_index}"))
        })?;

        let resolved = self.cache.resolve(image_index)?;
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = resolved
            .iter()
            .filter_map(|binding| match *binding {
                ResolvedBinding::Buffer(buffer) => Some([whole_buffer_info(buffer)]),
                ResolvedBinding::Image { .. } => None,
            })
            .collect();
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = resolved
            .iter()
            .filter_map(|binding| match *binding {
                ResolvedBinding::Image { sampler, view } => {
                    Some([sampled_image_info(sampler, view)])
                }
                ResolvedBinding::Buffer(_) => None,
            })
            .collect();

        let mut buffer_iter = buffer_infos.iter();
        let mut image_iter = image_infos.iter();
        let writes: Vec<_> = self
            .cache
            .schema()
            .iter()
            .zip(&resolved)
            .enumerate()
            .map(|(binding, (entry, resolved))| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding as u32)
                    .dst_array_element(0)
                    .descriptor_type(entry.kind.to_vk());
                match resolved {
                    ResolvedBinding::Image { .. } => match image_iter.next() {
                        Some(info) => write.image_info(info),
                        None => write,
                    },
                    ResolvedBinding::Buffer(_) => match buffer_iter.next() {
                        Some(info) => write.buffer_info(info),
                        None => write,
                    },
                }
            })
            .collect();

        update_descriptor_sets(&self.device, &writes);
        Ok(())
    }

    /// Writes every set.
    ///
    /// # Errors
    ///
    /// See [`Self::update_descriptor_set`].
    pub fn update_all_descriptor_sets(&self) -> RhiResult<()> {
        for image_index in 0..self.descriptor_sets.len() as u32 {
            self.update_descriptor_set(image_index)?;
        }
        Ok(())
    }

    /// Records push constant range `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PushConstantSize`] if `bytes` does not match the
    /// declared size of the range.
    pub fn push_constants(&self, cmd: &CommandBuffer, slot: usize, bytes: &[u8]) -> RhiResult<()> {
        let range = check_push_constant(&self.push_ranges, slot, bytes)?;
        cmd.push_constants_bytes(
            self.pipeline_layout.handle(),
            range.stage_flags,
            range.offset,
            bytes,
        );
        Ok(())
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    /// Descriptor set for a swapchain image.
    #[inline]
    pub fn descriptor_set(&self, image_index: u32) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(image_index as usize).copied()
    }

    #[inline]
    pub fn push_constant_layout(&self) -> &[vk::PushConstantRange] {
        &self.push_ranges
    }

    #[inline]
    pub fn schema(&self) -> &[DescriptorSchemaEntry] {
        self.cache.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn scene_schema() -> Vec<DescriptorSchemaEntry> {
        vec![
            DescriptorSchemaEntry::new(
                "Uniform Buffer",
                DescriptorKind::UniformBuffer,
                vk::ShaderStageFlags::VERTEX,
                144,
            ),
            DescriptorSchemaEntry::new(
                "Texture",
                DescriptorKind::CombinedImageSampler,
                vk::ShaderStageFlags::FRAGMENT,
                0,
            ),
            DescriptorSchemaEntry::new(
                "Storage Buffer",
                DescriptorKind::StorageBuffer,
                vk::ShaderStageFlags::VERTEX,
                64 * 50_000,
            ),
        ]
    }

    #[test]
    fn test_descriptor_kind_to_vk() {
        assert_eq!(
            DescriptorKind::UniformBuffer.to_vk(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(
            DescriptorKind::StorageBuffer.to_vk(),
            vk::DescriptorType::STORAGE_BUFFER
        );
        assert_eq!(
            DescriptorKind::CombinedImageSampler.to_vk(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_layout_bindings_follow_declaration_order() {
        let bindings = layout_bindings(&scene_schema());
        assert_eq!(bindings.len(), 3);
        for (i, b) in bindings.iter().enumerate() {
            assert_eq!(b.binding, i as u32);
            assert_eq!(b.descriptor_count, 1);
        }
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(bindings[2].stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_pool_sizes_scale_with_image_count() {
        let sizes = pool_sizes(&scene_schema(), 3);
        assert_eq!(sizes.len(), 3);
        assert!(sizes.iter().all(|s| s.descriptor_count == 3));
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn test_push_constant_ranges_running_offsets() {
        let ranges = push_constant_ranges(&[
            (40, vk::ShaderStageFlags::VERTEX),
            (4, vk::ShaderStageFlags::FRAGMENT),
        ]);
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].offset, ranges[0].size), (0, 40));
        assert_eq!((ranges[1].offset, ranges[1].size), (40, 4));
        assert_eq!(ranges[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert!(push_constant_ranges(&[]).is_empty());
    }

    #[test]
    fn test_check_push_constant_size() {
        let ranges = push_constant_ranges(&[
            (40, vk::ShaderStageFlags::VERTEX),
            (4, vk::ShaderStageFlags::FRAGMENT),
        ]);

        let range = check_push_constant(&ranges, 1, &7i32.to_ne_bytes()).unwrap();
        assert_eq!(range.offset, 40);

        let err = check_push_constant(&ranges, 0, &[0u8; 36]).unwrap_err();
        assert!(matches!(
            err,
            RhiError::PushConstantSize {
                index: 0,
                expected: 40,
                actual: 36
            }
        ));

        assert!(check_push_constant(&ranges, 2, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_resource_kind_matches_schema_kind() {
        assert_eq!(
            DescriptorResource::UniformBuffers(vec![]).kind(),
            DescriptorKind::UniformBuffer
        );
        assert_eq!(
            DescriptorResource::StorageBuffer(vk::Buffer::null()).kind(),
            DescriptorKind::StorageBuffer
        );
        assert_eq!(
            DescriptorResource::Texture {
                sampler: vk::Sampler::null(),
                view: vk::ImageView::null(),
            }
            .kind(),
            DescriptorKind::CombinedImageSampler
        );
    }

    fn buffer(raw: u64) -> vk::Buffer {
        vk::Buffer::from_raw(raw)
    }

    fn scene_texture() -> DescriptorResource {
        DescriptorResource::Texture {
            sampler: vk::Sampler::from_raw(7),
            view: vk::ImageView::from_raw(8),
        }
    }

    fn bound_cache() -> DescriptorCache {
        let mut cache = DescriptorCache::new(&scene_schema());
        cache
            .set(
                "Uniform Buffer",
                DescriptorResource::UniformBuffers(vec![buffer(1), buffer(2), buffer(3)]),
            )
            .unwrap();
        cache.set("Texture", scene_texture()).unwrap();
        cache
            .set("Storage Buffer", DescriptorResource::StorageBuffer(buffer(9)))
            .unwrap();
        cache
    }

    #[test]
    fn test_cache_unknown_name() {
        let mut cache = DescriptorCache::new(&scene_schema());
        let err = cache
            .set("Light Buffer", DescriptorResource::StorageBuffer(buffer(1)))
            .unwrap_err();
        assert!(matches!(err, RhiError::UnknownDescriptor(name) if name == "Light Buffer"));
    }

    #[test]
    fn test_cache_kind_mismatch() {
        let mut cache = DescriptorCache::new(&scene_schema());
        let err = cache
            .set("Texture", DescriptorResource::StorageBuffer(buffer(1)))
            .unwrap_err();
        assert!(matches!(err, RhiError::UnknownDescriptor(_)));

        // A rejected resource leaves the binding unset.
        assert!(matches!(
            cache.resolve(0).unwrap_err(),
            RhiError::DescriptorNotBound(_)
        ));
    }

    #[test]
    fn test_cache_set_returns_binding_index() {
        let mut cache = DescriptorCache::new(&scene_schema());
        let index = cache
            .set("Storage Buffer", DescriptorResource::StorageBuffer(buffer(4)))
            .unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn test_cache_unset_binding_is_not_bound() {
        let mut cache = DescriptorCache::new(&scene_schema());
        cache
            .set("Uniform Buffer", DescriptorResource::UniformBuffers(vec![buffer(1)]))
            .unwrap();
        cache.set("Texture", scene_texture()).unwrap();

        let err = cache.resolve(0).unwrap_err();
        assert!(matches!(err, RhiError::DescriptorNotBound(name) if name == "Storage Buffer"));
    }

    #[test]
    fn test_cache_uniform_selects_image_buffer() {
        let cache = bound_cache();
        for image_index in 0..3u32 {
            let resolved = cache.resolve(image_index).unwrap();
            assert_eq!(resolved.len(), 3);
            assert_eq!(
                resolved[0],
                ResolvedBinding::Buffer(buffer(u64::from(image_index) + 1))
            );
        }
    }

    #[test]
    fn test_cache_shared_bindings_identical_per_image() {
        let cache = bound_cache();
        let first = cache.resolve(0).unwrap();
        for image_index in 1..3 {
            let resolved = cache.resolve(image_index).unwrap();
            assert_eq!(resolved[1], first[1]);
            assert_eq!(resolved[2], first[2]);
        }
        assert_eq!(
            first[1],
            ResolvedBinding::Image {
                sampler: vk::Sampler::from_raw(7),
                view: vk::ImageView::from_raw(8),
            }
        );
        assert_eq!(first[2], ResolvedBinding::Buffer(buffer(9)));
    }

    #[test]
    fn test_cache_uniform_list_too_short() {
        let cache = bound_cache();
        let err = cache.resolve(3).unwrap_err();
        assert!(matches!(err, RhiError::DescriptorNotBound(name) if name.contains("image 3")));
    }
}
