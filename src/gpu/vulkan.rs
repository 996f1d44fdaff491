//! Vulkan GPU implementation
//!
//! Provides a Vulkan backend using `ash` and `vk-mem`. Recorded command
//! streams are replayed into a one-time command buffer, submitted on the
//! transfer-capable queue handed in at construction and waited on with a
//! fence.

use super::{
    BufferUsage, BufferWrite, CommandStream, GpuCommand, GpuDevice, GpuError, GpuResult,
    GpuTextureFormat, ImageLayout, SamplerDescriptor, TextureDescriptor,
};
use crate::bindless::BindlessTable;
use ash::vk;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use vk_mem::Alloc;

/// Map a Vulkan result code onto a `GpuError`, keeping OOM and device loss distinct
fn vk_error(result: vk::Result, otherwise: impl FnOnce(String) -> GpuError) -> GpuError {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GpuError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
        other => otherwise(format!("{other:?}")),
    }
}

/// Inner state for VulkanBuffer that holds the actual Vulkan resources
struct VulkanBufferInner {
    /// Vulkan buffer handle
    buffer: vk::Buffer,
    /// VMA allocation
    allocation: vk_mem::Allocation,
    /// Buffer size in bytes
    size: usize,
    /// Reference to allocator for cleanup
    allocator: Arc<Mutex<vk_mem::Allocator>>,
}

impl Drop for VulkanBufferInner {
    fn drop(&mut self) {
        let allocator = self.allocator.lock();
        unsafe {
            allocator.destroy_buffer(self.buffer, &mut self.allocation);
        }
        log::trace!("VulkanBuffer destroyed (size={})", self.size);
    }
}

/// Vulkan buffer with associated allocation
#[derive(Clone)]
pub struct VulkanBuffer {
    inner: Arc<Mutex<VulkanBufferInner>>,
    /// Vulkan buffer handle (cached for quick access)
    pub buffer: vk::Buffer,
    /// Buffer size in bytes (cached for quick access)
    pub size: usize,
    /// Buffer usage (cached for quick access)
    pub usage: BufferUsage,
}

impl fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

impl VulkanBuffer {
    /// Get the raw Vulkan buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

struct VulkanImageInner {
    image: vk::Image,
    allocation: vk_mem::Allocation,
    allocator: Arc<Mutex<vk_mem::Allocator>>,
}

impl Drop for VulkanImageInner {
    fn drop(&mut self) {
        let allocator = self.allocator.lock();
        unsafe {
            allocator.destroy_image(self.image, &mut self.allocation);
        }
        log::trace!("VulkanImage destroyed");
    }
}

/// Vulkan image with its VMA allocation
#[derive(Clone)]
pub struct VulkanImage {
    #[allow(dead_code)]
    inner: Arc<Mutex<VulkanImageInner>>,
    /// Vulkan image handle (cached for quick access)
    pub image: vk::Image,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: GpuTextureFormat,
}

impl fmt::Debug for VulkanImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mip_levels", &self.mip_levels)
            .field("format", &self.format)
            .finish()
    }
}

struct VulkanViewInner {
    view: vk::ImageView,
    device: ash::Device,
    // Keeps the image alive for as long as the view exists
    _image: VulkanImage,
}

impl Drop for VulkanViewInner {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

/// Image view covering every mip level
#[derive(Clone)]
pub struct VulkanImageView {
    #[allow(dead_code)]
    inner: Arc<VulkanViewInner>,
    /// Image view handle (cached for quick access)
    pub view: vk::ImageView,
}

impl fmt::Debug for VulkanImageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanImageView")
            .field("view", &self.view)
            .finish()
    }
}

struct VulkanSamplerInner {
    sampler: vk::Sampler,
    device: ash::Device,
}

impl Drop for VulkanSamplerInner {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Sampler handle
#[derive(Clone)]
pub struct VulkanSampler {
    #[allow(dead_code)]
    inner: Arc<VulkanSamplerInner>,
    pub sampler: vk::Sampler,
}

impl fmt::Debug for VulkanSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanSampler")
            .field("sampler", &self.sampler)
            .finish()
    }
}

/// Handles the Vulkan backend needs from the application
pub struct VulkanContext {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// Queue supporting transfer and graphics (blits)
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    /// Whether the `samplerAnisotropy` feature was enabled on the device
    pub sampler_anisotropy: bool,
}

struct DeviceShared {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    command_pool: Mutex<vk::CommandPool>,
    /// Zero when anisotropic filtering is unavailable
    max_anisotropy: f32,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None);
        }
    }
}

/// Vulkan GPU device wrapper
///
/// Wraps `ash::Device` and VMA allocator to implement the `GpuDevice` trait.
#[derive(Clone)]
pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
    allocator: Arc<Mutex<vk_mem::Allocator>>,
}

impl fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("backend", &"Vulkan")
            .field("max_anisotropy", &self.shared.max_anisotropy)
            .finish()
    }
}

impl VulkanDevice {
    /// Create a new Vulkan device wrapper
    ///
    /// # Arguments
    /// * `context` - Instance, device and queue to upload through
    /// * `allocator` - VMA allocator for memory management
    pub fn new(context: VulkanContext, allocator: Arc<Mutex<vk_mem::Allocator>>) -> GpuResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(context.queue_family_index);
        let command_pool = unsafe { context.device.create_command_pool(&pool_info, None) }
            .map_err(|e| vk_error(e, GpuError::AllocationFailed))?;

        let limits = unsafe {
            context
                .instance
                .get_physical_device_properties(context.physical_device)
        }
        .limits;
        let max_anisotropy = if context.sampler_anisotropy {
            limits.max_sampler_anisotropy
        } else {
            0.0
        };

        Ok(Self {
            shared: Arc::new(DeviceShared {
                instance: context.instance,
                physical_device: context.physical_device,
                device: context.device,
                queue: Mutex::new(context.queue),
                command_pool: Mutex::new(command_pool),
                max_anisotropy,
            }),
            allocator,
        })
    }

    /// Get the underlying ash device
    pub fn device(&self) -> &ash::Device {
        &self.shared.device
    }

    /// Get the allocator
    pub fn allocator(&self) -> &Arc<Mutex<vk_mem::Allocator>> {
        &self.allocator
    }

    /// Convert BufferUsage to Vulkan buffer usage flags
    fn to_vk_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
        match usage {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Convert GpuTextureFormat to Vulkan format
    fn to_vk_format(format: GpuTextureFormat) -> vk::Format {
        match format {
            GpuTextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            GpuTextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }

    fn to_vk_layout(layout: ImageLayout) -> vk::ImageLayout {
        match layout {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Access mask and stage that touch an image in `layout`
    fn layout_access(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
        match layout {
            ImageLayout::Undefined => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
            ImageLayout::TransferDst => (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
            ImageLayout::TransferSrc => (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER),
            ImageLayout::ShaderReadOnly => (
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
        }
    }

    fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn extent_offset((width, height): (u32, u32)) -> vk::Offset3D {
        vk::Offset3D {
            x: width as i32,
            y: height as i32,
            z: 1,
        }
    }

    fn record(&self, cmd: vk::CommandBuffer, command: &GpuCommand<Self>) {
        let device = &self.shared.device;
        match command {
            GpuCommand::Transition {
                image,
                mips,
                from,
                to,
            } => {
                let (src_access, src_stage) = Self::layout_access(*from);
                let (dst_access, dst_stage) = Self::layout_access(*to);
                let barrier = vk::ImageMemoryBarrier::builder()
                    .old_layout(Self::to_vk_layout(*from))
                    .new_layout(Self::to_vk_layout(*to))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .image(image.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: mips.base,
                        level_count: mips.count,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .build();
                unsafe {
                    device.cmd_pipeline_barrier(
                        cmd,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
            }
            GpuCommand::CopyBufferToImage {
                buffer,
                buffer_offset,
                image,
                width,
                height,
            } => {
                let region = vk::BufferImageCopy::builder()
                    .buffer_offset(*buffer_offset)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(Self::color_layers(0))
                    .image_offset(vk::Offset3D::default())
                    .image_extent(vk::Extent3D {
                        width: *width,
                        height: *height,
                        depth: 1,
                    })
                    .build();
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        buffer.buffer,
                        image.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
            }
            GpuCommand::BlitMip {
                image,
                src_level,
                src_extent,
                dst_extent,
            } => {
                let blit = vk::ImageBlit::builder()
                    .src_subresource(Self::color_layers(*src_level))
                    .src_offsets([vk::Offset3D::default(), Self::extent_offset(*src_extent)])
                    .dst_subresource(Self::color_layers(*src_level + 1))
                    .dst_offsets([vk::Offset3D::default(), Self::extent_offset(*dst_extent)])
                    .build();
                unsafe {
                    device.cmd_blit_image(
                        cmd,
                        image.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::LINEAR,
                    );
                }
            }
        }
    }

    fn record_and_submit(&self, cmd: vk::CommandBuffer, commands: &CommandStream<Self>) -> GpuResult<()> {
        let device = &self.shared.device;
        let submit_err = |e| vk_error(e, GpuError::SubmissionFailed);

        let begin = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin) }.map_err(submit_err)?;
        for command in commands.commands() {
            self.record(cmd, command);
        }
        unsafe { device.end_command_buffer(cmd) }.map_err(submit_err)?;

        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(submit_err)?;
        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        let result = {
            let queue = self.shared.queue.lock();
            unsafe { device.queue_submit(*queue, &[submit], fence) }
        }
        .and_then(|_| unsafe { device.wait_for_fences(&[fence], true, u64::MAX) });

        unsafe { device.destroy_fence(fence, None) };
        result.map_err(submit_err)
    }

    /// Build a descriptor set exposing every bound slot of `table` as one
    /// variable-count array of combined image samplers at binding 0
    pub fn create_bindless_set(&self, table: &BindlessTable<Self>) -> GpuResult<BindlessDescriptorSet> {
        let count = table.len();
        if count == 0 {
            return Err(GpuError::InvalidSize(0));
        }
        let device = &self.shared.device;
        let mut set = BindlessDescriptorSet {
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
            count,
            device: device.clone(),
        };
        let alloc_err = |e| vk_error(e, GpuError::AllocationFailed);

        let binding_flags = [vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
            | vk::DescriptorBindingFlags::PARTIALLY_BOUND];
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(&binding_flags);
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(count)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&bindings)
            .push_next(&mut flags_info);
        set.layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(alloc_err)?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        set.pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(alloc_err)?;

        let counts = [count];
        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder().descriptor_counts(&counts);
        let layouts = [set.layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(set.pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_info);
        set.set = unsafe { device.allocate_descriptor_sets(&alloc_info) }.map_err(alloc_err)?[0];

        let bound: Vec<(u32, vk::DescriptorImageInfo)> = table
            .iter()
            .map(|(slot, binding)| {
                (
                    slot,
                    vk::DescriptorImageInfo {
                        sampler: binding.sampler.sampler,
                        image_view: binding.view.view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                )
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = bound
            .iter()
            .map(|(slot, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set.set)
                    .dst_binding(0)
                    .dst_array_element(*slot)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
                    .build()
            })
            .collect();
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        log::debug!("Bindless descriptor set built with {count} slots");
        Ok(set)
    }
}

/// Descriptor set layout, pool and set for a bindless texture array
pub struct BindlessDescriptorSet {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
    /// Descriptor count allocated for the variable-size binding
    pub count: u32,
    device: ash::Device,
}

impl fmt::Debug for BindlessDescriptorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindlessDescriptorSet")
            .field("set", &self.set)
            .field("count", &self.count)
            .finish()
    }
}

impl Drop for BindlessDescriptorSet {
    fn drop(&mut self) {
        // Destroying the pool frees the set; null handles are ignored
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

impl GpuDevice for VulkanDevice {
    type Buffer = VulkanBuffer;
    type Image = VulkanImage;
    type ImageView = VulkanImageView;
    type Sampler = VulkanSampler;

    fn allocate_buffer(&self, size: usize, usage: BufferUsage) -> GpuResult<Self::Buffer> {
        if size == 0 {
            return Err(GpuError::InvalidSize(size));
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size as u64)
            .usage(Self::to_vk_buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // Every buffer here is written through a mapping
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: match usage {
                BufferUsage::Staging => vk_mem::MemoryUsage::AutoPreferHost,
                _ => vk_mem::MemoryUsage::AutoPreferDevice,
            },
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ..Default::default()
        };

        let allocator = self.allocator.lock();
        let (buffer, allocation) = unsafe {
            allocator
                .create_buffer(&buffer_info, &allocation_info)
                .map_err(|e| vk_error(e, GpuError::AllocationFailed))?
        };

        let inner = VulkanBufferInner {
            buffer,
            allocation,
            size,
            allocator: Arc::clone(&self.allocator),
        };

        Ok(VulkanBuffer {
            inner: Arc::new(Mutex::new(inner)),
            buffer,
            size,
            usage,
        })
    }

    fn write_buffer_regions(&self, buffer: &Self::Buffer, writes: &[BufferWrite<'_>]) -> GpuResult<()> {
        if let Some(bad) = writes.iter().find(|w| w.offset + w.data.len() > buffer.size) {
            return Err(GpuError::UploadFailed(format!(
                "Data exceeds buffer size: offset={}, data_len={}, buffer_size={}",
                bad.offset,
                bad.data.len(),
                buffer.size
            )));
        }

        let mut inner = buffer.inner.lock();
        let allocator = self.allocator.lock();

        // Map once, copy every region, unmap
        let ptr = unsafe {
            allocator
                .map_memory(&mut inner.allocation)
                .map_err(|e| vk_error(e, GpuError::UploadFailed))?
        };

        unsafe {
            for write in writes {
                std::ptr::copy_nonoverlapping(write.data.as_ptr(), ptr.add(write.offset), write.data.len());
            }
            allocator.unmap_memory(&mut inner.allocation);
        }

        Ok(())
    }

    fn create_image(&self, desc: &TextureDescriptor) -> GpuResult<Self::Image> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::TextureCreationFailed(
                "Invalid texture dimensions".to_string(),
            ));
        }

        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if desc.generate_mipmaps {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(Self::to_vk_format(desc.format))
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let allocator = self.allocator.lock();
        let (image, allocation) = unsafe {
            allocator
                .create_image(&image_info, &allocation_info)
                .map_err(|e| vk_error(e, GpuError::TextureCreationFailed))?
        };
        log::trace!("VulkanImage '{}' created", desc.label);

        Ok(VulkanImage {
            inner: Arc::new(Mutex::new(VulkanImageInner {
                image,
                allocation,
                allocator: Arc::clone(&self.allocator),
            })),
            image,
            width: desc.width,
            height: desc.height,
            mip_levels: desc.mip_levels,
            format: desc.format,
        })
    }

    fn create_image_view(&self, image: &Self::Image, desc: &TextureDescriptor) -> GpuResult<Self::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(Self::to_vk_format(desc.format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { self.shared.device.create_image_view(&view_info, None) }
            .map_err(|e| vk_error(e, GpuError::TextureCreationFailed))?;

        Ok(VulkanImageView {
            inner: Arc::new(VulkanViewInner {
                view,
                device: self.shared.device.clone(),
                _image: image.clone(),
            }),
            view,
        })
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuResult<Self::Sampler> {
        let anisotropy = desc
            .max_anisotropy
            .filter(|_| self.shared.max_anisotropy >= 1.0)
            .map(|a| a.clamp(1.0, self.shared.max_anisotropy));

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.shared.device.create_sampler(&sampler_info, None) }
            .map_err(|e| vk_error(e, GpuError::SamplerCreationFailed))?;

        Ok(VulkanSampler {
            inner: Arc::new(VulkanSamplerInner {
                sampler,
                device: self.shared.device.clone(),
            }),
            sampler,
        })
    }

    fn supports_linear_blit(&self, format: GpuTextureFormat) -> bool {
        let properties = unsafe {
            self.shared.instance.get_physical_device_format_properties(
                self.shared.physical_device,
                Self::to_vk_format(format),
            )
        };
        properties.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST,
        )
    }

    fn submit_and_wait(&self, commands: &CommandStream<Self>) -> GpuResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let device = &self.shared.device;
        let pool = self.shared.command_pool.lock();

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| vk_error(e, GpuError::SubmissionFailed))?[0];

        let result = self.record_and_submit(cmd, commands);
        unsafe { device.free_command_buffers(*pool, &[cmd]) };
        log::trace!("Submitted '{}' ({} commands)", commands.label(), commands.len());
        result
    }

    fn wait_idle(&self) -> GpuResult<()> {
        unsafe { self.shared.device.device_wait_idle() }
            .map_err(|e| vk_error(e, GpuError::SubmissionFailed))
    }

    fn destroy_buffer(&self, _buffer: Self::Buffer) {
        // Drop is handled by VulkanBufferInner
    }

    fn destroy_image(&self, _image: Self::Image) {
        // Drop is handled by VulkanImageInner
    }

    fn backend_name(&self) -> &'static str {
        "Vulkan"
    }
}
