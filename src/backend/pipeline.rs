// Presentation pipeline
//
// Everything needed to draw the triangle into a swapchain image, built once:
// render pass, graphics pipeline, one framebuffer per image view, and one
// pre-recorded command buffer per framebuffer.
//
// The scene never changes, so command buffers are recorded at setup with
// SIMULTANEOUS_USE and resubmitted every frame.

use super::device::DeviceContext;
use super::error::{RenderResult, RendererError};
use super::owner::{owned, ResourceOwner};
use super::shader;
use super::swapchain::Swapchain;
use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs that come from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub clear_color: [f32; 4],
}

/// The single color attachment: cleared on load, stored for presentation.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Color writes wait until the presentation engine has finished reading
/// the image from the previous use.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        .src_access_mask(vk::AccessFlags::MEMORY_READ)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .build()
}

pub fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

pub fn clear_value(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

pub fn create_render_pass(
    device: &Arc<DeviceContext>,
    format: vk::Format,
) -> RenderResult<ResourceOwner<vk::RenderPass>> {
    let attachments = [color_attachment(format)];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpasses = [vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .build()];
    let dependencies = [external_dependency()];

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.device.create_render_pass(&create_info, None) }
        .map_err(RendererError::pipeline("vkCreateRenderPass"))?;

    Ok(owned(device, render_pass, |ctx: &DeviceContext, render_pass| unsafe {
        ctx.device.destroy_render_pass(render_pass, None);
    }))
}

pub struct GraphicsPipeline {
    pub pipeline: ResourceOwner<vk::Pipeline>,
    pub layout: ResourceOwner<vk::PipelineLayout>,
}

impl GraphicsPipeline {
    /// Builds the fixed-function triangle pipeline. The shader modules only
    /// live for the duration of this call.
    pub fn new(
        device: &Arc<DeviceContext>,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        settings: &PipelineSettings,
    ) -> RenderResult<Self> {
        let vert_code = shader::load_spirv(&settings.vertex_shader)?;
        let frag_code = shader::load_spirv(&settings.fragment_shader)?;
        let vert_module = shader::create_shader_module(device, &vert_code)?;
        let frag_module = shader::create_shader_module(device, &frag_code)?;

        let entry_point = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module.get())
                .name(entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module.get())
                .name(entry_point)
                .build(),
        ];

        // Vertices are generated in the vertex shader.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [viewport(extent)];
        let scissors = [full_rect(extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .map_err(RendererError::pipeline("vkCreatePipelineLayout"))?;
        let layout = owned(device, layout, |ctx: &DeviceContext, layout| unsafe {
            ctx.device.destroy_pipeline_layout(layout, None);
        });

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout.get())
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| RendererError::pipeline("vkCreateGraphicsPipelines")(result))?;

        let pipeline = single_pipeline(pipelines)?;
        let pipeline = owned(device, pipeline, |ctx: &DeviceContext, pipeline| unsafe {
            ctx.device.destroy_pipeline(pipeline, None);
        });

        log::info!("Created graphics pipeline");
        Ok(Self { pipeline, layout })
    }
}

/// The one pipeline a single create info yields. A driver returning nothing
/// is treated as a failed creation.
fn single_pipeline(pipelines: Vec<vk::Pipeline>) -> RenderResult<vk::Pipeline> {
    pipelines.into_iter().next().ok_or(RendererError::PipelineCreationFailed {
        step: "vkCreateGraphicsPipelines",
        result: vk::Result::ERROR_INITIALIZATION_FAILED,
    })
}

/// Per-image framebuffers and their pre-recorded command buffers.
pub struct FrameResources {
    /// Freed together with the pool.
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub command_pool: ResourceOwner<vk::CommandPool>,
    pub framebuffers: Vec<ResourceOwner<vk::Framebuffer>>,
}

impl FrameResources {
    pub fn new(
        device: &Arc<DeviceContext>,
        swapchain: &Swapchain,
        render_pass: vk::RenderPass,
    ) -> RenderResult<Self> {
        let extent = swapchain.extent();
        let framebuffers = swapchain
            .image_views
            .iter()
            .map(|view| create_framebuffer(device, render_pass, view.get(), extent))
            .collect::<RenderResult<Vec<_>>>()?;

        let pool_info =
            vk::CommandPoolCreateInfo::builder().queue_family_index(device.graphics_queue_family);
        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(RendererError::pipeline("vkCreateCommandPool"))?;
        let command_pool = owned(device, pool, |ctx: &DeviceContext, pool| unsafe {
            ctx.device.destroy_command_pool(pool, None);
        });

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool.get())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .map_err(RendererError::pipeline("vkAllocateCommandBuffers"))?;

        log::debug!(
            "Created {} framebuffers and command buffers",
            framebuffers.len()
        );
        Ok(Self {
            command_buffers,
            command_pool,
            framebuffers,
        })
    }

    /// Records the draw into every command buffer.
    pub fn record(
        &self,
        device: &DeviceContext,
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let clear_values = [clear_value(clear_color)];

        for (&command_buffer, framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass)
                .framebuffer(framebuffer.get())
                .render_area(full_rect(extent))
                .clear_values(&clear_values);

            unsafe {
                device
                    .device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(RendererError::pipeline("vkBeginCommandBuffer"))?;

                device.device.cmd_begin_render_pass(
                    command_buffer,
                    &render_pass_info,
                    vk::SubpassContents::INLINE,
                );
                device.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline,
                );
                device.device.cmd_draw(command_buffer, 3, 1, 0, 0);
                device.device.cmd_end_render_pass(command_buffer);

                device
                    .device
                    .end_command_buffer(command_buffer)
                    .map_err(RendererError::pipeline("vkEndCommandBuffer"))?;
            }
        }

        Ok(())
    }

    pub fn command_buffer(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(image_index as usize).copied()
    }
}

fn create_framebuffer(
    device: &Arc<DeviceContext>,
    render_pass: vk::RenderPass,
    view: vk::ImageView,
    extent: vk::Extent2D,
) -> RenderResult<ResourceOwner<vk::Framebuffer>> {
    let attachments = [view];
    let create_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    let framebuffer = unsafe { device.device.create_framebuffer(&create_info, None) }
        .map_err(RendererError::pipeline("vkCreateFramebuffer"))?;

    Ok(owned(device, framebuffer, |ctx: &DeviceContext, framebuffer| unsafe {
        ctx.device.destroy_framebuffer(framebuffer, None);
    }))
}

/// Render pass, pipeline and recorded frame resources for one swapchain.
/// Fields drop in reverse creation order.
pub struct PresentationPipeline {
    pub frames: FrameResources,
    pub graphics: GraphicsPipeline,
    pub render_pass: ResourceOwner<vk::RenderPass>,
}

impl PresentationPipeline {
    pub fn new(
        device: &Arc<DeviceContext>,
        swapchain: &Swapchain,
        settings: &PipelineSettings,
    ) -> RenderResult<Self> {
        let render_pass = create_render_pass(device, swapchain.format())?;
        let graphics = GraphicsPipeline::new(device, render_pass.get(), swapchain.extent(), settings)?;
        let frames = FrameResources::new(device, swapchain, render_pass.get())?;
        frames.record(
            device,
            render_pass.get(),
            graphics.pipeline.get(),
            swapchain.extent(),
            settings.clear_color,
        )?;

        Ok(Self {
            frames,
            graphics,
            render_pass,
        })
    }
}
