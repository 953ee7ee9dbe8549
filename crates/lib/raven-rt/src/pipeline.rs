use std::sync::Arc;

use crate::descriptor::BindGroupLayout;
use crate::error::{ensure_structure, RtError, RtResult};
use crate::sbt::{ShaderBindingTable, ShaderGroupRole};

#[derive(Clone)]
pub struct RayTracingPipelineDesc {
    pub bind_group_layouts: Vec<Arc<BindGroupLayout>>,
    pub shader_binding_table: Option<Arc<ShaderBindingTable>>,
    pub max_recursion_depth: u32,
}

impl Default for RayTracingPipelineDesc {
    fn default() -> Self {
        Self {
            bind_group_layouts: Vec::new(),
            shader_binding_table: None,
            max_recursion_depth: 1,
        }
    }
}

/// Ties a shader binding table to the bind group layouts its shaders consume.
pub struct RayTracingPipeline {
    bind_group_layouts: Vec<Arc<BindGroupLayout>>,
    shader_binding_table: Arc<ShaderBindingTable>,
    max_recursion_depth: u32,
}

impl RayTracingPipeline {
    pub fn new(desc: RayTracingPipelineDesc) -> RtResult<Self> {
        let shader_binding_table = desc.shader_binding_table
            .ok_or_else(|| RtError::structural("Missing shader binding table"))?;

        if shader_binding_table.is_destroyed() {
            return Err(RtError::destroyed("Shader binding table is destroyed"));
        }
        ensure_structure!(
            shader_binding_table.counts().count(ShaderGroupRole::Generation) > 0,
            "Shader binding table must contain a ray generation shader"
        );
        ensure_structure!(desc.max_recursion_depth > 0, "Max recursion depth must be at least 1");

        glog::trace!(
            "Created ray tracing pipeline with {} shader groups",
            shader_binding_table.groups().len()
        );

        Ok(Self {
            bind_group_layouts: desc.bind_group_layouts,
            shader_binding_table,
            max_recursion_depth: desc.max_recursion_depth,
        })
    }

    pub fn bind_group_layouts(&self) -> &[Arc<BindGroupLayout>] {
        &self.bind_group_layouts
    }

    pub fn shader_binding_table(&self) -> &Arc<ShaderBindingTable> {
        &self.shader_binding_table
    }

    pub fn max_recursion_depth(&self) -> u32 {
        self.max_recursion_depth
    }

    /// Byte offset of `role` within the bound shader binding table.
    pub fn shader_binding_table_offset(&self, role: ShaderGroupRole) -> RtResult<u64> {
        if self.shader_binding_table.is_destroyed() {
            return Err(RtError::destroyed("Shader binding table is destroyed"));
        }
        Ok(self.shader_binding_table.offset(role))
    }
}
