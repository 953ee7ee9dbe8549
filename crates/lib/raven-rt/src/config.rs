use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::device::RayTracingProperties;

/// Ray tracing capabilities and shader-visible heap sizes a device is configured with.
#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned", derive(Clone), build_fn(validate = "Self::validate_alignments"))]
#[serde(default)]
pub struct RayTracingConfig {
    #[builder(default = "true")]
    pub ray_tracing_supported: bool,
    #[builder(default = "32")]
    pub shader_group_handle_size: u32,
    #[builder(default = "32")]
    pub shader_group_handle_alignment: u32,
    #[builder(default = "64")]
    pub shader_group_base_alignment: u32,
    #[builder(default = "256")]
    pub min_scratch_offset_alignment: u64,
    /// Capacity of one shader-visible CBV/SRV/UAV heap, in descriptors.
    #[builder(default = "1024")]
    pub view_heap_capacity: u32,
    /// Capacity of one shader-visible sampler heap, in descriptors.
    #[builder(default = "256")]
    pub sampler_heap_capacity: u32,
}

impl Default for RayTracingConfig {
    fn default() -> Self {
        Self {
            ray_tracing_supported: true,
            shader_group_handle_size: 32,
            shader_group_handle_alignment: 32,
            shader_group_base_alignment: 64,
            min_scratch_offset_alignment: 256,
            view_heap_capacity: 1024,
            sampler_heap_capacity: 256,
        }
    }
}

impl RayTracingConfig {
    pub fn builder() -> RayTracingConfigBuilder {
        Default::default()
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)
            .context("Failed to parse ray tracing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ray tracing config {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    /// Alignments must be powers of two and the handle must fit its own alignment.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.ray_tracing_properties().validate()?;
        Ok(())
    }

    pub fn ray_tracing_properties(&self) -> RayTracingProperties {
        RayTracingProperties {
            shader_group_handle_size: self.shader_group_handle_size,
            shader_group_handle_alignment: self.shader_group_handle_alignment,
            shader_group_base_alignment: self.shader_group_base_alignment,
            min_scratch_offset_alignment: self.min_scratch_offset_alignment,
        }
    }
}

impl RayTracingConfigBuilder {
    fn validate_alignments(&self) -> Result<(), String> {
        let defaults = RayTracingConfig::default();

        RayTracingProperties {
            shader_group_handle_size: self.shader_group_handle_size
                .unwrap_or(defaults.shader_group_handle_size),
            shader_group_handle_alignment: self.shader_group_handle_alignment
                .unwrap_or(defaults.shader_group_handle_alignment),
            shader_group_base_alignment: self.shader_group_base_alignment
                .unwrap_or(defaults.shader_group_base_alignment),
            min_scratch_offset_alignment: self.min_scratch_offset_alignment
                .unwrap_or(defaults.min_scratch_offset_alignment),
        }
        .validate()
        .map_err(|err| err.to_string())
    }
}
