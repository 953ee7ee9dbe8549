//! Shader binding tables: one shader group per ray tracing shader, laid out role by role.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use raven_math::min_value_align_to_u64;

use crate::device::RayTracingProperties;
use crate::error::{ensure_structure, RtError, RtResult};

/// Marks an unused shader slot of a group, same value as `VK_SHADER_UNUSED_KHR`.
pub const SHADER_UNUSED: u32 = !0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGeneration,
    ClosestHit,
    AnyHit,
    Miss,
    Intersection,
}

/// Ray tracing roles in table order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderGroupRole {
    Generation,
    ClosestHit,
    AnyHit,
    Miss,
    Intersection,
}

impl ShaderGroupRole {
    pub const ORDER: [ShaderGroupRole; 5] = [
        ShaderGroupRole::Generation,
        ShaderGroupRole::ClosestHit,
        ShaderGroupRole::AnyHit,
        ShaderGroupRole::Miss,
        ShaderGroupRole::Intersection,
    ];

    pub fn from_stage(stage: ShaderStage) -> Option<Self> {
        match stage {
            ShaderStage::RayGeneration => Some(ShaderGroupRole::Generation),
            ShaderStage::ClosestHit => Some(ShaderGroupRole::ClosestHit),
            ShaderStage::AnyHit => Some(ShaderGroupRole::AnyHit),
            ShaderStage::Miss => Some(ShaderGroupRole::Miss),
            ShaderStage::Intersection => Some(ShaderGroupRole::Intersection),
            ShaderStage::Vertex | ShaderStage::Fragment | ShaderStage::Compute => None,
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderGroupType {
    /// Ray generation or miss.
    General,
    TrianglesHitGroup,
    ProceduralHitGroup,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShaderGroup {
    pub ty: ShaderGroupType,
    pub role: ShaderGroupRole,
    pub general_shader: u32,
    pub closest_hit_shader: u32,
    pub any_hit_shader: u32,
    pub intersection_shader: u32,
}

impl ShaderGroup {
    fn for_stage(role: ShaderGroupRole, stage_index: u32) -> Self {
        let mut group = ShaderGroup {
            ty: ShaderGroupType::General,
            role,
            general_shader: SHADER_UNUSED,
            closest_hit_shader: SHADER_UNUSED,
            any_hit_shader: SHADER_UNUSED,
            intersection_shader: SHADER_UNUSED,
        };

        match role {
            ShaderGroupRole::Generation | ShaderGroupRole::Miss => {
                group.general_shader = stage_index;
            }
            ShaderGroupRole::ClosestHit => {
                group.ty = ShaderGroupType::TrianglesHitGroup;
                group.closest_hit_shader = stage_index;
            }
            ShaderGroupRole::AnyHit => {
                group.ty = ShaderGroupType::TrianglesHitGroup;
                group.any_hit_shader = stage_index;
            }
            ShaderGroupRole::Intersection => {
                group.ty = ShaderGroupType::ProceduralHitGroup;
                group.intersection_shader = stage_index;
            }
        }

        group
    }
}

/// Compiled shader module, owned by the shader compiler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderModuleHandle(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderDescriptor {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}

impl ShaderDescriptor {
    pub fn new(stage: ShaderStage, module: ShaderModuleHandle) -> Self {
        Self {
            stage,
            module,
            entry_point: "main".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageRecord {
    pub module: ShaderModuleHandle,
    pub stage: ShaderStage,
    pub entry_point: String,
}

/// Per-role running group counts of one table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderGroupCounts {
    counts: [u32; 5],
}

impl ShaderGroupCounts {
    #[inline]
    pub fn count(&self, role: ShaderGroupRole) -> u32 {
        self.counts[role.index()]
    }

    #[inline]
    pub fn increment(&mut self, role: ShaderGroupRole) {
        self.counts[role.index()] += 1;
    }

    /// Groups of every role ordered strictly before `role`.
    pub fn preceding(&self, role: ShaderGroupRole) -> u32 {
        self.counts[..role.index()].iter().sum()
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

fn compute_offsets(counts: &ShaderGroupCounts, group_handle_size: u32) -> [u64; 5] {
    ShaderGroupRole::ORDER.map(|role| group_handle_size as u64 * counts.preceding(role) as u64)
}

/// Ingests shaders one by one, each becoming its own group in ingestion order.
#[derive(Debug)]
pub struct ShaderBindingTableBuilder {
    group_handle_size: u32,
    groups: Vec<ShaderGroup>,
    stages: Vec<StageRecord>,
    counts: ShaderGroupCounts,
    cached_offsets: Cell<Option<[u64; 5]>>,
}

impl ShaderBindingTableBuilder {
    pub fn new(group_handle_size: u32) -> Self {
        Self {
            group_handle_size,
            groups: Vec::new(),
            stages: Vec::new(),
            counts: ShaderGroupCounts::default(),
            cached_offsets: Cell::new(None),
        }
    }

    /// Add one shader and return the index of the group it was assigned to.
    pub fn push_shader(&mut self, shader: &ShaderDescriptor) -> RtResult<u32> {
        let role = ShaderGroupRole::from_stage(shader.stage)
            .ok_or_else(|| RtError::structural(format!(
                "{:?} shaders can not be part of a shader binding table", shader.stage
            )))?;

        let group_index = self.groups.len() as u32;
        self.stages.push(StageRecord {
            module: shader.module,
            stage: shader.stage,
            entry_point: shader.entry_point.clone(),
        });
        self.groups.push(ShaderGroup::for_stage(role, group_index));
        self.counts.increment(role);
        self.cached_offsets.set(None);

        Ok(group_index)
    }

    pub fn push_shaders(&mut self, shaders: &[ShaderDescriptor]) -> RtResult<()> {
        for shader in shaders {
            self.push_shader(shader)?;
        }
        Ok(())
    }

    /// Byte offset of the first group of `role` within the table.
    pub fn offset(&self, role: ShaderGroupRole) -> u64 {
        let offsets = match self.cached_offsets.get() {
            Some(offsets) => offsets,
            None => {
                let offsets = compute_offsets(&self.counts, self.group_handle_size);
                self.cached_offsets.set(Some(offsets));
                offsets
            }
        };

        offsets[role.index()]
    }

    pub fn counts(&self) -> &ShaderGroupCounts {
        &self.counts
    }

    pub fn groups(&self) -> &[ShaderGroup] {
        &self.groups
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn build(self, properties: &RayTracingProperties) -> RtResult<ShaderBindingTable> {
        ensure_structure!(!self.groups.is_empty(), "Shader binding table must contain at least one shader");

        let offsets = compute_offsets(&self.counts, self.group_handle_size);
        let layout = ShaderBindingTableLayout::new(&self.counts, properties)?;

        Ok(ShaderBindingTable {
            groups: self.groups,
            stages: self.stages,
            counts: self.counts,
            offsets,
            layout,
            destroyed: AtomicBool::new(false),
        })
    }
}

/// A region of the packed table, in bytes from the table start.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StridedRegion {
    pub offset: u64,
    pub stride: u64,
    pub size: u64,
}

/// Byte layout of a table whose group handles are padded to the handle alignment and whose
/// role regions start at the base alignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShaderBindingTableLayout {
    pub handle_size: u64,
    pub handle_size_aligned: u64,
    regions: [StridedRegion; 5],
    pub total_size: u64,
}

impl ShaderBindingTableLayout {
    pub fn new(counts: &ShaderGroupCounts, properties: &RayTracingProperties) -> RtResult<Self> {
        properties.validate()?;

        let handle_size = properties.shader_group_handle_size as u64;
        let handle_size_aligned = min_value_align_to_u64(
            handle_size,
            properties.shader_group_handle_alignment as u64,
        );
        let base_alignment = properties.shader_group_base_alignment as u64;

        let mut regions = [StridedRegion::default(); 5];
        let mut offset = 0;

        for role in ShaderGroupRole::ORDER {
            let size = min_value_align_to_u64(
                counts.count(role) as u64 * handle_size_aligned,
                base_alignment,
            );
            // The size member of the ray generation region must be equal to its stride member
            let stride = if role == ShaderGroupRole::Generation { size } else { handle_size_aligned };

            regions[role.index()] = StridedRegion {
                offset,
                stride,
                size,
            };
            offset += size;
        }

        Ok(Self {
            handle_size,
            handle_size_aligned,
            regions,
            total_size: offset,
        })
    }

    pub fn region(&self, role: ShaderGroupRole) -> StridedRegion {
        self.regions[role.index()]
    }
}

#[derive(Debug)]
pub struct ShaderBindingTable {
    groups: Vec<ShaderGroup>,
    stages: Vec<StageRecord>,
    counts: ShaderGroupCounts,
    offsets: [u64; 5],
    layout: ShaderBindingTableLayout,
    destroyed: AtomicBool,
}

impl ShaderBindingTable {
    pub fn create(properties: &RayTracingProperties, shaders: &[ShaderDescriptor]) -> RtResult<Arc<Self>> {
        let mut builder = ShaderBindingTableBuilder::new(properties.shader_group_handle_size);
        builder.push_shaders(shaders)?;

        let table = builder.build(properties)?;
        glog::trace!(
            "Created shader binding table: {} generation, {} closest hit, {} any hit, {} miss, {} intersection",
            table.counts.count(ShaderGroupRole::Generation),
            table.counts.count(ShaderGroupRole::ClosestHit),
            table.counts.count(ShaderGroupRole::AnyHit),
            table.counts.count(ShaderGroupRole::Miss),
            table.counts.count(ShaderGroupRole::Intersection),
        );

        Ok(Arc::new(table))
    }

    /// Byte offset of the first group of `role`, `handle size * groups of earlier roles`.
    #[inline]
    pub fn offset(&self, role: ShaderGroupRole) -> u64 {
        self.offsets[role.index()]
    }

    pub fn groups(&self) -> &[ShaderGroup] {
        &self.groups
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn counts(&self) -> &ShaderGroupCounts {
        &self.counts
    }

    pub fn layout(&self) -> &ShaderBindingTableLayout {
        &self.layout
    }

    /// Scatter the raw group handles, as returned by the driver in group order, into the
    /// padded per-role regions of `layout()`.
    pub fn pack_group_handles(&self, group_handles: &[u8]) -> RtResult<Vec<u8>> {
        let handle_size = self.layout.handle_size as usize;
        let handle_size_aligned = self.layout.handle_size_aligned as usize;

        ensure_structure!(
            group_handles.len() == self.groups.len() * handle_size,
            "Expected {} bytes of group handles, got {}", self.groups.len() * handle_size, group_handles.len()
        );

        let mut bytes = vec![0u8; self.layout.total_size as usize];

        for role in ShaderGroupRole::ORDER {
            let region = self.layout.region(role);
            let sources = self.groups.iter()
                .enumerate()
                .filter(|(_, group)| group.role == role)
                .map(|(index, _)| index);

            for (dst, src) in sources.enumerate() {
                let dst_start = region.offset as usize + dst * handle_size_aligned;
                let src_start = src * handle_size;

                bytes[dst_start..dst_start + handle_size]
                    .copy_from_slice(&group_handles[src_start..src_start + handle_size]);
            }
        }

        Ok(bytes)
    }

    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            glog::trace!("Destroyed shader binding table");
        }
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}
