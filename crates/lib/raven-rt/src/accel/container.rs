use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::BuildInputTranslator;
use crate::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::device::{Device, DeviceAddress};
use crate::error::{ensure_structure, RtError, RtResult};

use super::desc::{
    ContainerDescriptor, ContainerFlags, ContainerLevel, ContainerUsage, GeometryDescriptor,
    InstanceDescriptor,
};
use super::handle::AccelerationContainerHandle;
use super::instance::{encode_instance, GeometryInstance};
use super::scratch::{ScratchMemoryManager, ScratchMemoryPool};
use super::validation::{validate_container_descriptor, validate_instance};

type BuildInputsOf<D> = <<D as Device>::Backend as BuildInputTranslator>::BuildInputs;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Build,
    Update,
}

/// Everything a command recorder needs to record one build or update.
pub struct BuildCommand<'a, B: BuildInputTranslator> {
    pub mode: BuildMode,
    pub level: ContainerLevel,
    pub inputs: &'a B::BuildInputs,
    /// Structure being updated, `None` for a fresh build.
    pub source: Option<DeviceAddress>,
    pub destination: DeviceAddress,
    pub scratch: DeviceAddress,
}

/// The command recording side. Containers never submit work, they only describe it.
pub trait BuildRecorder<B: BuildInputTranslator> {
    fn record_build(&mut self, command: BuildCommand<'_, B>);

    fn record_copy(&mut self, source: DeviceAddress, destination: DeviceAddress);
}

struct ContainerState<D: Device> {
    is_built: bool,
    is_updated: bool,
    is_destroyed: bool,
    /// Unique bottom-level containers instanced by a top-level container.
    geometry_containers: Vec<Arc<AccelerationContainer<D>>>,
    instances: Vec<GeometryInstance>,
    instance_buffer: Option<Arc<Buffer>>,
    build_inputs: Option<BuildInputsOf<D>>,
    scratch_memory: ScratchMemoryPool,
}

pub struct AccelerationContainer<D: Device> {
    device: Arc<D>,
    level: ContainerLevel,
    flags: ContainerFlags,
    usage: ContainerUsage,
    geometries: Vec<GeometryDescriptor>,
    instance_count: u32,
    vertex_buffers: Vec<Arc<Buffer>>,
    index_buffers: Vec<Arc<Buffer>>,
    aabb_buffers: Vec<Arc<Buffer>>,
    state: Mutex<ContainerState<D>>,
}

fn push_unique<T>(set: &mut Vec<Arc<T>>, item: &Arc<T>) {
    if !set.iter().any(|existing| Arc::ptr_eq(existing, item)) {
        set.push(item.clone());
    }
}

impl<D: Device> AccelerationContainer<D> {
    /// Create a container, folding any failure into an error handle.
    pub fn create(device: &Arc<D>, desc: &ContainerDescriptor<D>) -> AccelerationContainerHandle<D> {
        Self::new(device, desc).into()
    }

    pub fn new(device: &Arc<D>, desc: &ContainerDescriptor<D>) -> RtResult<Arc<Self>> {
        if !device.is_ray_tracing_supported() {
            glog::warn!("Acceleration container requested on a device without ray tracing");
            return Err(RtError::unsupported("Ray tracing is not supported by this device"));
        }

        device.ray_tracing_properties().validate()?;
        validate_container_descriptor(desc)?;

        let container = Arc::new(Self::from_descriptor(device.clone(), desc));
        // dropping the container on failure releases whatever was allocated so far
        container.initialize(desc)?;

        glog::trace!(
            "Created {:?} level acceleration container ({} geometries, {} instances)",
            container.level, container.geometries.len(), container.instance_count
        );
        Ok(container)
    }

    fn from_descriptor(device: Arc<D>, desc: &ContainerDescriptor<D>) -> Self {
        let mut vertex_buffers = Vec::new();
        let mut index_buffers = Vec::new();
        let mut aabb_buffers = Vec::new();

        for geometry in &desc.geometries {
            if let Some(vertex) = &geometry.vertex {
                push_unique(&mut vertex_buffers, &vertex.buffer);
            }
            if let Some(index) = &geometry.index {
                push_unique(&mut index_buffers, &index.buffer);
            }
            if let Some(aabb) = &geometry.aabb {
                push_unique(&mut aabb_buffers, &aabb.buffer);
            }
        }

        let mut geometry_containers = Vec::new();
        for container in desc.instances.iter().filter_map(|instance| instance.geometry_container.as_ref()) {
            push_unique(&mut geometry_containers, container);
        }

        Self {
            device,
            level: desc.level,
            flags: desc.flags,
            usage: desc.usage,
            geometries: desc.geometries.clone(),
            instance_count: desc.instances.len() as u32,
            vertex_buffers,
            index_buffers,
            aabb_buffers,
            state: Mutex::new(ContainerState {
                is_built: false,
                is_updated: false,
                is_destroyed: false,
                geometry_containers,
                instances: Vec::new(),
                instance_buffer: None,
                build_inputs: None,
                scratch_memory: ScratchMemoryPool::default(),
            }),
        }
    }

    fn initialize(&self, desc: &ContainerDescriptor<D>) -> RtResult<()> {
        let mut state = self.state.lock();

        // 1. encode geometries or instances into the backend layout
        let build_inputs = match self.level {
            ContainerLevel::Bottom => {
                D::Backend::bottom_level_inputs(self.flags, &desc.geometries)
            }
            ContainerLevel::Top => {
                let instances = desc.instances.iter()
                    .map(|instance| -> RtResult<GeometryInstance> {
                        let blas = instance.geometry_container.as_ref()
                            .ok_or_else(|| RtError::structural("Instance has no geometry container"))?;

                        encode_instance(instance, blas.handle()?)
                    })
                    .collect::<RtResult<Vec<_>>>()?;

                // 2. upload the encoded instances
                let instance_buffer = self.device.create_buffer(
                    BufferDesc::new_ray_tracing_input(
                        (GeometryInstance::SIZE * instances.len()) as u64,
                        BufferUsage::STORAGE,
                    ),
                    "acceleration container instance buffer",
                )?;
                state.instance_buffer = Some(instance_buffer.clone());

                self.device.upload_buffer_data(&instance_buffer, 0, GeometryInstance::slice_as_bytes(&instances))?;
                state.instances = instances;

                D::Backend::top_level_inputs(self.flags, instance_buffer.device_address(), self.instance_count)
            }
        };

        // 3. ask the hardware how much memory the build needs
        let sizes = self.device.query_prebuild_sizes(&build_inputs);
        glog::info!(
            "Acceleration container ({:?}) size: {}, scratch size (build, update): ({}, {})",
            self.level, sizes.result_size, sizes.build_scratch_size, sizes.update_scratch_size
        );

        // 4. allocate result, build and update pools
        ScratchMemoryManager::reserve(&*self.device, &sizes, &mut state.scratch_memory)?;
        state.build_inputs = Some(build_inputs);

        Ok(())
    }

    #[inline]
    pub fn level(&self) -> ContainerLevel {
        self.level
    }

    #[inline]
    pub fn flags(&self) -> ContainerFlags {
        self.flags
    }

    #[inline]
    pub fn usage(&self) -> ContainerUsage {
        self.usage
    }

    pub fn geometries(&self) -> &[GeometryDescriptor] {
        &self.geometries
    }

    #[inline]
    pub fn geometry_count(&self) -> u32 {
        self.geometries.len() as u32
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn vertex_buffers(&self) -> &[Arc<Buffer>] {
        &self.vertex_buffers
    }

    pub fn index_buffers(&self) -> &[Arc<Buffer>] {
        &self.index_buffers
    }

    pub fn aabb_buffers(&self) -> &[Arc<Buffer>] {
        &self.aabb_buffers
    }

    pub fn geometry_containers(&self) -> Vec<Arc<AccelerationContainer<D>>> {
        self.state.lock().geometry_containers.clone()
    }

    /// Encoded instance records, in instance order.
    pub fn instances(&self) -> Vec<GeometryInstance> {
        self.state.lock().instances.clone()
    }

    pub fn instance_buffer(&self) -> Option<Arc<Buffer>> {
        self.state.lock().instance_buffer.clone()
    }

    pub fn is_built(&self) -> bool {
        self.state.lock().is_built
    }

    pub fn is_updated(&self) -> bool {
        self.state.lock().is_updated
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().is_destroyed
    }

    /// Device address of the result memory, what instances embed to reference this container.
    pub fn handle(&self) -> RtResult<DeviceAddress> {
        let state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Acceleration container is destroyed"));
        }

        state.scratch_memory.result.as_ref()
            .map(|result| result.device_address)
            .ok_or_else(|| RtError::structural("Acceleration container has no result memory"))
    }

    pub fn scratch_memory(&self) -> RtResult<ScratchMemoryPool> {
        let state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Acceleration container is destroyed"));
        }
        Ok(state.scratch_memory.clone())
    }

    /// Read the backend build inputs.
    pub fn with_build_inputs<R>(&self, f: impl FnOnce(&BuildInputsOf<D>) -> R) -> RtResult<R> {
        let state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Acceleration container is destroyed"));
        }

        state.build_inputs.as_ref()
            .map(f)
            .ok_or_else(|| RtError::structural("Acceleration container is not initialized"))
    }

    /// Fail if this container can not be referenced by a submission.
    pub fn validate_can_use_in_submit(&self) -> RtResult<()> {
        if self.is_destroyed() {
            return Err(RtError::destroyed("Destroyed acceleration container used in submit"));
        }
        Ok(())
    }

    fn validate_geometry_containers(state: &ContainerState<D>) -> RtResult<()> {
        for blas in &state.geometry_containers {
            if blas.is_destroyed() {
                return Err(RtError::reference("Linked geometry container must not be destroyed"));
            }
            ensure_structure!(
                blas.is_built(),
                "Linked geometry container must be built before the top-level container"
            );
        }
        Ok(())
    }

    pub fn encode_build(&self, recorder: &mut dyn BuildRecorder<D::Backend>) -> RtResult<()> {
        let mut state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Cannot build a destroyed acceleration container"));
        }
        ensure_structure!(!state.is_built, "Acceleration container is already built");

        if self.level == ContainerLevel::Top {
            Self::validate_geometry_containers(&state)?;
        }

        let destination = state.scratch_memory.result.as_ref()
            .map(|result| result.device_address)
            .ok_or_else(|| RtError::structural("Acceleration container has no result memory"))?;
        let scratch = state.scratch_memory.build.as_ref()
            .map(|build| build.device_address)
            .ok_or_else(|| RtError::structural("Acceleration container has no build scratch memory"))?;
        let inputs = state.build_inputs.as_ref()
            .ok_or_else(|| RtError::structural("Acceleration container is not initialized"))?;

        recorder.record_build(BuildCommand {
            mode: BuildMode::Build,
            level: self.level,
            inputs,
            source: None,
            destination,
            scratch,
        });
        state.is_built = true;

        glog::trace!("Recorded {:?} level acceleration container build", self.level);
        Ok(())
    }

    pub fn encode_update(&self, recorder: &mut dyn BuildRecorder<D::Backend>) -> RtResult<()> {
        let mut state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Cannot update a destroyed acceleration container"));
        }
        ensure_structure!(state.is_built, "Acceleration container must be built before it is updated");
        ensure_structure!(
            self.flags.contains(ContainerFlags::ALLOW_UPDATE),
            "Acceleration container was not created with ALLOW_UPDATE"
        );

        if self.level == ContainerLevel::Top {
            Self::validate_geometry_containers(&state)?;
        }

        let destination = state.scratch_memory.result.as_ref()
            .map(|result| result.device_address)
            .ok_or_else(|| RtError::structural("Acceleration container has no result memory"))?;
        let scratch = state.scratch_memory.update.as_ref()
            .map(|update| update.device_address)
            .ok_or_else(|| RtError::structural("Acceleration container has no update scratch memory"))?;
        let inputs = state.build_inputs.as_ref()
            .ok_or_else(|| RtError::structural("Acceleration container is not initialized"))?;

        recorder.record_build(BuildCommand {
            mode: BuildMode::Update,
            level: self.level,
            inputs,
            source: Some(destination),
            destination,
            scratch,
        });
        state.is_updated = true;

        glog::trace!("Recorded {:?} level acceleration container update", self.level);
        Ok(())
    }

    pub fn encode_copy(
        source: &Self,
        destination: &Self,
        recorder: &mut dyn BuildRecorder<D::Backend>,
    ) -> RtResult<()> {
        ensure_structure!(
            !std::ptr::eq(source, destination),
            "Cannot copy an acceleration container onto itself"
        );
        ensure_structure!(
            source.level == destination.level,
            "Cannot copy between acceleration containers of different levels"
        );

        source.validate_can_use_in_submit()?;
        destination.validate_can_use_in_submit()?;
        ensure_structure!(source.is_built(), "Source acceleration container must be built before copying");
        ensure_structure!(destination.is_built(), "Destination acceleration container must be built before copying");

        recorder.record_copy(source.handle()?, destination.handle()?);
        Ok(())
    }

    /// Free the build scratch once the recorded build retired.
    pub fn release_build_scratch(&self) -> RtResult<()> {
        let mut state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Acceleration container is destroyed"));
        }
        ensure_structure!(state.is_built, "Build scratch is still needed by the pending build");

        ScratchMemoryManager::release_build(&*self.device, &mut state.scratch_memory);
        Ok(())
    }

    /// Re-encode a single instance and patch it into the instance buffer.
    pub fn update_instance(&self, index: u32, desc: &InstanceDescriptor<D>) -> RtResult<()> {
        ensure_structure!(
            self.level == ContainerLevel::Top,
            "Only top-level containers support instance updates"
        );

        let mut state = self.state.lock();

        if state.is_destroyed {
            return Err(RtError::destroyed("Cannot update an instance of a destroyed acceleration container"));
        }
        ensure_structure!(
            index < self.instance_count,
            "Instance index {} is out of range ({} instances)", index, self.instance_count
        );

        validate_instance(index as usize, desc)?;
        let blas = desc.geometry_container.as_ref()
            .ok_or_else(|| RtError::structural("Instance has no geometry container"))?;
        let record = encode_instance(desc, blas.handle()?)?;

        let instance_buffer = state.instance_buffer.clone()
            .ok_or_else(|| RtError::structural("Acceleration container has no instance buffer"))?;
        self.device.upload_buffer_data(
            &instance_buffer,
            index as u64 * GeometryInstance::SIZE as u64,
            record.as_bytes(),
        )?;

        state.instances[index as usize] = record;
        push_unique(&mut state.geometry_containers, blas);

        Ok(())
    }

    /// Release every device allocation. Calling it again does nothing.
    pub fn destroy(&self) {
        let mut state = self.state.lock();

        if state.is_destroyed {
            return;
        }

        ScratchMemoryManager::release(&*self.device, &mut state.scratch_memory);
        if let Some(instance_buffer) = state.instance_buffer.take() {
            self.device.destroy_buffer(&instance_buffer);
        }
        state.build_inputs = None;
        state.is_destroyed = true;

        glog::trace!("Destroyed {:?} level acceleration container", self.level);
    }
}

impl<D: Device> Drop for AccelerationContainer<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
