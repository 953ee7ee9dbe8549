use std::sync::Arc;

use crate::device::{Device, DeviceAddress};
use crate::error::{RtError, RtResult};

use super::container::{AccelerationContainer, BuildRecorder};
use super::desc::{ContainerLevel, InstanceDescriptor};
use super::scratch::ScratchMemoryPool;

/// A created container or the error its creation failed with.
///
/// A failed handle is still usable: every operation hands back the cached creation error
/// instead of panicking, so callers may check for errors wherever it suits them.
pub struct AccelerationContainerHandle<D: Device> {
    inner: Result<Arc<AccelerationContainer<D>>, RtError>,
}

impl<D: Device> Clone for AccelerationContainerHandle<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Device> From<RtResult<Arc<AccelerationContainer<D>>>> for AccelerationContainerHandle<D> {
    fn from(result: RtResult<Arc<AccelerationContainer<D>>>) -> Self {
        if let Err(err) = &result {
            glog::warn!("Acceleration container creation failed: {}", err);
        }

        Self {
            inner: result,
        }
    }
}

impl<D: Device> AccelerationContainerHandle<D> {
    #[inline]
    pub fn is_error(&self) -> bool {
        self.inner.is_err()
    }

    pub fn error(&self) -> Option<&RtError> {
        self.inner.as_ref().err()
    }

    pub fn container(&self) -> RtResult<&Arc<AccelerationContainer<D>>> {
        self.inner.as_ref().map_err(Clone::clone)
    }

    pub fn into_result(self) -> RtResult<Arc<AccelerationContainer<D>>> {
        self.inner
    }

    pub fn level(&self) -> RtResult<ContainerLevel> {
        Ok(self.container()?.level())
    }

    pub fn handle(&self) -> RtResult<DeviceAddress> {
        self.container()?.handle()
    }

    pub fn is_built(&self) -> RtResult<bool> {
        Ok(self.container()?.is_built())
    }

    pub fn is_updated(&self) -> RtResult<bool> {
        Ok(self.container()?.is_updated())
    }

    pub fn is_destroyed(&self) -> RtResult<bool> {
        Ok(self.container()?.is_destroyed())
    }

    pub fn scratch_memory(&self) -> RtResult<ScratchMemoryPool> {
        self.container()?.scratch_memory()
    }

    pub fn encode_build(&self, recorder: &mut dyn BuildRecorder<D::Backend>) -> RtResult<()> {
        self.container()?.encode_build(recorder)
    }

    pub fn encode_update(&self, recorder: &mut dyn BuildRecorder<D::Backend>) -> RtResult<()> {
        self.container()?.encode_update(recorder)
    }

    pub fn update_instance(&self, index: u32, desc: &InstanceDescriptor<D>) -> RtResult<()> {
        self.container()?.update_instance(index, desc)
    }

    pub fn release_build_scratch(&self) -> RtResult<()> {
        self.container()?.release_build_scratch()
    }

    pub fn destroy(&self) -> RtResult<()> {
        self.container()?.destroy();
        Ok(())
    }
}
