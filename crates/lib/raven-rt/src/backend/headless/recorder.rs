use crate::accel::{BuildCommand, BuildMode, BuildRecorder, ContainerLevel};
use crate::backend::{BuildInputTranslator, BuildInputsSummary};
use crate::device::DeviceAddress;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    Build {
        mode: BuildMode,
        level: ContainerLevel,
        summary: BuildInputsSummary,
        source: Option<DeviceAddress>,
        destination: DeviceAddress,
        scratch: DeviceAddress,
    },
    Copy {
        source: DeviceAddress,
        destination: DeviceAddress,
    },
}

/// Records acceleration container commands into a list instead of a command buffer.
#[derive(Debug, Default)]
pub struct HeadlessRecorder {
    commands: Vec<RecordedCommand>,
}

impl HeadlessRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl<B: BuildInputTranslator> BuildRecorder<B> for HeadlessRecorder {
    fn record_build(&mut self, command: BuildCommand<'_, B>) {
        self.commands.push(RecordedCommand::Build {
            mode: command.mode,
            level: command.level,
            summary: B::summarize(command.inputs),
            source: command.source,
            destination: command.destination,
            scratch: command.scratch,
        });
    }

    fn record_copy(&mut self, source: DeviceAddress, destination: DeviceAddress) {
        self.commands.push(RecordedCommand::Copy {
            source,
            destination,
        });
    }
}
