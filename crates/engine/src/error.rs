use std::fmt;

use pathtracer_render::BackendError;

use crate::world::WorldError;

/// Lifecycle phase in which a system hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Update,
    Render,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Update => "update",
            Phase::Render => "render",
        })
    }
}

/// Failure signalled by a system hook.
///
/// Fatal errors end the frame loop; everything else is recorded as a
/// diagnostic and the frame continues.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("{0}")]
    Recoverable(String),
    #[error("{0}")]
    Fatal(String),
    #[error("required system {0} is not registered")]
    MissingDependency(&'static str),
    #[error("gpu backend: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    World(#[from] WorldError),
}

impl SystemError {
    pub fn recoverable(msg: impl Into<String>) -> Self {
        Self::Recoverable(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Recoverable(_) | Self::World(_) => false,
            Self::Fatal(_) | Self::MissingDependency(_) => true,
            Self::Backend(e) => !e.is_recoverable(),
        }
    }
}

/// Errors from engine construction and the frame loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("system {0} registered twice")]
    DuplicateSystem(&'static str),
    #[error("dependency cycle among systems: {0:?}")]
    DependencyCycle(Vec<&'static str>),
    #[error("system {system} failed during {phase}: {source}")]
    SystemFailed {
        system: &'static str,
        phase: Phase,
        #[source]
        source: SystemError,
    },
    #[error("system {0} is not part of this engine")]
    MissingSystem(&'static str),
    #[error("gpu backend: {0}")]
    Backend(#[from] BackendError),
    #[error("window platform: {0}")]
    Platform(#[from] crate::window::PlatformError),
    #[error("engine has been shut down")]
    ShutDown,
}
