use pentacle_common::ObjId;
use pentacle_kernel::KernelError;

use crate::loopscript::LoopScriptError;

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("object {0} does not exist")]
    NoSuchObject(ObjId),
    #[error("object {0} is not a container")]
    NotAContainer(ObjId),
    #[error("object {item} cannot be placed inside {container}")]
    ContainerLoop { item: ObjId, container: ObjId },
    #[error("object id {0} is already in use")]
    IdInUse(ObjId),
    #[error("object id space exhausted")]
    IdSpaceExhausted,
    #[error("map {0} does not exist")]
    NoSuchMap(u32),
    #[error("intrinsic {0:?} is not handled natively")]
    UnsupportedIntrinsic(crate::intrinsics::Intrinsic),
    #[error("intrinsic {name} expects {expected} arguments, got {got}")]
    IntrinsicArgs {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("inconsistent world state: {0}")]
    Inconsistent(String),
    #[error("config: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    LoopScript(#[from] LoopScriptError),
}
