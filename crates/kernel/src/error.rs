use pentacle_common::ProcId;

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("no loader registered for process class `{0}`")]
    UnknownClass(String),
    #[error("process {0} is running and cannot be captured")]
    ProcessRunning(ProcId),
    #[error("failed to encode process payload: {0}")]
    PayloadEncode(String),
    #[error("failed to decode `{class}` payload: {reason}")]
    PayloadDecode { class: String, reason: String },
    #[error("saved process {0} has no allocated pid")]
    UnallocatedPid(ProcId),
    #[error("pid {0} appears twice in saved state")]
    DuplicatePid(ProcId),
}
