/// Stable error codes surfaced in JSONL events and used for CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ValidationError = 3,
    TaskNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    RunnerNotFound = 13,
    NodeFailed = 20,
    MissingInput = 21,
    InvalidPayload = 22,
    Timeout = 30,
    Cancelled = 31,
    Busy = 32,
    ConfigError = 40,
    IoError = 41,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
