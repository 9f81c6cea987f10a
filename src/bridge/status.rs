//! Status Map

use crate::api::Status;
use crate::engine::EngineStatus;

/// Maps an engine lifecycle state to its standard counterpart.
///
/// The match is exhaustive, so a new engine state fails to compile here
/// instead of falling back to a guess.
pub fn adapt_status(status: EngineStatus) -> Status {
    match status {
        EngineStatus::Uninitialised => Status::Uninitialised,
        EngineStatus::Alive => Status::Started,
        EngineStatus::Shutdown => Status::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_engine_status_maps() {
        assert_eq!(adapt_status(EngineStatus::Uninitialised), Status::Uninitialised);
        assert_eq!(adapt_status(EngineStatus::Alive), Status::Started);
        assert_eq!(adapt_status(EngineStatus::Shutdown), Status::Stopped);
    }
}
