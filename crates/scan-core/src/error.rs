use crate::hal::HalError;
use std::fmt;
use thiserror::Error;

/// Which echo transition a poll was waiting on when it gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    Rising,
    Falling,
}

impl fmt::Display for EchoEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EchoEdge::Rising => write!(f, "rising"),
            EchoEdge::Falling => write!(f, "falling"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no {edge} edge on the echo line within {waited_us}us")]
    EchoTimeout { edge: EchoEdge, waited_us: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Hardware(#[from] HalError),

    #[error("failed to write sample output: {0}")]
    Output(#[from] std::io::Error),

    #[error("sweep aborted at angle {angle}: {source}")]
    SweepAborted {
        angle: u32,
        #[source]
        source: Box<ScanError>,
    },
}
