use thiserror::Error;

/// Failures of the bridge channel itself. Capability failures never show up
/// here; they travel through the `errMsg` of a response.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge channel closed")]
    ChannelClosed,

    #[error("frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("envelope codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The call resolved through the fail path; carries the `errMsg`.
    #[error("{0}")]
    Fail(String),

    /// The pending record was dropped (cancelled, or the context went away)
    /// before any response arrived.
    #[error("call abandoned before a response arrived")]
    Abandoned,
}

impl CallError {
    pub fn err_msg(&self) -> Option<&str> {
        match self {
            CallError::Fail(msg) => Some(msg),
            CallError::Abandoned => None,
        }
    }
}
