use crate::ViewI;

/// Errors returned by the toolkit.
///
/// Most variants are caller contract violations: they are reported immediately and retrying the same call will fail the same way.
#[derive(Debug, thiserror::Error)]
pub enum UiError {
    /// `add_view` was called with a view that is still attached to another parent.
    #[error("view {0:?} already has a superview")]
    AlreadyAttached(ViewI),

    /// `add_view` would make a view its own ancestor.
    #[error("adding {0:?} would create a cycle")]
    WouldCycle(ViewI),

    /// A quad was drawn without one of its required geometry fields.
    #[error("{0} is missing")]
    MissingGeometry(&'static str),

    /// `pop_state` was called with an empty state stack.
    #[error("driver state stack underflow")]
    StateUnderflow,

    /// `cancel` was called on an event that can't be cancelled.
    #[error("unable to cancel event")]
    NotCancellable,

    /// `disable_realtime` was called more times than `enable_realtime`.
    #[error("underflow on realtime counter")]
    RealtimeUnderflow,

    /// A dispatch target or view handle doesn't refer to a live view.
    #[error("invalid target: {0:?} is not a live view")]
    InvalidTarget(ViewI),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
