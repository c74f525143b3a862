use std::fmt;

use thiserror::Error;

/// Boxed error type accepted from external collaborators (generators,
/// constructors) whose concrete error types this crate does not know.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Intentional discard of the current draw pass.
///
/// A rejection is not a bug condition: a callback raises it to throw away a
/// partially drawn instance (for example when an invalid attribute
/// combination shows up early), and the caller simply tries a fresh pass.
#[derive(Debug, Clone, Default)]
pub struct Rejection {
    reason: Option<String>,
}

impl Rejection {
    pub fn new() -> Self {
        Self { reason: None }
    }

    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "draw pass rejected: {reason}"),
            None => write!(f, "draw pass rejected"),
        }
    }
}

/// Resolution-time failures. These surface before any draw begins and are
/// always attribute-name-qualified; none of them is ever silently resolved.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("record type '{record}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute { record: String, attribute: String },

    #[error("record type '{record}' declares binding '{binding}' more than once")]
    DuplicateBinding { record: String, binding: String },

    #[error("binding '{binding}' names no attributes")]
    EmptyBinding { binding: String },

    #[error("binding '{binding}' references unknown attribute '{attribute}'")]
    UnknownAttribute { binding: String, attribute: String },

    #[error("binding '{binding}' targets non-drawable attribute '{attribute}'")]
    NotDrawable { binding: String, attribute: String },

    #[error(
        "attribute '{attribute}' is claimed by manual-draw bindings '{first}' and '{second}'"
    )]
    AmbiguousManualDraw {
        attribute: String,
        first: String,
        second: String,
    },

    #[error("no generator for attribute '{attribute}'")]
    Inference {
        attribute: String,
        #[source]
        source: crate::sampler::InferError,
    },
}

/// Pass-time failures. A `Rejected` value aborts the pass cleanly and is
/// reported as "no instance this attempt"; every other variant is fatal to
/// the pass and propagates to the caller with the origin context attached.
#[derive(Error, Debug)]
pub enum DrawError {
    #[error("{0}")]
    Rejected(Rejection),

    #[error("attribute '{0}' has not been drawn yet")]
    NotYetDrawn(String),

    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("{0}")]
    Message(String),

    #[error("{0}")]
    External(BoxError),

    #[error("generator for attribute '{attribute}' failed: {source}")]
    Generator { attribute: String, source: Box<DrawError> },

    #[error("manual-draw binding '{binding}' failed while drawing attribute '{attribute}': {source}")]
    ManualDraw {
        binding: String,
        attribute: String,
        source: Box<DrawError>,
    },

    #[error("post-draw binding '{binding}' failed after attribute '{attribute}': {source}")]
    PostDraw {
        binding: String,
        attribute: String,
        source: Box<DrawError>,
    },

    #[error("constructor for record type '{record}' failed: {source}")]
    Construction { record: String, source: Box<DrawError> },
}

impl DrawError {
    /// Discard the current pass without a stated reason.
    pub fn reject() -> Self {
        DrawError::Rejected(Rejection::new())
    }

    /// Discard the current pass, recording why.
    pub fn reject_because(reason: impl Into<String>) -> Self {
        DrawError::Rejected(Rejection::because(reason))
    }

    pub fn message(message: impl Into<String>) -> Self {
        DrawError::Message(message.into())
    }

    pub fn external(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        DrawError::External(Box::new(error))
    }

    /// True when this error is an intentional discard rather than a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DrawError::Rejected(_))
    }

    // Context wrappers used by the engine. Rejections pass through unchanged
    // so they stay recognizable at the pass boundary.

    pub(crate) fn in_generator(self, attribute: &str) -> Self {
        if self.is_rejection() {
            return self;
        }
        DrawError::Generator {
            attribute: attribute.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_manual_draw(self, binding: &str, attribute: &str) -> Self {
        if self.is_rejection() {
            return self;
        }
        DrawError::ManualDraw {
            binding: binding.to_string(),
            attribute: attribute.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_post_draw(self, binding: &str, attribute: &str) -> Self {
        if self.is_rejection() {
            return self;
        }
        DrawError::PostDraw {
            binding: binding.to_string(),
            attribute: attribute.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_construction(self, record: &str) -> Self {
        if self.is_rejection() {
            return self;
        }
        DrawError::Construction {
            record: record.to_string(),
            source: Box::new(self),
        }
    }
}

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
pub type DrawResult<T> = std::result::Result<T, DrawError>;
