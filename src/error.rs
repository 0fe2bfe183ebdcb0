//! The structured error taxonomy (`spec.md` §7). Every operation returns
//! its own concrete error type synchronously; [`CoreError`] is a unified
//! enum any of them converts into, for callers that want the
//! `is_*_error` type predicates rather than matching on a specific variant.

use std::borrow::Cow;

use thiserror::Error;

use crate::error_scope::ErrorFilter;
use crate::id::RawId;
use crate::Epoch;

/// Errors surfaced by [`crate::registry::Registry`] operations, translated
/// from the lower-level [`crate::registry::InvalidId`] plus the additional
/// kinds a higher layer (Hub/Device) can produce.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("id is the reserved zero id")]
    InvalidId,
    #[error("resource at index {index} was never allocated")]
    ResourceNotFound { index: u32 },
    #[error("index {index} holds epoch {stored}, but id carries epoch {requested}")]
    EpochMismatch {
        index: u32,
        stored: Epoch,
        requested: Epoch,
    },
    #[error("registry has no room left for a new index")]
    RegistryFull,
    #[error("resource is still in use")]
    ResourceInUse,
    #[error("resource has already been destroyed")]
    AlreadyDestroyed,
}

impl From<crate::registry::InvalidId> for RegistryError {
    fn from(e: crate::registry::InvalidId) -> Self {
        use crate::registry::InvalidId as I;
        match e {
            I::InvalidId => RegistryError::InvalidId,
            I::NotFound { index } => RegistryError::ResourceNotFound { index },
            I::EpochMismatch {
                index,
                stored,
                requested,
            } => RegistryError::EpochMismatch {
                index,
                stored,
                requested,
            },
        }
    }
}

/// Errors tied to a `Device`'s lifecycle.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device has been lost")]
    DeviceLost,
    #[error("device has been destroyed")]
    DeviceDestroyed,
    #[error("resource has been destroyed")]
    ResourceDestroyed,
}

/// A generic structured validation failure, for checks that don't warrant
/// their own variant.
#[derive(Debug, Error)]
#[error("validation failed for {resource} field {field}: {message}")]
pub struct ValidationError {
    pub resource: Cow<'static, str>,
    pub field: Cow<'static, str>,
    pub message: Cow<'static, str>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug, Error)]
#[error("invalid id {id:?}: {message}")]
pub struct IdError {
    pub id: RawId,
    pub message: Cow<'static, str>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug, Error)]
#[error("{resource} exceeds limit {limit}: requested {actual}, maximum {maximum}")]
pub struct LimitError {
    pub limit: Cow<'static, str>,
    pub actual: u64,
    pub maximum: u64,
    pub resource: Cow<'static, str>,
}

#[derive(Debug, Error)]
#[error("{resource} requires feature {feature}")]
pub struct FeatureError {
    pub feature: Cow<'static, str>,
    pub resource: Cow<'static, str>,
}

/// The first-failing-check kind for `Device::create_buffer` (`spec.md`
/// §4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateBufferErrorKind {
    ZeroSize,
    MaxBufferSize,
    EmptyUsage,
    InvalidUsage,
    MapReadWriteExclusive,
    Hal,
}

#[derive(Debug, Error)]
#[error("failed to create buffer {label:?}: {kind:?}")]
pub struct CreateBufferError {
    pub kind: CreateBufferErrorKind,
    pub label: String,
    pub requested_size: Option<u64>,
    pub max_size: Option<u64>,
    #[source]
    pub inner: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CreateBufferError {
    pub fn new(kind: CreateBufferErrorKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            requested_size: None,
            max_size: None,
            inner: None,
        }
    }

    pub fn with_size(mut self, requested_size: u64, max_size: u64) -> Self {
        self.requested_size = Some(requested_size);
        self.max_size = Some(max_size);
        self
    }

    pub fn with_inner(mut self, inner: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateCommandEncoderErrorKind {
    Hal,
}

#[derive(Debug, Error)]
#[error("failed to create command encoder {label:?}")]
pub struct CreateCommandEncoderError {
    pub kind: CreateCommandEncoderErrorKind,
    pub label: String,
    #[source]
    pub inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

/// The encoder's finite-automaton state, mirrored publicly (`spec.md`
/// §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncoderStatus {
    Recording,
    Locked,
    Finished,
    Error,
    Consumed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("cannot perform {operation:?} while encoder is {status:?}")]
pub struct EncoderStateError {
    pub operation: Cow<'static, str>,
    pub status: EncoderStatus,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("indirect offset {offset} is not a multiple of 4")]
pub struct UnalignedIndirectOffset {
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("bind group index {index} exceeds maximum {max}")]
pub struct BindGroupIndexOutOfRange {
    pub index: u32,
    pub max: u32,
}

/// An asynchronous GPU error, as delivered to an error scope or an
/// uncaptured-error sink (`spec.md` §4.7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuError {
    pub filter: ErrorFilter,
    pub message: String,
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.filter, self.message)
    }
}
impl std::error::Error for GpuError {}

/// Unified error type any concrete operation error converts into, offering
/// the `is_*_error` type predicates named in `spec.md` §7.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Limit(#[from] LimitError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    CreateBuffer(#[from] CreateBufferError),
    #[error(transparent)]
    CreateCommandEncoder(#[from] CreateCommandEncoderError),
    #[error(transparent)]
    EncoderState(#[from] EncoderStateError),
}

impl CoreError {
    pub fn is_validation_error(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }
    pub fn is_id_error(&self) -> bool {
        matches!(self, CoreError::Id(_) | CoreError::Registry(_))
    }
    pub fn is_limit_error(&self) -> bool {
        matches!(self, CoreError::Limit(_))
    }
    pub fn is_feature_error(&self) -> bool {
        matches!(self, CoreError::Feature(_))
    }
    pub fn is_create_buffer_error(&self) -> bool {
        matches!(self, CoreError::CreateBuffer(_))
    }
    pub fn is_create_command_encoder_error(&self) -> bool {
        matches!(self, CoreError::CreateCommandEncoder(_))
    }
    pub fn is_encoder_state_error(&self) -> bool {
        matches!(self, CoreError::EncoderState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_variant() {
        let err: CoreError = CreateBufferError::new(CreateBufferErrorKind::ZeroSize, "b").into();
        assert!(err.is_create_buffer_error());
        assert!(!err.is_validation_error());
    }
}
