//! Error types for conditions that callers may want to match on.
//!
//! Everything else in the crate is reported through `anyhow::Error` with
//! context attached; these variants travel inside it and can be recovered
//! with `err.downcast_ref::<DataModuleError>()`.

use crate::sampler::SamplerKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DataModuleError {
    /// A saved sampler state was produced by a different kind of sampler.
    #[error("Sampler state mismatch: state was saved by a {found} sampler but the loader uses a {expected} sampler")]
    SamplerStateMismatch {
        expected: SamplerKind,
        found: SamplerKind,
    },

    /// A saved sampler state has the right kind but was taken with other parameters.
    #[error("Sampler state parameter mismatch for '{param}': state has {found}, sampler has {expected}")]
    SamplerParamMismatch {
        param: &'static str,
        expected: String,
        found: String,
    },

    /// The cut does not carry a field the dataset needs.
    #[error("Cut '{cut_id}' has no {field}")]
    MissingCutField { cut_id: String, field: &'static str },

    /// Precomputed features are stored in a format this crate cannot read.
    #[error("Unsupported feature storage type '{0}' (expected 'safetensors')")]
    UnsupportedStorage(String),

    /// The recording references an audio source this crate cannot open.
    #[error("Unsupported audio source type '{0}' (expected 'file')")]
    UnsupportedAudioSource(String),
}
