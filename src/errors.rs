//! Error Types
//!
//! This module defines the error types used throughout the render graph.
//!
//! # Overview
//!
//! The main error type [`SableError`] covers all failure modes:
//! - Graph configuration errors (bad resource references, conflicting uses)
//! - Dependency topology errors (cycles)
//! - Transient memory exhaustion
//! - Errors forwarded from the graphics backend
//! - Errors returned by user pass callbacks
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, SableError>`.
//!
//! Errors discovered while building a graph surface at the offending call;
//! errors discovered during compilation surface from
//! [`Executor::execute`](crate::execute::Executor::execute). Nothing is
//! recovered internally.

use thiserror::Error;

/// The main error type for the render graph core.
///
/// Each variant carries enough context to identify the offending pass or
/// resource by name.
#[derive(Error, Debug)]
pub enum SableError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A pass referenced a resource that is not registered in this graph.
    #[error("Pass '{pass}' references an unknown resource (index {index})")]
    InvalidResource {
        /// Name of the offending pass
        pass: String,
        /// The out-of-range resource index
        index: u32,
    },

    /// Two uses of the same subresource within one pass require different
    /// image layouts.
    #[error(
        "Pass '{pass}' declares incompatible uses of '{resource}': layout {first:?} vs {second:?}"
    )]
    IncompatibleUses {
        /// Name of the offending pass
        pass: String,
        /// Name of the resource with conflicting declarations
        resource: String,
        /// Layout required by the earlier declaration
        first: crate::rhi::TextureLayout,
        /// Layout required by the later declaration
        second: crate::rhi::TextureLayout,
    },

    /// A use declaration requires a layout the resource's usage flags cannot
    /// support.
    #[error("Use of '{resource}' requires layout {layout:?}, unsupported by its usage flags")]
    UnsupportedLayout {
        /// Name of the resource
        resource: String,
        /// The layout the use declaration asked for
        layout: crate::rhi::TextureLayout,
    },

    /// A use declaration addressed a subresource outside the texture's
    /// mip/layer/aspect grid.
    #[error("Pass '{pass}' addresses missing subresource (mip {mip}, layer {layer}) of '{resource}'")]
    InvalidSubresource {
        /// Name of the offending pass
        pass: String,
        /// Name of the texture
        resource: String,
        /// Requested mip level
        mip: u32,
        /// Requested array layer
        layer: u32,
    },

    /// A texture registered as read-only external was declared with a write
    /// use.
    #[error("Pass '{pass}' writes read-only external texture '{resource}'")]
    ReadOnlyWrite {
        /// Name of the offending pass
        pass: String,
        /// Name of the read-only texture
        resource: String,
    },

    /// A second swapchain image was registered, or an external texture was
    /// re-registered with a conflicting read-only flag.
    #[error("Conflicting registration: {0}")]
    RegistrationConflict(String),

    /// The swapchain image is used by a pass whose queue cannot present.
    #[error("Pass '{pass}' uses the swapchain image on non-present-capable queue {queue}")]
    NonPresentQueue {
        /// Name of the offending pass
        pass: String,
        /// Index of the queue the pass runs on
        queue: u32,
    },

    // ========================================================================
    // Topology Errors
    // ========================================================================
    /// The union of explicit and implicit dependency edges contains a cycle.
    #[error("Dependency cycle involving pass '{pass}'")]
    DependencyCycle {
        /// Name of one pass on the cycle
        pass: String,
    },

    // ========================================================================
    // Capacity Errors
    // ========================================================================
    /// The transient memory pool could not satisfy an allocation request.
    #[error("Out of transient memory: {size} bytes ({category:?}) for '{resource}'")]
    OutOfTransientMemory {
        /// Name of the resource being placed
        resource: String,
        /// Requested allocation size in bytes
        size: u64,
        /// Heap category the request was made against
        category: crate::rhi::ResourceCategory,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// An error forwarded from the underlying graphics backend.
    #[error("Backend error: {0}")]
    Backend(String),

    // ========================================================================
    // Callback Errors
    // ========================================================================
    /// A pass callback returned an error of its own.
    #[error("Pass '{pass}' callback failed: {source}")]
    PassCallback {
        /// Name of the pass whose callback failed
        pass: String,
        /// The callback's error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Alias for `Result<T, SableError>`.
pub type Result<T> = std::result::Result<T, SableError>;
