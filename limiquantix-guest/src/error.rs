//! Error types for the guest configuration model.

use thiserror::Error;

/// Errors that can occur while building, validating or installing a guest.
#[derive(Error, Debug)]
pub enum GuestError {
    /// An attribute was given a value it cannot hold.
    #[error("Invalid value: {0}")]
    Validation(String),

    /// A guest with the requested name already exists.
    #[error("Domain named {0} already exists!")]
    NameCollision(String),

    /// Two devices claim the same PCI address.
    #[error("Duplicate address for devices {first} and {second}")]
    AddressConflict {
        /// Description of the device seen first.
        first: String,
        /// Description of the device that collided with it.
        second: String,
    },

    /// The connection does not support a requested feature.
    #[error("Feature not supported by this connection: {0}")]
    Unsupported(String),

    /// The installer could not prepare its media or boot configuration.
    #[error("Installer error: {0}")]
    Installer(String),

    /// XML parsing/serialization error.
    #[error("XML error: {0}")]
    Xml(String),

    /// The hypervisor connection reported a failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A named object was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local I/O failed (storage allocation, scratch directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for guest operations.
pub type Result<T> = std::result::Result<T, GuestError>;
