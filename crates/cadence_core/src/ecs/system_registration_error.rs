use thiserror::Error;

/// Errors that can occur while registering or looking up a system.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemRegistrationError {
    #[error("system '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("system '{name}' does not access any components")]
    EmptyAccess { name: String },

    #[error("no system named '{name}' is registered")]
    UnknownSystem { name: String },
}
