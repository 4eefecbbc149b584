//! Errors raised while turning a runtime snapshot into a `Container`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// A shared-network container names a root that is not in the registry.
    #[error("root container '{root}' for '{name}' not found")]
    RootNotFound { name: String, root: String },

    /// The snapshot carries neither `Name` nor `Names`.
    #[error("container {id} has no name")]
    MissingName { id: String },
}
