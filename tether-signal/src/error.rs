use thiserror::Error;

/// Typed errors for [`FunctionBus`](crate::FunctionBus) lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No function of the requested type is registered under the name
    #[error("no function '{name}' registered with type {type_name}")]
    NotRegistered {
        /// Name that was looked up
        name: String,
        /// Requested function type
        type_name: &'static str,
    },
}
