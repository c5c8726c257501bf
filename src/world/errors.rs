use thiserror::Error;

use super::types::NodeId;

/// Faults raised by the containment engine.
///
/// These mark calls that break the engine's preconditions. Placement outcomes
/// such as "too large" or "already there" are not errors; they come back as
/// `Ok(false)` with text in the caller's report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorldError {
    /// The node is not live (never committed, or already discarded).
    #[error("node {node} is not live")]
    NotLive { node: NodeId },

    /// The node was spawned but never committed into the world.
    #[error("node {node} has not been initialized")]
    NotInitialized { node: NodeId },

    /// `commit` was called twice for the same node.
    #[error("node {node} is already initialized")]
    AlreadyInitialized { node: NodeId },

    /// The node has been destroyed.
    #[error("node {node} is doomed")]
    Doomed { node: NodeId },

    /// Rooms are roots and never change container.
    #[error("room {node} cannot be moved")]
    RoomCannotMove { node: NodeId },

    /// Initial placement was refused; the node has been discarded.
    #[error("node {node} does not fit: {reason}")]
    DoesNotFit { node: NodeId, reason: String },

    /// The notification worker pool could not be started.
    #[error("dispatch error: {0}")]
    Dispatch(String),
}
