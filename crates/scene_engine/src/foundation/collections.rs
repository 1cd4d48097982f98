//! Arena handles shared across the scene and render layers
//!
//! Nodes of every manager live in one arena; handles stay valid until the
//! node is destroyed and never alias a later node.

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a node in the scene graph arena
    pub struct NodeId;

    /// Handle to a scene manager owned by the scene graph
    pub struct ManagerId;
}
