pub mod graph;
pub mod relational;
pub mod vector;

pub use graph::{GraphNode, GraphStore, RelationshipRow};
pub use relational::RelationalStore;
pub use vector::VectorStore;
