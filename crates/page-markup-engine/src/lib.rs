pub mod anchor;
pub mod controller;
pub mod debounce;
pub mod dom;
pub mod geometry;
pub mod layout;
pub mod markup;
pub mod overlay;
pub mod reconcile;
pub mod store;

// Re-export key types for easier usage
pub use anchor::*;
pub use controller::*;
pub use debounce::*;
pub use dom::*;
pub use geometry::*;
pub use layout::*;
pub use markup::*;
pub use overlay::*;
pub use reconcile::*;
pub use store::*;
