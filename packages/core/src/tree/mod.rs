//! Client-side outline tree
//!
//! The Node Table and Adjacency Map live together in [`OutlineStore`]; every
//! edit goes through the tree editor operations so both stay consistent and
//! the [`MutationTracker`] records what the next sync batch must carry.

mod adjacency;
mod editor;
mod error;
mod events;
mod focus;
mod navigator;
mod store;
mod tracker;

pub use adjacency::{AdjacencyMap, ROOT_ID};
pub use error::TreeEditError;
pub use events::OutlineEvent;
pub use focus::FocusRegistry;
pub use navigator::{
    closest, flatten_visible, focus_after_delete, next_outside_subtree, resolve_focus, Direction,
};
pub use store::{OutlineStore, SharedOutline};
pub use tracker::{FlightSnapshot, MutationKind, MutationTracker, PendingMutations};
