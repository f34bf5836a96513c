mod controller;
mod manager;
mod types;
mod view;

pub use controller::SelectionController;
pub use manager::SelectionManager;
pub use types::{ConfirmedSelection, SelectionLimits, SelectionMode, SelectionPhase};
pub use view::{NullSelectionView, SelectionView};
