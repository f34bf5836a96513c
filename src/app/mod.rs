//! Interactive host wiring keyboard commands to selection, capture and layout

mod controller;
mod keyboard;
mod persistence;
mod runtime;
mod shutdown;
mod types;
mod view;


pub use controller::ShareApp;
pub use keyboard::{map_key_event, KeyEncoding, KeyboardInputHandler};
pub use persistence::SharingFlag;
pub use types::{
    selection_message, AppCommand, ButtonState, ControlInputs, ControlState, Notification,
    NotificationLevel, PointerEvent, SharingKind, ShutdownReason, UserMessage,
};
pub use view::{LogView, ShareView};
