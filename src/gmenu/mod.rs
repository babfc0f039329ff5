//! GMenu-side data model: `org.gtk.Menus` mirroring and `org.gtk.Actions`
//! mirroring, kept deliberately independent of the DBusMenu-facing code in
//! [`crate::window_binding`].

pub mod action_group;
pub mod model;
pub mod types;

pub use action_group::{ActionEvent, ActionGroup, ActionState};
pub use model::{MenuModel, ModelEvent};
pub use types::{MenuItem, MenuRef, Section};
