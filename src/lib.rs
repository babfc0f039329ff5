//! Global-menu proxy: bridges GMenu (`org.gtk.Menus`/`org.gtk.Actions`)
//! clients to DBusMenu-speaking shells (`com.canonical.dbusmenu`), with an
//! X11-based window watcher and AppMenu registrar client tying the two
//! together per window.

pub mod config;
pub mod daemon;
pub mod dbus_menu_server;
pub mod error;
pub mod gmenu;
pub mod gtk_settings;
pub mod id;
pub mod registrar;
pub mod window_binding;
pub mod window_watcher;

pub use config::Config;
pub use daemon::Daemon;
pub use error::ProxyError;
