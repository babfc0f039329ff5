//! Error types for the menu translation engine and its ambient services.

use thiserror::Error;

/// Errors raised while tracking a single GMenu subscription tree.
#[derive(Error, Debug)]
pub enum MenuModelError {
    /// `org.gtk.Menus.Start` failed for the given subscription id.
    #[error("failed to subscribe to menu {id}: {source}")]
    StartFailed {
        /// The subscription id that failed to start.
        id: u32,
        /// The underlying D-Bus error.
        #[source]
        source: zbus::Error,
    },

    /// `org.gtk.Menus.End` failed for the given subscription ids.
    #[error("failed to unsubscribe from menus {ids:?}: {source}")]
    StopFailed {
        /// The subscription ids that failed to stop.
        ids: Vec<u32>,
        /// The underlying D-Bus error.
        #[source]
        source: zbus::Error,
    },

    /// An id produced by a `Changed` delta or `Start` reply did not fit the
    /// packed identifier range.
    #[error("menu id out of range: {0}")]
    IdOutOfRange(#[from] IdError),
}

/// Errors raised while tracking an `org.gtk.Actions` group.
#[derive(Error, Debug)]
pub enum ActionGroupError {
    /// `org.gtk.Actions.DescribeAll` failed.
    #[error("failed to load actions: {0}")]
    DescribeAllFailed(#[source] zbus::Error),

    /// `org.gtk.Actions.Activate` failed.
    #[error("failed to activate action {name}: {source}")]
    ActivateFailed {
        /// The action name that failed to activate.
        name: String,
        /// The underlying D-Bus error.
        #[source]
        source: zbus::Error,
    },
}

/// Errors raised by a [`crate::window_binding::WindowBinding`].
#[derive(Error, Debug)]
pub enum WindowBindingError {
    /// Publishing the per-window DBusMenu object failed.
    #[error("failed to publish menu object at {path}: {source}")]
    PublishFailed {
        /// The object path that could not be registered.
        path: String,
        /// The underlying D-Bus error.
        #[source]
        source: zbus::Error,
    },

    /// A menu model belonging to this binding failed.
    #[error(transparent)]
    Menu(#[from] MenuModelError),

    /// An action group belonging to this binding failed.
    #[error(transparent)]
    Action(#[from] ActionGroupError),
}

/// Errors raised while packing/unpacking DBusMenu item identifiers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdError {
    /// The subscription id does not fit in the 11 bits reserved for it.
    #[error("subscription id {0} exceeds the packable range")]
    SubscriptionOutOfRange(u32),
    /// The section index does not fit in the 10 bits reserved for it.
    #[error("section index {0} exceeds the packable range")]
    SectionOutOfRange(u32),
    /// The item index does not fit in the 10 bits reserved for it.
    #[error("item index {0} exceeds the packable range")]
    IndexOutOfRange(u32),
}

/// Errors raised by the ambient X11 window watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The X11 library could not be loaded (`libX11.so` missing).
    #[error("failed to load the X11 client library: {0}")]
    LibraryLoad(String),

    /// `XOpenDisplay` returned null.
    #[error("failed to open the X11 display")]
    DisplayOpenFailed,

    /// Interning a required atom failed.
    #[error("failed to intern X11 atom {0}")]
    AtomInternFailed(&'static str),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The XDG base directories could not be resolved.
    #[error("failed to resolve XDG base directories: {0}")]
    Xdg(#[from] xdg::BaseDirectoriesError),

    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that failed to read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed as TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The path that failed to parse.
        path: String,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Aggregate error type for anything that crosses module boundaries inside
/// the engine. The process entry point works in terms of `anyhow::Result`
/// instead; this type exists for internal propagation with `?`.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// A window binding failed.
    #[error(transparent)]
    WindowBinding(#[from] WindowBindingError),
    /// A menu model failed.
    #[error(transparent)]
    Menu(#[from] MenuModelError),
    /// An action group failed.
    #[error(transparent)]
    Action(#[from] ActionGroupError),
    /// The window watcher failed.
    #[error(transparent)]
    Watcher(#[from] WatcherError),
    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A generic D-Bus error not otherwise categorized.
    #[error(transparent)]
    Zbus(#[from] zbus::Error),
}
