//! `com.canonical.AppMenu.Registrar` client: tells the shell which object
//! path serves a window's DBusMenu. No registrar service is implemented
//! here, only the client side used to announce our own object.

use zbus::Proxy;
use zvariant::ObjectPath;

const REGISTRAR_BUS: &str = "com.canonical.AppMenu.Registrar";
const REGISTRAR_PATH: &str = "/com/canonical/AppMenu/Registrar";
const REGISTRAR_INTERFACE: &str = "com.canonical.AppMenu.Registrar";

/// Client handle bound to one D-Bus connection and one menu object path.
pub struct RegistrarClient {
    connection: zbus::Connection,
    service: String,
    object_path: String,
}

impl RegistrarClient {
    pub fn new(connection: zbus::Connection, service: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            connection,
            service: service.into(),
            object_path: object_path.into(),
        }
    }

    async fn proxy(&self) -> zbus::Result<Proxy<'_>> {
        Proxy::new(&self.connection, REGISTRAR_BUS, REGISTRAR_PATH, REGISTRAR_INTERFACE).await
    }

    /// Register `window_id` against our menu object. Tries the 3-argument
    /// form first (carries our well-known service name explicitly, which
    /// some shells need to resolve the menu even when only the unique bus
    /// name is visible) and falls back to the 2-argument form.
    pub async fn register_window(&self, window_id: u32) -> zbus::Result<()> {
        let proxy = self.proxy().await?;
        let path = ObjectPath::try_from(self.object_path.as_str())?;

        let three_arg: zbus::Result<()> = proxy
            .call("RegisterWindow", &(window_id, self.service.as_str(), path.clone()))
            .await;
        if three_arg.is_ok() {
            return Ok(());
        }
        log::debug!("3-arg RegisterWindow failed for window {window_id}, trying 2-arg form");
        proxy.call("RegisterWindow", &(window_id, path)).await
    }

    pub async fn unregister_window(&self, window_id: u32) -> zbus::Result<()> {
        let proxy = self.proxy().await?;
        proxy.call("UnregisterWindow", &(window_id,)).await
    }
}
