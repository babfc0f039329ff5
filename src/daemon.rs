//! The orchestrator: owns window discovery, the shared bus connection, and
//! one [`WindowBinding`] per discovered window. Drives everything from a
//! single thread via a `smol` local executor, matching the teacher's
//! dedicated-loop-per-concern style (`menubar/dbus/bridge.rs`) but
//! cooperative instead of blocking-thread-based.

use std::cell::RefCell;
use std::collections::HashMap;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use futures_lite::{Stream, StreamExt};
use zbus::names::WellKnownName;
use zbus::Proxy;
use zvariant::OwnedValue;

use crate::config::Config;
use crate::dbus_menu_server::DBusMenuObject;
use crate::error::ProxyError;
use crate::gmenu::action_group::RawActionDescription;
use crate::gmenu::types::RawChange;
use crate::gmenu::{ActionGroup, MenuModel};
use crate::registrar::RegistrarClient;
use crate::window_binding::{ModelSlot, WindowBinding, WindowBindingEvent};
use crate::window_watcher::{WatcherEvent, WindowProperties, WindowWatcher};

fn object_path_for(window_id: u32) -> String {
    format!("/org/gmenuproxy/Menu/{window_id}")
}

/// Per-signal payload, normalized across the five sources a window binding
/// can listen to, so they can share one merged stream.
enum ChangeSignal {
    MenuBar(Vec<RawChange>),
    AppMenu(Vec<RawChange>),
    AppActions(ActionsChangedPayload),
    WinActions(ActionsChangedPayload),
    UnityActions(ActionsChangedPayload),
}

type ActionsChangedPayload = (
    Vec<String>,
    HashMap<String, bool>,
    HashMap<String, OwnedValue>,
    HashMap<String, RawActionDescription>,
);

pub struct Daemon {
    config: Config,
    connection: zbus::Connection,
    watcher: WindowWatcher,
    windows: HashMap<u32, Rc<RefCell<WindowBinding>>>,
}

impl Daemon {
    pub async fn new(config: Config) -> Result<Self, ProxyError> {
        let connection = zbus::connection::Builder::session()?.build().await?;
        connection
            .request_name(WellKnownName::try_from(config.service_name.clone())?)
            .await?;
        let watcher = WindowWatcher::open()?;
        Ok(Self { config, connection, watcher, windows: HashMap::new() })
    }

    /// Poll for window changes, create/destroy bindings, and drive every
    /// spawned per-window signal listener from the same local executor so
    /// it keeps making progress between polls. Exits when `shutdown`
    /// resolves.
    pub async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), ProxyError> {
        let executor = async_executor::LocalExecutor::new();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let watch_loop = async {
            loop {
                let (events, discovered) = self.watcher.poll();
                for event in events {
                    match event {
                        WatcherEvent::WindowAdded(window_id) => {
                            if let Some(props) = discovered.get(&window_id) {
                                if let Err(err) = self.spawn_window(&executor, window_id, props).await {
                                    log::warn!("failed to bind window {window_id}: {err}");
                                }
                            }
                        }
                        WatcherEvent::WindowRemoved(window_id) => {
                            self.teardown_window(window_id).await;
                        }
                    }
                }
                smol::Timer::after(poll_interval).await;
            }
        };

        // `Executor::run` polls the given future to completion while also
        // driving every task spawned on it (the per-window listeners), so
        // the watch loop and signal handling share this one thread fairly.
        executor.run(futures_lite::future::or(watch_loop, shutdown)).await;
        Ok(())
    }

    async fn spawn_window(
        &mut self,
        executor: &async_executor::LocalExecutor<'_>,
        window_id: u32,
        props: &WindowProperties,
    ) -> Result<(), ProxyError> {
        let service = props.gtk_unique_bus_name.clone().expect("menu-capable windows always carry a bus name");
        let object_path = object_path_for(window_id);

        let mut binding = WindowBinding::new(window_id, object_path.clone());
        if let Some(path) = &props.gtk_app_menu_object_path {
            binding.set_appmenu(MenuModel::new(service.clone(), path.clone(), false));
        }
        if let Some(path) = &props.gtk_menubar_object_path {
            binding.set_menubar(MenuModel::new(service.clone(), path.clone(), true));
        }
        if let Some(path) = &props.gtk_application_object_path {
            binding.set_app_actions(ActionGroup::new(service.clone(), path.clone()));
        }
        if let Some(path) = &props.gtk_window_object_path {
            binding.set_win_actions(ActionGroup::new(service.clone(), path.clone()));
        }
        if let Some(path) = &props.unity_object_path {
            binding.set_unity_actions(ActionGroup::new(service.clone(), path.clone()));
        }

        let events = binding.bootstrap(&self.connection).await?;
        let binding = Rc::new(RefCell::new(binding));

        self.connection
            .object_server()
            .at(object_path.clone(), DBusMenuObject::new(binding.clone(), self.connection.clone()))
            .await?;

        let registrar = RegistrarClient::new(self.connection.clone(), self.config.service_name.clone(), object_path.clone());
        self.apply_events(&registrar, window_id, &object_path, &binding, events).await;

        self.windows.insert(window_id, binding.clone());

        let connection = self.connection.clone();
        let config_service = self.config.service_name.clone();
        executor
            .spawn(async move {
                if let Err(err) = listen_for_changes(connection, config_service, window_id, object_path, binding).await {
                    log::warn!("signal listener for window {window_id} exited: {err}");
                }
            })
            .detach();

        Ok(())
    }

    async fn teardown_window(&mut self, window_id: u32) {
        let Some(binding) = self.windows.remove(&window_id) else { return };
        let object_path = binding.borrow().object_path.clone();
        let _ = self.connection.object_server().remove::<DBusMenuObject, _>(object_path.as_str()).await;
        let registrar = RegistrarClient::new(self.connection.clone(), self.config.service_name.clone(), object_path);
        if let Err(err) = registrar.unregister_window(window_id).await {
            log::debug!("unregistering window {window_id} failed (registrar may not be running): {err}");
        }
    }

    async fn apply_events(
        &self,
        registrar: &RegistrarClient,
        window_id: u32,
        object_path: &str,
        binding: &Rc<RefCell<WindowBinding>>,
        events: Vec<WindowBindingEvent>,
    ) {
        for event in events {
            match event {
                WindowBindingEvent::Register => {
                    if let Err(err) = registrar.register_window(window_id).await {
                        log::warn!("failed to register window {window_id} with the shell: {err}");
                    }
                }
                WindowBindingEvent::Unregister => {
                    if let Err(err) = registrar.unregister_window(window_id).await {
                        log::debug!("unregistering window {window_id} failed: {err}");
                    }
                }
                WindowBindingEvent::LayoutChanged { id } => {
                    emit_layout_updated(&self.connection, object_path, id).await;
                }
                WindowBindingEvent::ItemsChanged(ids) => {
                    emit_items_properties_updated(&self.connection, object_path, binding, &ids).await;
                }
            }
        }
    }
}

async fn emit_layout_updated(connection: &zbus::Connection, object_path: &str, parent: i32) {
    let Ok(iface_ref) = connection.object_server().interface::<_, DBusMenuObject>(object_path).await else { return };
    if let Err(err) = DBusMenuObject::layout_updated(iface_ref.signal_emitter(), 0, parent).await {
        log::warn!("failed to emit LayoutUpdated for {object_path}: {err}");
    }
}

async fn emit_items_properties_updated(
    connection: &zbus::Connection,
    object_path: &str,
    binding: &Rc<RefCell<WindowBinding>>,
    ids: &[i32],
) {
    let Ok(iface_ref) = connection.object_server().interface::<_, DBusMenuObject>(object_path).await else { return };
    let updated: Vec<(i32, HashMap<String, OwnedValue>)> = {
        let b = binding.borrow();
        ids.iter().map(|&id| (id, b.properties_for_id(id))).collect()
    };
    if let Err(err) = DBusMenuObject::items_properties_updated(iface_ref.signal_emitter(), updated, Vec::new()).await {
        log::warn!("failed to emit ItemsPropertiesUpdated for {object_path}: {err}");
    }
}

/// Subscribe to every `Changed` signal this window's models/action groups
/// expose, merge them into one stream, and fold each arrival into the
/// binding, emitting the resulting DBusMenu signals.
async fn listen_for_changes(
    connection: zbus::Connection,
    service_name: String,
    window_id: u32,
    object_path: String,
    binding: Rc<RefCell<WindowBinding>>,
) -> zbus::Result<()> {
    let mut sources: Vec<Pin<Box<dyn Stream<Item = ChangeSignal>>>> = Vec::new();

    {
        let b = binding.borrow();
        if let Some(model) = b.model_slot(ModelSlot::MenuBar) {
            sources.push(Box::pin(menu_changed_stream(&connection, model).await?.map(ChangeSignal::MenuBar)));
        }
        if let Some(model) = b.model_slot(ModelSlot::AppMenu) {
            sources.push(Box::pin(menu_changed_stream(&connection, model).await?.map(ChangeSignal::AppMenu)));
        }
        if let Some(group) = b.app_actions() {
            sources.push(Box::pin(action_changed_stream(&connection, group).await?.map(ChangeSignal::AppActions)));
        }
        if let Some(group) = b.win_actions() {
            sources.push(Box::pin(action_changed_stream(&connection, group).await?.map(ChangeSignal::WinActions)));
        }
        if let Some(group) = b.unity_actions() {
            sources.push(Box::pin(action_changed_stream(&connection, group).await?.map(ChangeSignal::UnityActions)));
        }
    }

    let registrar = RegistrarClient::new(connection.clone(), service_name, object_path.clone());

    let mut merged = futures_lite::stream::select_all(sources);
    while let Some(signal) = merged.next().await {
        let result = {
            let mut b = binding.borrow_mut();
            match signal {
                ChangeSignal::MenuBar(changes) => b.apply_menu_changes(&connection, ModelSlot::MenuBar, changes).await,
                ChangeSignal::AppMenu(changes) => b.apply_menu_changes(&connection, ModelSlot::AppMenu, changes).await,
                ChangeSignal::AppActions((removed, enabled, state, added)) => {
                    Ok(b.apply_action_changes("app.", removed, enabled, state, added))
                }
                ChangeSignal::WinActions((removed, enabled, state, added)) => {
                    Ok(b.apply_action_changes("win.", removed, enabled, state, added))
                }
                ChangeSignal::UnityActions((removed, enabled, state, added)) => {
                    Ok(b.apply_action_changes("unity.", removed, enabled, state, added))
                }
            }
        };
        let events = match result {
            Ok(events) => events,
            Err(err) => {
                log::warn!("failed to re-subscribe window {window_id} after a menu change: {err}");
                continue;
            }
        };
        for event in events {
            match event {
                WindowBindingEvent::Register => {
                    let _ = registrar.register_window(window_id).await;
                }
                WindowBindingEvent::Unregister => {
                    let _ = registrar.unregister_window(window_id).await;
                }
                WindowBindingEvent::LayoutChanged { id } => {
                    emit_layout_updated(&connection, &object_path, id).await;
                }
                WindowBindingEvent::ItemsChanged(ids) => {
                    emit_items_properties_updated(&connection, &object_path, &binding, &ids).await;
                }
            }
        }
    }
    Ok(())
}

async fn menu_changed_stream(
    connection: &zbus::Connection,
    model: &MenuModel,
) -> zbus::Result<impl Stream<Item = Vec<RawChange>> + 'static> {
    // Pass the connection by value (cheap: it's reference-counted
    // internally) so the returned stream doesn't borrow from this call.
    let proxy = Proxy::new(connection.clone(), model.service().to_string(), model.path().to_string(), "org.gtk.Menus").await?;
    let stream = proxy.receive_signal("Changed").await?;
    Ok(stream.filter_map(|message| message.body().deserialize::<(Vec<RawChange>,)>().ok().map(|(changes,)| changes)))
}

async fn action_changed_stream(
    connection: &zbus::Connection,
    group: &ActionGroup,
) -> zbus::Result<impl Stream<Item = ActionsChangedPayload> + 'static> {
    let proxy = Proxy::new(connection.clone(), group.service().to_string(), group.path().to_string(), "org.gtk.Actions").await?;
    let stream = proxy.receive_signal("Changed").await?;
    Ok(stream.filter_map(|message| message.body().deserialize::<ActionsChangedPayload>().ok()))
}
