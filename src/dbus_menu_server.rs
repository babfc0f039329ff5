//! `com.canonical.dbusmenu` server object. All decision-making lives in
//! [`WindowBinding`]; this is thin glue between the zbus interface and it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use zbus::interface;
use zbus::object_server::SignalEmitter;
use zvariant::OwnedValue;

use crate::window_binding::WindowBinding;

/// DBusMenu-facing object. Calls against the same window serialize through
/// the `RefCell`: zbus dispatches one method body at a time per connection,
/// and nothing inside a call re-enters the same binding.
pub struct DBusMenuObject {
    binding: Rc<RefCell<WindowBinding>>,
    connection: zbus::Connection,
}

impl DBusMenuObject {
    pub fn new(binding: Rc<RefCell<WindowBinding>>, connection: zbus::Connection) -> Self {
        Self { binding, connection }
    }
}

#[interface(name = "com.canonical.dbusmenu")]
impl DBusMenuObject {
    #[zbus(property)]
    fn version(&self) -> u32 {
        4
    }

    #[zbus(property)]
    fn status(&self) -> &str {
        "normal"
    }

    #[zbus(property, name = "TextDirection")]
    fn text_direction(&self) -> &str {
        "ltr"
    }

    #[zbus(name = "GetLayout")]
    async fn get_layout(
        &self,
        parent_id: i32,
        _recursion_depth: i32,
        _property_names: Vec<String>,
    ) -> zbus::fdo::Result<(u32, (i32, HashMap<String, OwnedValue>, Vec<OwnedValue>))> {
        let (node, _side_effects) = {
            let mut binding = self.binding.borrow_mut();
            binding
                .get_layout(&self.connection, parent_id)
                .await
                .map_err(|err| zbus::fdo::Error::Failed(err.to_string()))?
        };
        let revision = self.binding.borrow().revision();
        Ok((revision, node.into_wire()))
    }

    #[zbus(name = "GetGroupProperties")]
    fn get_group_properties(&self, ids: Vec<i32>, property_names: Vec<String>) -> Vec<(i32, HashMap<String, OwnedValue>)> {
        let binding = self.binding.borrow();
        ids.into_iter()
            .map(|id| {
                let mut props = binding.properties_for_id(id);
                if !property_names.is_empty() {
                    props.retain(|key, _| property_names.iter().any(|name| name == key));
                }
                (id, props)
            })
            .collect()
    }

    #[zbus(name = "GetProperty")]
    fn get_property(&self, id: i32, name: &str) -> OwnedValue {
        let binding = self.binding.borrow();
        binding
            .properties_for_id(id)
            .remove(name)
            .unwrap_or_else(|| OwnedValue::try_from(zvariant::Value::from("")).expect("infallible"))
    }

    #[zbus(name = "Event")]
    async fn event(&self, id: i32, event_id: &str, _data: OwnedValue, timestamp: u32) -> zbus::fdo::Result<()> {
        // `handle_event` only reads the binding (action lookup + trigger
        // call), so an immutable borrow held across the await is enough.
        let binding = self.binding.borrow();
        binding
            .handle_event(&self.connection, id, event_id, timestamp)
            .await
            .map_err(|err| zbus::fdo::Error::Failed(err.to_string()))
    }

    #[zbus(name = "AboutToShow")]
    async fn about_to_show(&self, _id: i32) -> bool {
        false
    }

    #[zbus(name = "AboutToShowGroup")]
    async fn about_to_show_group(&self, ids: Vec<i32>) -> (Vec<i32>, Vec<i32>) {
        let _ = ids;
        (Vec::new(), Vec::new())
    }

    #[zbus(signal)]
    pub async fn layout_updated(emitter: &SignalEmitter<'_>, revision: u32, parent: i32) -> zbus::Result<()>;

    #[zbus(signal, name = "ItemsPropertiesUpdated")]
    pub async fn items_properties_updated(
        emitter: &SignalEmitter<'_>,
        updated_props: Vec<(i32, HashMap<String, OwnedValue>)>,
        removed_props: Vec<(i32, Vec<String>)>,
    ) -> zbus::Result<()>;
}
