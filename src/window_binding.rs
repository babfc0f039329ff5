//! Per-window aggregate: the menubar/app-menu models, the action groups
//! that resolve their item states, the "current menu" choice, and the
//! DBusMenu-facing layout/property synthesis built on top of them.

use std::collections::{HashMap, HashSet};

use zvariant::{OwnedValue, Structure, Value};

use crate::error::WindowBindingError;
use crate::gmenu::action_group::{resolve_prefix, RawActionDescription};
use crate::gmenu::types::RawChange;
use crate::gmenu::{ActionEvent, ActionGroup, MenuItem, MenuModel, ModelEvent};
use crate::id;

/// Which of the two possible menus is presently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentMenu {
    None,
    AppMenu,
    MenuBar,
}

/// Identifies one of the two [`MenuModel`] slots a [`WindowBinding`] owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSlot {
    AppMenu,
    MenuBar,
}

/// Effects of a [`WindowBinding`] operation the daemon must act on: emit a
/// DBusMenu signal, or call the registrar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowBindingEvent {
    Register,
    Unregister,
    LayoutChanged { id: i32 },
    ItemsChanged(Vec<i32>),
}

/// A synthesized DBusMenu layout node, one level deep: children carry their
/// own properties but not their own children (the panel re-queries lazily).
#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub id: i32,
    pub properties: HashMap<String, OwnedValue>,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    fn leaf(id: i32, properties: HashMap<String, OwnedValue>) -> Self {
        Self { id, properties, children: Vec::new() }
    }

    fn separator(id: i32) -> Self {
        let mut properties = HashMap::new();
        properties.insert("type".to_string(), owned(Value::from("separator")));
        Self::leaf(id, properties)
    }

    fn container(id: i32, children: Vec<LayoutNode>) -> Self {
        let mut properties = HashMap::new();
        properties.insert("children-display".to_string(), owned(Value::from("submenu")));
        Self { id, properties, children }
    }

    /// Encode into the `(i sa{sv} av)`-shaped wire value GetLayout returns,
    /// one level deep (grandchildren are always empty arrays: the panel
    /// recurses by calling `GetLayout` again with the child's id).
    pub fn into_wire(self) -> (i32, HashMap<String, OwnedValue>, Vec<OwnedValue>) {
        let children = self
            .children
            .into_iter()
            .map(|child| {
                let (cid, cprops, _grandchildren) = child.into_wire();
                owned(Value::from(Structure::from((cid, cprops, Vec::<OwnedValue>::new()))))
            })
            .collect();
        (self.id, self.properties, children)
    }
}

fn owned<'a>(value: Value<'a>) -> OwnedValue {
    OwnedValue::try_from(value).expect("infallible conversion from owned Value")
}

/// Per-window aggregate owning up to two [`MenuModel`]s and up to three
/// [`ActionGroup`]s.
pub struct WindowBinding {
    pub window_id: u32,
    pub object_path: String,
    appmenu: Option<MenuModel>,
    menubar: Option<MenuModel>,
    app_actions: Option<ActionGroup>,
    win_actions: Option<ActionGroup>,
    unity_actions: Option<ActionGroup>,
    current: CurrentMenu,
    revision: u32,
    pending: HashMap<u32, smol::channel::Receiver<()>>,
}

impl WindowBinding {
    pub fn new(window_id: u32, object_path: String) -> Self {
        Self {
            window_id,
            object_path,
            appmenu: None,
            menubar: None,
            app_actions: None,
            win_actions: None,
            unity_actions: None,
            current: CurrentMenu::None,
            revision: 0,
            pending: HashMap::new(),
        }
    }

    pub fn set_appmenu(&mut self, model: MenuModel) {
        self.appmenu = Some(model);
    }

    pub fn set_menubar(&mut self, model: MenuModel) {
        self.menubar = Some(model);
    }

    pub fn set_app_actions(&mut self, group: ActionGroup) {
        self.app_actions = Some(group);
    }

    pub fn set_win_actions(&mut self, group: ActionGroup) {
        self.win_actions = Some(group);
    }

    pub fn set_unity_actions(&mut self, group: ActionGroup) {
        self.unity_actions = Some(group);
    }

    pub fn has_any_model(&self) -> bool {
        self.appmenu.is_some() || self.menubar.is_some()
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn model_slot(&self, slot: ModelSlot) -> Option<&MenuModel> {
        match slot {
            ModelSlot::AppMenu => self.appmenu.as_ref(),
            ModelSlot::MenuBar => self.menubar.as_ref(),
        }
    }

    pub fn model_slot_mut(&mut self, slot: ModelSlot) -> Option<&mut MenuModel> {
        match slot {
            ModelSlot::AppMenu => self.appmenu.as_mut(),
            ModelSlot::MenuBar => self.menubar.as_mut(),
        }
    }

    pub fn app_actions(&self) -> Option<&ActionGroup> {
        self.app_actions.as_ref()
    }

    pub fn win_actions(&self) -> Option<&ActionGroup> {
        self.win_actions.as_ref()
    }

    pub fn unity_actions(&self) -> Option<&ActionGroup> {
        self.unity_actions.as_ref()
    }

    fn current_slot(&self) -> Option<ModelSlot> {
        match self.current {
            CurrentMenu::AppMenu => Some(ModelSlot::AppMenu),
            CurrentMenu::MenuBar => Some(ModelSlot::MenuBar),
            CurrentMenu::None => None,
        }
    }

    fn current_model(&self) -> Option<&MenuModel> {
        self.current_slot().and_then(|slot| self.model_slot(slot))
    }

    /// Translate raw [`ModelEvent`]s from one slot into binding-level
    /// effects: current-menu selection (menubar preempts app-menu, never
    /// downgrades), registrar (un)registration, and signal requests.
    pub fn handle_model_events(&mut self, slot: ModelSlot, events: Vec<ModelEvent>) -> Vec<WindowBindingEvent> {
        let mut out = Vec::new();
        for event in events {
            match event {
                ModelEvent::MenuAppeared => {
                    let was_none = matches!(self.current, CurrentMenu::None);
                    let should_switch = match (self.current, slot) {
                        (CurrentMenu::None, _) => true,
                        (CurrentMenu::AppMenu, ModelSlot::MenuBar) => true,
                        (CurrentMenu::MenuBar, _) => false,
                        (CurrentMenu::AppMenu, ModelSlot::AppMenu) => false,
                    };
                    if should_switch {
                        self.current = match slot {
                            ModelSlot::AppMenu => CurrentMenu::AppMenu,
                            ModelSlot::MenuBar => CurrentMenu::MenuBar,
                        };
                        self.revision += 1;
                        out.push(WindowBindingEvent::LayoutChanged { id: 0 });
                        if was_none {
                            out.push(WindowBindingEvent::Register);
                        }
                    }
                }
                ModelEvent::MenuDisappeared => {
                    let still_has_menu = self.appmenu.as_ref().map(MenuModel::has_menu).unwrap_or(false)
                        || self.menubar.as_ref().map(MenuModel::has_menu).unwrap_or(false);
                    if !still_has_menu && !matches!(self.current, CurrentMenu::None) {
                        self.current = CurrentMenu::None;
                        out.push(WindowBindingEvent::Unregister);
                    }
                }
                ModelEvent::ItemsChanged(dirty) => {
                    let ids: Vec<i32> = dirty.into_iter().filter_map(|(s, sec, i)| id::pack(s, sec, i).ok()).collect();
                    if !ids.is_empty() {
                        out.push(WindowBindingEvent::ItemsChanged(ids));
                    }
                }
                ModelEvent::MenusChanged(_) => {
                    self.revision += 1;
                    out.push(WindowBindingEvent::LayoutChanged { id: 0 });
                }
                ModelEvent::Subscribed(_) | ModelEvent::FailedToSubscribe(_) => {}
            }
        }
        out
    }

    /// Ensure `sub` is subscribed on the current model, sharing one
    /// in-flight `Start` across concurrent callers.
    async fn ensure_subscribed(
        &mut self,
        connection: &zbus::Connection,
        sub: u32,
    ) -> Result<Vec<WindowBindingEvent>, WindowBindingError> {
        loop {
            let Some(slot) = self.current_slot() else { return Ok(Vec::new()) };
            let already = self.model_slot(slot).map(|m| m.is_active(sub)).unwrap_or(false);
            if already {
                return Ok(Vec::new());
            }

            if let Some(rx) = self.pending.get(&sub).cloned() {
                let _ = rx.recv().await;
                continue;
            }

            let (tx, rx) = smol::channel::unbounded::<()>();
            self.pending.insert(sub, rx);

            let events = match self.model_slot_mut(slot) {
                Some(model) => model.start(connection, sub).await?,
                None => Vec::new(),
            };
            let out = self.handle_model_events(slot, events);

            self.pending.remove(&sub);
            drop(tx);
            return Ok(out);
        }
    }

    /// `GetLayout` synthesis, see `SPEC_FULL.md` §4.4.
    pub async fn get_layout(
        &mut self,
        connection: &zbus::Connection,
        parent_id: i32,
    ) -> Result<(LayoutNode, Vec<WindowBindingEvent>), WindowBindingError> {
        if parent_id == 0 {
            let side_events = self.ensure_subscribed(connection, 0).await?;
            let Some(model) = self.current_model() else {
                return Ok((LayoutNode::container(0, Vec::new()), side_events));
            };
            let mut visited = HashSet::new();
            let children = expand_menu(model, 0, &mut visited);
            return Ok((LayoutNode::container(0, children), side_events));
        }

        let (sub, sec, idx) = id::unpack(parent_id);
        let mut side_events = self.ensure_subscribed(connection, sub).await?;
        let Some(model) = self.current_model() else {
            return Ok((LayoutNode::leaf(parent_id, HashMap::new()), side_events));
        };

        let Some(item) = model.get_item(sub, sec, idx) else {
            return Ok((LayoutNode::leaf(parent_id, HashMap::new()), side_events));
        };

        let Some(target) = item.submenu_ref() else {
            return Ok((LayoutNode::leaf(parent_id, HashMap::new()), side_events));
        };

        let more_events = self.ensure_subscribed(connection, target.subscription).await?;
        side_events.extend(more_events);
        let Some(model) = self.current_model() else {
            return Ok((LayoutNode::leaf(parent_id, HashMap::new()), side_events));
        };

        let mut visited = HashSet::new();
        let children = expand_section(model, target.subscription, target.section, &mut visited);
        let resolved_id = id::pack(target.subscription, target.section, 0).unwrap_or(parent_id);
        Ok((LayoutNode::container(resolved_id, children), side_events))
    }

    /// `GetGroupProperties`/`GetProperty`: synthesize one item's property
    /// map from its GMenu attributes and resolved action state.
    pub fn properties_for_id(&self, id_: i32) -> HashMap<String, OwnedValue> {
        if id_ == 0 {
            let mut props = HashMap::new();
            props.insert("children-display".to_string(), owned(Value::from("submenu")));
            return props;
        }
        let (sub, sec, idx) = id::unpack(id_);
        let Some(model) = self.current_model() else { return HashMap::new() };
        let Some(item) = model.get_item(sub, sec, idx) else { return HashMap::new() };
        self.synthesize_properties(item)
    }

    fn synthesize_properties(&self, item: &MenuItem) -> HashMap<String, OwnedValue> {
        let mut props = HashMap::new();

        if let Some(label) = item.label() {
            props.insert("label".to_string(), owned(Value::from(label)));
        }
        if item.is_section_alias() {
            props.insert("type".to_string(), owned(Value::from("separator")));
        }
        if item.is_submenu() {
            props.insert("children-display".to_string(), owned(Value::from("submenu")));
        }
        if let Some(accel) = item.accel() {
            if let Some(chord) = parse_accelerator(accel) {
                props.insert("shortcut".to_string(), owned(Value::from(vec![chord])));
            }
        }

        let action_state = item.action().and_then(|a| self.resolve_action(a));
        let has_action_ref = item.action().is_some();

        let enabled = match (&action_state, has_action_ref) {
            (_, false) => true,
            (Some(state), true) => state.enabled,
            (None, true) => false,
        };
        props.insert("enabled".to_string(), owned(Value::from(enabled)));

        let visible = match item.hidden_when() {
            Some(crate::gmenu::types::HiddenWhen::MacosMenubar) => true,
            Some(crate::gmenu::types::HiddenWhen::ActionDisabled) => !(action_state.is_none() || !enabled),
            Some(crate::gmenu::types::HiddenWhen::ActionMissing) => action_state.is_some() || !has_action_ref,
            None => true,
        };
        props.insert("visible".to_string(), owned(Value::from(visible)));

        let icon_name = item
            .icon()
            .filter(|s| !s.is_empty())
            .or_else(|| item.verb_icon().filter(|s| !s.is_empty()));
        if let Some(icon_name) = icon_name {
            props.insert("icon-name".to_string(), owned(Value::from(icon_name)));
        }

        if !item.is_submenu() {
            if let Some(state) = action_state {
                if let Some(state_value) = &state.state {
                    if let Ok(flag) = state_value.downcast_ref::<bool>() {
                        props.insert("toggle-type".to_string(), owned(Value::from("checkmark")));
                        props.insert("toggle-state".to_string(), owned(Value::from(if flag { 1i32 } else { 0i32 })));
                    } else if let Ok(state_str) = state_value.downcast_ref::<zvariant::Str>() {
                        let target_str = item
                            .target()
                            .and_then(|t| t.downcast_ref::<zvariant::Str>().ok())
                            .map(|s| s.as_str().to_string());
                        let matches = target_str.as_deref() == Some(state_str.as_str());
                        props.insert("toggle-type".to_string(), owned(Value::from("radio")));
                        props.insert("toggle-state".to_string(), owned(Value::from(if matches { 1i32 } else { 0i32 })));
                    }
                }
            }
        }

        props
    }

    fn resolve_action(&self, action: &str) -> Option<&crate::gmenu::ActionState> {
        let (prefix, name) = resolve_prefix(action)?;
        let group = match prefix {
            "app." => self.app_actions.as_ref(),
            "win." => self.win_actions.as_ref(),
            "unity." => self.unity_actions.as_ref(),
            _ => None,
        }?;
        group.get(name)
    }

    fn group_for_action<'a>(&'a self, action: &str) -> Option<(&'a ActionGroup, &'a str)> {
        let (prefix, name) = resolve_prefix(action)?;
        let group = match prefix {
            "app." => self.app_actions.as_ref(),
            "win." => self.win_actions.as_ref(),
            "unity." => self.unity_actions.as_ref(),
            _ => None,
        }?;
        Some((group, name))
    }

    /// `Event(id, "clicked", data, timestamp)`: resolve and activate the
    /// item's action. Submenu items and non-`clicked` events are ignored.
    pub async fn handle_event(
        &self,
        connection: &zbus::Connection,
        id_: i32,
        event_id: &str,
        timestamp: u32,
    ) -> Result<(), WindowBindingError> {
        if event_id != "clicked" {
            return Ok(());
        }
        let (sub, sec, idx) = id::unpack(id_);
        let Some(model) = self.current_model() else { return Ok(()) };
        let Some(item) = model.get_item(sub, sec, idx) else { return Ok(()) };
        if item.is_submenu() {
            return Ok(());
        }
        let Some(action) = item.action() else { return Ok(()) };
        let Some((group, name)) = self.group_for_action(action) else { return Ok(()) };
        let target = item.target().cloned();
        group.trigger(connection, name, target, timestamp).await?;
        Ok(())
    }

    /// Eagerly subscribe both models to their root (id 0) and load every
    /// action group, called once right after a binding is created. The
    /// menubar/app-menu preemption rule runs on whichever `MenuAppeared`
    /// events come back.
    pub async fn bootstrap(&mut self, connection: &zbus::Connection) -> Result<Vec<WindowBindingEvent>, WindowBindingError> {
        let mut out = Vec::new();

        if let Some(mut model) = self.appmenu.take() {
            let events = model.start(connection, 0).await?;
            self.appmenu = Some(model);
            out.extend(self.handle_model_events(ModelSlot::AppMenu, events));
        }
        if let Some(mut model) = self.menubar.take() {
            let events = model.start(connection, 0).await?;
            self.menubar = Some(model);
            out.extend(self.handle_model_events(ModelSlot::MenuBar, events));
        }
        if let Some(group) = self.app_actions.as_mut() {
            group.load(connection).await?;
        }
        if let Some(group) = self.win_actions.as_mut() {
            group.load(connection).await?;
        }
        if let Some(group) = self.unity_actions.as_mut() {
            group.load(connection).await?;
        }

        Ok(out)
    }

    /// Apply an `org.gtk.Menus.Changed` signal payload received for one
    /// model slot. A `Changed` batch can reference a subscription we
    /// haven't (or no longer) actively subscribed to — e.g. the LibreOffice
    /// startup quirk where the initial `Start` reply comes back empty and
    /// the real data only arrives via the next `Changed` signal — in which
    /// case the batch for that subscription is dropped (matching the
    /// original's `continue`) and `start` is re-issued so the authoritative
    /// state is fetched directly instead.
    pub async fn apply_menu_changes(
        &mut self,
        connection: &zbus::Connection,
        slot: ModelSlot,
        changes: Vec<RawChange>,
    ) -> Result<Vec<WindowBindingEvent>, WindowBindingError> {
        let unresolved = match self.model_slot(slot) {
            Some(model) => model.unresolved_subscriptions(&changes),
            None => HashSet::new(),
        };

        let events = match self.model_slot_mut(slot) {
            Some(model) => model.apply_changes(changes),
            None => Vec::new(),
        };
        let mut out = self.handle_model_events(slot, events);

        for sub in unresolved {
            let start_events = match self.model_slot_mut(slot) {
                Some(model) => model.start(connection, sub).await?,
                None => Vec::new(),
            };
            out.extend(self.handle_model_events(slot, start_events));
        }

        Ok(out)
    }

    /// Apply an `org.gtk.Actions.Changed` signal payload for the group
    /// addressed by `prefix` (`"app."`, `"win."`, or `"unity."`), surfacing
    /// which currently-visible items reference the affected actions.
    pub fn apply_action_changes(
        &mut self,
        prefix: &str,
        removed: Vec<String>,
        enabled_changes: HashMap<String, bool>,
        state_changes: HashMap<String, OwnedValue>,
        added: HashMap<String, RawActionDescription>,
    ) -> Vec<WindowBindingEvent> {
        let group = match prefix {
            "app." => self.app_actions.as_mut(),
            "win." => self.win_actions.as_mut(),
            "unity." => self.unity_actions.as_mut(),
            _ => None,
        };
        let Some(group) = group else { return Vec::new() };

        let mut dirty_names = HashSet::new();
        for event in group.apply_changes(removed, enabled_changes, state_changes, added) {
            if let ActionEvent::ActionsChanged(names) = event {
                dirty_names.extend(names);
            }
        }
        if dirty_names.is_empty() {
            return Vec::new();
        }

        let Some(model) = self.current_model() else { return Vec::new() };
        let dirty_items = model.items_referencing_actions(prefix, &dirty_names);
        let ids: Vec<i32> = dirty_items.into_iter().filter_map(|(s, sec, i)| id::pack(s, sec, i).ok()).collect();
        if ids.is_empty() {
            Vec::new()
        } else {
            vec![WindowBindingEvent::ItemsChanged(ids)]
        }
    }
}

fn parse_accelerator(accel: &str) -> Option<Vec<String>> {
    if accel.is_empty() {
        return None;
    }
    let mut mods = Vec::new();
    let mut rest = accel;

    if let Some(r) = rest.strip_prefix("<Primary>") {
        mods.push("Control".to_string());
        rest = r;
    } else if let Some(r) = rest.strip_prefix("<Control>") {
        mods.push("Control".to_string());
        rest = r;
    }
    if let Some(r) = rest.strip_prefix("<Shift>") {
        mods.push("Shift".to_string());
        rest = r;
    }
    if let Some(r) = rest.strip_prefix("<Alt>") {
        mods.push("Alt".to_string());
        rest = r;
    }
    if let Some(r) = rest.strip_prefix("<Super>") {
        mods.push("Super".to_string());
        rest = r;
    }

    mods.push(rest.to_string());
    Some(mods)
}

/// Gather every item across all of `sub`'s sections into one child list,
/// splicing section aliases inline and inserting separators between
/// sibling section groups.
fn expand_menu(model: &MenuModel, sub: u32, visited: &mut HashSet<(u32, u32)>) -> Vec<LayoutNode> {
    let section_count = (0..).take_while(|i| model.get_section(sub, *i).is_some()).count();
    let mut out = Vec::new();
    for sec in 0..section_count as u32 {
        let mut group = expand_section(model, sub, sec, visited);
        out.append(&mut group);
        if sec + 1 < section_count as u32 {
            let sep_id = id::pack(sub, sec, id::IDX_MAX).unwrap_or(0);
            out.push(LayoutNode::separator(sep_id));
        }
    }
    out
}

/// Expand one section's item list, inlining `:section` aliases recursively
/// and separating each inlined group from its neighbors (Design Note (b):
/// applied uniformly at every nesting depth).
fn expand_section(model: &MenuModel, sub: u32, sec: u32, visited: &mut HashSet<(u32, u32)>) -> Vec<LayoutNode> {
    let Some(items) = model.get_section(sub, sec) else { return Vec::new() };
    let n = items.len();
    let mut out = Vec::new();

    for (idx, item) in items.iter().enumerate() {
        if let Some(r) = item.section_ref() {
            let key = (r.subscription, r.section);
            if visited.insert(key) {
                let mut inlined = expand_section(model, r.subscription, r.section, visited);
                out.append(&mut inlined);
                visited.remove(&key);
            }
            if idx + 1 != n {
                let sep_id = id::pack(sub, sec, idx as u32).unwrap_or(0);
                out.push(LayoutNode::separator(sep_id));
            }
        } else {
            let node_id = id::pack(sub, sec, idx as u32).unwrap_or(0);
            out.push(build_leaf(model, node_id, item));
        }
    }
    out
}

fn build_leaf(_model: &MenuModel, node_id: i32, item: &MenuItem) -> LayoutNode {
    let mut props = HashMap::new();
    if let Some(label) = item.label() {
        props.insert("label".to_string(), owned(Value::from(label)));
    }
    if item.is_submenu() {
        props.insert("children-display".to_string(), owned(Value::from("submenu")));
    }
    LayoutNode::leaf(node_id, props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmenu::types::owned_value;

    #[test]
    fn accelerator_parsing_matches_boundary_cases() {
        assert_eq!(parse_accelerator("<Primary><Shift>Q"), Some(vec!["Control".into(), "Shift".into(), "Q".into()]));
        assert_eq!(parse_accelerator("<Super>space"), Some(vec!["Super".into(), "space".into()]));
        assert_eq!(parse_accelerator("F10"), Some(vec!["F10".into()]));
        assert_eq!(parse_accelerator(""), None);
    }

    #[test]
    fn accelerator_parsing_is_order_sensitive() {
        // <Shift><Primary>Q: Primary is not a leading token once Shift is
        // the first thing seen, so only Shift is recognized and the
        // untouched "<Primary>Q" is the residue.
        assert_eq!(parse_accelerator("<Shift><Primary>Q"), Some(vec!["Shift".into(), "<Primary>Q".into()]));
    }

    #[test]
    fn current_menu_never_downgrades() {
        let mut binding = WindowBinding::new(1, "/MenuBar/1".to_string());
        binding.set_appmenu(MenuModel::new("org.example.App", "/app/menu", false));
        binding.set_menubar(MenuModel::new("org.example.App", "/app/menubar", true));

        let out = binding.handle_model_events(ModelSlot::AppMenu, vec![ModelEvent::MenuAppeared]);
        assert_eq!(binding.current, CurrentMenu::AppMenu);
        assert!(out.contains(&WindowBindingEvent::Register));

        let out = binding.handle_model_events(ModelSlot::MenuBar, vec![ModelEvent::MenuAppeared]);
        assert_eq!(binding.current, CurrentMenu::MenuBar);
        assert!(out.contains(&WindowBindingEvent::LayoutChanged { id: 0 }));
        assert!(!out.contains(&WindowBindingEvent::Register));

        let out = binding.handle_model_events(ModelSlot::AppMenu, vec![ModelEvent::MenuAppeared]);
        assert_eq!(binding.current, CurrentMenu::MenuBar);
        assert!(out.is_empty());
    }

    #[test]
    fn unregisters_only_when_all_models_lose_their_menus() {
        let mut binding = WindowBinding::new(1, "/MenuBar/1".to_string());
        binding.set_menubar(MenuModel::new("org.example.App", "/app/menubar", true));
        binding.handle_model_events(ModelSlot::MenuBar, vec![ModelEvent::MenuAppeared]);
        let out = binding.handle_model_events(ModelSlot::MenuBar, vec![ModelEvent::MenuDisappeared]);
        assert!(out.contains(&WindowBindingEvent::Unregister));
        assert_eq!(binding.current, CurrentMenu::None);
    }

    fn labeled(label: &str) -> MenuItem {
        MenuItem::from_raw(HashMap::from([("label".to_string(), owned_value(zvariant::Str::from(label)))]))
    }

    fn section_alias(sub: u32, sec: u32) -> MenuItem {
        let structure = zvariant::Structure::from((sub, sec));
        MenuItem::from_raw(HashMap::from([(":section".to_string(), owned_value(structure))]))
    }

    #[test]
    fn expand_section_inlines_aliases_with_separators_between_groups() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        // Section 0: a regular item, then an alias to section 1, then
        // another regular item. Section 1 (the aliased target) holds two
        // items of its own.
        model.seed_section(1, 0, vec![labeled("New"), section_alias(1, 1), labeled("Quit")]);
        model.seed_section(1, 1, vec![labeled("Cut"), labeled("Copy")]);

        let mut visited = HashSet::new();
        let expanded = expand_section(&model, 1, 0, &mut visited);

        let labels: Vec<Option<&str>> = expanded.iter().map(|n| n.properties.get("label").and_then(|v| v.downcast_ref::<zvariant::Str>().ok()).map(|s| s.as_str())).collect();
        // "New", then the two inlined items from the aliased section, a
        // separator splitting the alias from the trailing "Quit", then "Quit".
        assert_eq!(labels, vec![Some("New"), Some("Cut"), Some("Copy"), None, Some("Quit")]);
        assert!(expanded[3].properties.get("type").is_some());
    }

    #[test]
    fn expand_section_cycle_guard_stops_recursion() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        // Section 0 aliases to itself — a malformed tree that must not
        // recurse forever.
        model.seed_section(1, 0, vec![section_alias(1, 0)]);

        let mut visited = HashSet::new();
        let expanded = expand_section(&model, 1, 0, &mut visited);
        assert!(expanded.is_empty());
    }
}
