//! Per-window mirror of one GMenu object path (`org.gtk.Menus`).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use zbus::Proxy;

use crate::error::MenuModelError;
use crate::id::START_INDEX;

use super::types::{MenuItem, RawChange, RawSection, Section};

const INTERFACE: &str = "org.gtk.Menus";
const VIRTUAL_ROOT_DEFER: Duration = Duration::from_millis(20);

/// Observable effects of a [`MenuModel`] operation. The caller (a
/// [`crate::window_binding::WindowBinding`]) translates these into
/// DBusMenu-facing behavior: registrar calls, `LayoutUpdated`, answering
/// deferred `GetLayout` replies, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// `id` is now fully subscribed; any deferred request waiting on it can
    /// be re-evaluated.
    Subscribed(u32),
    /// Subscribing to `id` failed; deferred requests waiting on it should be
    /// answered with an empty layout rather than left hanging.
    FailedToSubscribe(u32),
    /// The model transitioned from having no menu data to having some.
    MenuAppeared,
    /// The model transitioned from having menu data to having none.
    MenuDisappeared,
    /// These `(subscription, section, index)` items were updated in place.
    ItemsChanged(HashSet<(u32, u32, u32)>),
    /// These `(subscription, section)` sections were spliced (length
    /// changed), so dependent layouts must be fully re-read.
    MenusChanged(HashSet<(u32, u32)>),
}

/// Mutable mirror of one remote GMenu tree.
pub struct MenuModel {
    service: String,
    path: String,
    is_menubar: bool,
    menus: HashMap<u32, Vec<Section>>,
    active: HashSet<u32>,
    probing: HashSet<u32>,
}

impl MenuModel {
    pub fn new(service: impl Into<String>, path: impl Into<String>, is_menubar: bool) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            is_menubar,
            menus: HashMap::new(),
            active: HashSet::new(),
            probing: HashSet::new(),
        }
    }

    pub fn is_menubar(&self) -> bool {
        self.is_menubar
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_menu(&self) -> bool {
        !self.menus.is_empty()
    }

    pub fn is_active(&self, id: u32) -> bool {
        self.active.contains(&id)
    }

    pub fn is_known(&self, id: u32) -> bool {
        self.active.contains(&id) || self.probing.contains(&id)
    }

    pub fn get_section(&self, sub: u32, sec: u32) -> Option<&Section> {
        self.menus.get(&sub)?.get(sec as usize)
    }

    pub fn get_item(&self, sub: u32, sec: u32, idx: u32) -> Option<&MenuItem> {
        self.get_section(sub, sec)?.get(idx as usize)
    }

    async fn proxy<'a>(&self, connection: &'a zbus::Connection) -> zbus::Result<Proxy<'a>> {
        Proxy::new(connection, self.service.clone(), self.path.clone(), INTERFACE).await
    }

    /// Idempotent subscription to `id`. See the module-level docs for the
    /// virtual-root special cases when `!is_menubar`.
    pub async fn start(
        &mut self,
        connection: &zbus::Connection,
        id: u32,
    ) -> Result<Vec<ModelEvent>, MenuModelError> {
        if self.is_known(id) {
            return Ok(Vec::new());
        }

        if !self.is_menubar && id == 0 {
            return self.start_virtual_root(connection).await;
        }

        self.probing.insert(id);
        let had_menu = self.has_menu();

        let remote_id = self.remote_id_for(id);
        let proxy = self.proxy(connection).await.map_err(|source| MenuModelError::StartFailed { id, source })?;

        let reply: Result<Vec<RawSection>, zbus::Error> =
            proxy.call("Start", &(vec![remote_id],)).await;

        match reply {
            Ok(sections) if sections.is_empty() => {
                // Known quirk (LibreOffice at startup): keep probing, wait
                // for a `Changed` signal to prompt a retry.
                Ok(Vec::new())
            }
            Ok(sections) => {
                self.ingest_sections(id, remote_id, sections);
                self.probing.remove(&id);
                self.active.insert(id);
                let mut events = vec![ModelEvent::Subscribed(id)];
                if !had_menu && self.has_menu() {
                    events.push(ModelEvent::MenuAppeared);
                }
                Ok(events)
            }
            Err(source) => {
                self.probing.remove(&id);
                log::warn!("failed to subscribe to menu {id} on {}: {source}", self.service);
                Ok(vec![ModelEvent::FailedToSubscribe(id)])
            }
        }
    }

    /// `id == 0` on a non-menubar model never hits the wire: after a short
    /// defer, synthesize a two-item root pointing at the real app-menu
    /// under [`START_INDEX`].
    async fn start_virtual_root(
        &mut self,
        _connection: &zbus::Connection,
    ) -> Result<Vec<ModelEvent>, MenuModelError> {
        self.probing.insert(0);
        smol::Timer::after(VIRTUAL_ROOT_DEFER).await;

        if self.is_known(0) && self.active.contains(&0) {
            return Ok(Vec::new());
        }

        let had_menu = self.has_menu();

        let section_ref_item = MenuItem::synthetic(HashMap::from([(
            ":section".to_string(),
            crate::gmenu::types::owned_value(zvariant::Structure::from((0u32, 1u32))),
        )]));
        let submenu_item = {
            let mut attrs = HashMap::new();
            attrs.insert(
                ":submenu".to_string(),
                crate::gmenu::types::owned_value(zvariant::Structure::from((START_INDEX, 0u32))),
            );
            attrs.insert(
                "label".to_string(),
                crate::gmenu::types::owned_value(zvariant::Str::from("Menu")),
            );
            MenuItem::synthetic(attrs)
        };

        self.menus.insert(0, vec![vec![section_ref_item], vec![submenu_item]]);
        self.probing.remove(&0);
        self.active.insert(0);

        // A follow-up `start(START_INDEX)` call (issued by the caller when
        // the panel recurses into the synthetic "Menu" entry) is what
        // actually subscribes to the real upstream root.
        let mut events = vec![ModelEvent::Subscribed(0)];
        if !had_menu {
            events.push(ModelEvent::MenuAppeared);
        }
        Ok(events)
    }

    /// Remote-facing subscription id for a locally addressed one: only
    /// `START_INDEX` is special-cased, rewriting to the real upstream root
    /// `0`.
    fn remote_id_for(&self, local_id: u32) -> u32 {
        if !self.is_menubar && local_id == START_INDEX {
            0
        } else {
            local_id
        }
    }

    fn ingest_sections(&mut self, local_id: u32, remote_id: u32, sections: Vec<RawSection>) {
        for (menu_id, section_id, items) in sections {
            let local_menu_id = self.rewrite_incoming_id(menu_id, remote_id, local_id);
            let parsed: Section = items
                .into_iter()
                .map(|mut raw| {
                    let mut item = MenuItem::from_raw(std::mem::take(&mut raw));
                    if !self.is_menubar {
                        item.rewrite_subscription(0, START_INDEX);
                    }
                    item
                })
                .collect();
            let entry = self.menus.entry(local_menu_id).or_default();
            let idx = section_id as usize;
            if entry.len() <= idx {
                entry.resize(idx + 1, Section::new());
            }
            entry[idx] = parsed;
        }
    }

    /// When we issued `Start([0])` on behalf of a locally-addressed
    /// `START_INDEX` request, the remote replies with `menu.id == 0`; that
    /// must come back to us as `START_INDEX` to preserve injectivity.
    fn rewrite_incoming_id(&self, remote_menu_id: u32, remote_id_requested: u32, local_id_requested: u32) -> u32 {
        if !self.is_menubar && remote_id_requested == 0 && local_id_requested == START_INDEX && remote_menu_id == 0 {
            START_INDEX
        } else {
            remote_menu_id
        }
    }

    /// Release subscriptions. Best-effort: the bulk `End` call is fire-and
    /// -forget from the caller's perspective (teardown).
    pub async fn stop(
        &mut self,
        connection: &zbus::Connection,
        ids: &[u32],
    ) -> Result<Vec<ModelEvent>, MenuModelError> {
        let had_menu = self.has_menu();
        let remote_ids: Vec<u32> = ids.iter().map(|id| self.remote_id_for(*id)).collect();

        let proxy = self
            .proxy(connection)
            .await
            .map_err(|source| MenuModelError::StopFailed { ids: ids.to_vec(), source })?;
        let result: Result<(), zbus::Error> = proxy.call("End", &(remote_ids,)).await;
        result.map_err(|source| MenuModelError::StopFailed { ids: ids.to_vec(), source })?;

        for id in ids {
            self.active.remove(id);
            self.probing.remove(id);
            self.menus.remove(id);
        }

        let mut events = Vec::new();
        if had_menu && !self.has_menu() {
            events.push(ModelEvent::MenuDisappeared);
        }
        Ok(events)
    }

    /// Apply one `org.gtk.Menus.Changed` signal payload.
    pub fn apply_changes(&mut self, changes: Vec<RawChange>) -> Vec<ModelEvent> {
        let had_menu = self.has_menu();
        let mut dirty_items: HashSet<(u32, u32, u32)> = HashSet::new();
        let mut dirty_menus: HashSet<(u32, u32)> = HashSet::new();
        let mut events = Vec::new();

        for (subscription, section, position, remove_count, raw_items) in changes {
            let local_sub = if !self.is_menubar && subscription == 0 {
                START_INDEX
            } else {
                subscription
            };

            if !self.active.contains(&local_sub) {
                // Authoritative state arrives via the Start reply; the
                // caller is expected to call `start(local_sub)` in
                // response to this, which we surface via `Subscribed`-style
                // bookkeeping being skipped here (caller drives it).
                continue;
            }

            let items: Vec<MenuItem> = raw_items
                .into_iter()
                .map(|raw| {
                    let mut item = MenuItem::from_raw(raw);
                    if !self.is_menubar {
                        item.rewrite_subscription(0, START_INDEX);
                    }
                    item
                })
                .collect();

            let sections = self.menus.entry(local_sub).or_default();
            let sec_idx = section as usize;
            if sections.len() <= sec_idx {
                sections.resize(sec_idx + 1, Section::new());
            }
            let target_section = &mut sections[sec_idx];

            let remove_count = remove_count as usize;
            let position = (position as usize).min(target_section.len());
            let end = (position + remove_count).min(target_section.len());

            if remove_count == items.len() {
                for (offset, item) in items.into_iter().enumerate() {
                    let at = position + offset;
                    if at < target_section.len() {
                        target_section[at] = item;
                    } else {
                        target_section.push(item);
                    }
                    dirty_items.insert((local_sub, section, at as u32));
                }
            } else {
                target_section.splice(position..end, items);
                dirty_menus.insert((local_sub, section));
            }
        }

        // A subscription whose sections have all been spliced down to empty
        // no longer holds any menu data; drop its key so `has_menu()`
        // reflects that (invariant: `has_menu() <=> menus` non-empty).
        self.menus.retain(|_, sections| sections.iter().any(|section| !section.is_empty()));

        if !had_menu && self.has_menu() {
            events.push(ModelEvent::MenuAppeared);
        } else if had_menu && !self.has_menu() {
            events.push(ModelEvent::MenuDisappeared);
        }
        if !dirty_items.is_empty() {
            events.push(ModelEvent::ItemsChanged(dirty_items));
        }
        if !dirty_menus.is_empty() {
            events.push(ModelEvent::MenusChanged(dirty_menus));
        }
        events
    }

    /// Subscriptions referencing `subscription == subscription_not_active`
    /// should trigger the caller to issue `start` again; this reports which
    /// subscriptions a `Changed` batch referenced that aren't active yet.
    pub fn unresolved_subscriptions(&self, changes: &[RawChange]) -> HashSet<u32> {
        changes
            .iter()
            .map(|(sub, ..)| {
                if !self.is_menubar && *sub == 0 {
                    START_INDEX
                } else {
                    *sub
                }
            })
            .filter(|sub| !self.active.contains(sub))
            .collect()
    }

    /// For every item across the whole model whose `action` equals
    /// `prefix` + one of `dirty_actions`, collect its `(sub, sec, idx)`.
    /// Builds the dirty-name set once to stay roughly linear in item count.
    pub fn items_referencing_actions(&self, prefix: &str, dirty_actions: &HashSet<String>) -> HashSet<(u32, u32, u32)> {
        let prefixed: HashSet<String> = dirty_actions.iter().map(|a| format!("{prefix}{a}")).collect();
        let mut out = HashSet::new();
        for (&sub, sections) in &self.menus {
            for (sec_idx, section) in sections.iter().enumerate() {
                for (idx, item) in section.iter().enumerate() {
                    if let Some(action) = item.action() {
                        if prefixed.contains(action) {
                            out.insert((sub, sec_idx as u32, idx as u32));
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
impl MenuModel {
    /// Seed a section directly, bypassing `Start`/`Changed`, for tests that
    /// exercise section-alias expansion without a live connection.
    pub(crate) fn seed_section(&mut self, sub: u32, sec: u32, items: Vec<MenuItem>) {
        self.active.insert(sub);
        let sections = self.menus.entry(sub).or_default();
        if sections.len() <= sec as usize {
            sections.resize(sec as usize + 1, Section::new());
        }
        sections[sec as usize] = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmenu::types::RawItem;

    fn item(label: &str) -> RawItem {
        HashMap::from([("label".to_string(), crate::gmenu::types::owned_value(zvariant::Str::from(label)))])
    }

    #[test]
    fn apply_changes_in_place_update_preserves_section_length() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        model.active.insert(1);
        model.menus.insert(1, vec![vec![MenuItem::from_raw(item("Undo")), MenuItem::from_raw(item("Redo"))]]);

        let before_len = model.get_section(1, 0).unwrap().len();
        let events = model.apply_changes(vec![(1, 0, 0, 1, vec![item("Undo typing")])]);

        assert_eq!(model.get_section(1, 0).unwrap().len(), before_len);
        assert_eq!(model.get_item(1, 0, 0).unwrap().label(), Some("Undo typing"));
        assert!(matches!(events.as_slice(), [ModelEvent::ItemsChanged(dirty)] if dirty.contains(&(1, 0, 0))));
    }

    #[test]
    fn apply_changes_splice_marks_menu_dirty_not_item_dirty() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        model.active.insert(1);
        model.menus.insert(1, vec![vec![MenuItem::from_raw(item("A"))]]);

        let events = model.apply_changes(vec![(1, 0, 0, 1, vec![item("B"), item("C")])]);
        assert_eq!(model.get_section(1, 0).unwrap().len(), 2);
        assert!(matches!(events.as_slice(), [ModelEvent::MenusChanged(dirty)] if dirty.contains(&(1, 0))));
    }

    #[test]
    fn apply_changes_ignores_unknown_subscription() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        let events = model.apply_changes(vec![(99, 0, 0, 0, vec![item("X")])]);
        assert!(events.is_empty());
        assert!(!model.has_menu());
    }

    #[test]
    fn menu_appeared_and_disappeared_fire_on_edges() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        model.active.insert(1);
        let events = model.apply_changes(vec![(1, 0, 0, 0, vec![item("A")])]);
        assert!(events.contains(&ModelEvent::MenuAppeared));

        let events = model.apply_changes(vec![(1, 0, 0, 1, vec![])]);
        assert!(events.contains(&ModelEvent::MenuDisappeared));
        assert!(model.menus.is_empty());
    }

    #[test]
    fn emptying_one_section_keeps_the_subscription_if_another_still_has_items() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        model.active.insert(1);
        model.menus.insert(1, vec![vec![MenuItem::from_raw(item("A"))], vec![MenuItem::from_raw(item("B"))]]);

        let events = model.apply_changes(vec![(1, 0, 0, 1, vec![])]);
        assert!(!events.contains(&ModelEvent::MenuDisappeared));
        assert!(model.has_menu());
        assert!(model.get_section(1, 1).is_some());
    }

    #[test]
    fn unresolved_subscriptions_reports_subs_not_yet_active() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        model.active.insert(1);

        let changes = vec![(1, 0, 0, 0, vec![item("A")]), (2, 0, 0, 0, vec![item("B")])];
        assert_eq!(model.unresolved_subscriptions(&changes), HashSet::from([2]));
    }

    #[test]
    fn items_referencing_actions_finds_prefixed_matches_only() {
        let mut model = MenuModel::new("org.example.App", "/menus", true);
        model.active.insert(1);
        let mut quit = item("Quit");
        quit.insert("action".to_string(), crate::gmenu::types::owned_value(zvariant::Str::from("app.quit")));
        model.menus.insert(1, vec![vec![MenuItem::from_raw(quit)]]);

        let dirty = HashSet::from(["quit".to_string()]);
        let found = model.items_referencing_actions("app.", &dirty);
        assert_eq!(found, HashSet::from([(1, 0, 0)]));

        let dirty_unrelated = HashSet::from(["save".to_string()]);
        assert!(model.items_referencing_actions("app.", &dirty_unrelated).is_empty());
    }
}
