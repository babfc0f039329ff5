//! Mirror of one `org.gtk.Actions` group.

use std::collections::{HashMap, HashSet};

use zbus::Proxy;
use zvariant::{OwnedValue, Signature};

use crate::error::ActionGroupError;

const INTERFACE: &str = "org.gtk.Actions";

/// Raw `DescribeAll` / `added` entry shape: `(enabled, parameter_type, state)`.
/// `state` is `av`: zero or one variants, meaning "stateless" or "stateful".
pub type RawActionDescription = (bool, Signature, Vec<OwnedValue>);

/// Everything known about one action.
#[derive(Debug, Clone)]
pub struct ActionState {
    pub enabled: bool,
    pub parameter_type: Option<Signature>,
    pub state: Option<OwnedValue>,
}

impl ActionState {
    fn from_raw(raw: RawActionDescription) -> Self {
        let (enabled, parameter_type, mut state) = raw;
        let parameter_type = if parameter_type.to_string().is_empty() {
            None
        } else {
            Some(parameter_type)
        };
        Self {
            enabled,
            parameter_type,
            state: state.pop(),
        }
    }
}

/// Effects of an [`ActionGroup`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    /// The initial `DescribeAll` load completed.
    Loaded,
    /// These action names changed enabled/state/existence.
    ActionsChanged(HashSet<String>),
}

/// Mutable mirror of one remote action group (`app.`, `win.`, or `unity.`).
pub struct ActionGroup {
    service: String,
    path: String,
    actions: HashMap<String, ActionState>,
    loaded: bool,
}

impl ActionGroup {
    pub fn new(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            actions: HashMap::new(),
            loaded: false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ActionState> {
        self.actions.get(name)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    async fn proxy<'a>(&self, connection: &'a zbus::Connection) -> zbus::Result<Proxy<'a>> {
        Proxy::new(connection, self.service.clone(), self.path.clone(), INTERFACE).await
    }

    pub async fn load(&mut self, connection: &zbus::Connection) -> Result<Vec<ActionEvent>, ActionGroupError> {
        let proxy = self.proxy(connection).await.map_err(ActionGroupError::DescribeAllFailed)?;
        let described: HashMap<String, RawActionDescription> = proxy
            .call("DescribeAll", &())
            .await
            .map_err(ActionGroupError::DescribeAllFailed)?;

        self.actions = described
            .into_iter()
            .map(|(name, raw)| (name, ActionState::from_raw(raw)))
            .collect();
        self.loaded = true;
        Ok(vec![ActionEvent::Loaded])
    }

    /// Apply one `org.gtk.Actions.Changed` signal payload.
    pub fn apply_changes(
        &mut self,
        removed: Vec<String>,
        enabled_changes: HashMap<String, bool>,
        state_changes: HashMap<String, OwnedValue>,
        added: HashMap<String, RawActionDescription>,
    ) -> Vec<ActionEvent> {
        let mut dirty = HashSet::new();

        for name in removed {
            if self.actions.remove(&name).is_some() {
                dirty.insert(name);
            }
        }
        for (name, enabled) in enabled_changes {
            if let Some(state) = self.actions.get_mut(&name) {
                state.enabled = enabled;
                dirty.insert(name);
            }
        }
        for (name, value) in state_changes {
            if let Some(state) = self.actions.get_mut(&name) {
                state.state = Some(value);
                dirty.insert(name);
            }
        }
        for (name, raw) in added {
            self.actions.insert(name.clone(), ActionState::from_raw(raw));
            dirty.insert(name);
        }

        if dirty.is_empty() {
            Vec::new()
        } else {
            vec![ActionEvent::ActionsChanged(dirty)]
        }
    }

    /// Invoke `org.gtk.Actions.Activate(name, parameter, platform_data)`.
    pub async fn trigger(
        &self,
        connection: &zbus::Connection,
        name: &str,
        parameter: Option<OwnedValue>,
        timestamp: u32,
    ) -> Result<(), ActionGroupError> {
        let proxy = self
            .proxy(connection)
            .await
            .map_err(|source| ActionGroupError::ActivateFailed { name: name.to_string(), source })?;

        let params: Vec<zvariant::Value<'_>> = parameter
            .map(|v| vec![zvariant::Value::from(v)])
            .unwrap_or_default();
        let mut platform_data: HashMap<String, zvariant::Value<'_>> = HashMap::new();
        platform_data.insert("timestamp".to_string(), zvariant::Value::from(timestamp));

        proxy
            .call::<_, _, ()>("Activate", &(name, params, platform_data))
            .await
            .map_err(|source| ActionGroupError::ActivateFailed { name: name.to_string(), source })
    }
}

/// Resolve an action reference like `"app.quit"` into the owning-prefix and
/// bare name, per §4.3's lookup rule.
pub fn resolve_prefix(action: &str) -> Option<(&'static str, &str)> {
    if let Some(rest) = action.strip_prefix("app.") {
        Some(("app.", rest))
    } else if let Some(rest) = action.strip_prefix("win.") {
        Some(("win.", rest))
    } else if let Some(rest) = action.strip_prefix("unity.") {
        Some(("unity.", rest))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefix_matches_known_prefixes() {
        assert_eq!(resolve_prefix("app.quit"), Some(("app.", "quit")));
        assert_eq!(resolve_prefix("win.close"), Some(("win.", "close")));
        assert_eq!(resolve_prefix("unity.hud"), Some(("unity.", "hud")));
        assert_eq!(resolve_prefix("custom.thing"), None);
    }

    #[test]
    fn apply_changes_tracks_only_dirty_names() {
        let mut group = ActionGroup::new("org.example.App", "/actions");
        group.actions.insert(
            "quit".to_string(),
            ActionState { enabled: true, parameter_type: None, state: None },
        );

        let mut enabled_changes = HashMap::new();
        enabled_changes.insert("quit".to_string(), false);
        let events = group.apply_changes(Vec::new(), enabled_changes, HashMap::new(), HashMap::new());

        assert_eq!(events, vec![ActionEvent::ActionsChanged(HashSet::from(["quit".to_string()]))]);
        assert!(!group.get("quit").unwrap().enabled);
    }

    #[test]
    fn removed_actions_disappear_from_the_map() {
        let mut group = ActionGroup::new("org.example.App", "/actions");
        group.actions.insert(
            "quit".to_string(),
            ActionState { enabled: true, parameter_type: None, state: None },
        );
        group.apply_changes(vec!["quit".to_string()], HashMap::new(), HashMap::new(), HashMap::new());
        assert!(group.get("quit").is_none());
    }
}
