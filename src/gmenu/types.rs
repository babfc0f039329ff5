//! Wire types and the in-memory `MenuItem`/`Section` shapes GMenu data is
//! translated into.

use std::collections::HashMap;

use zvariant::{OwnedValue, Value};

/// A GMenu attribute map as delivered over the bus: `a{sv}`.
pub type RawItem = HashMap<String, OwnedValue>;

/// One `(menu_id, section_id, items)` triple as returned by
/// `org.gtk.Menus.Start`: `a(uuaa{sv})`.
pub type RawSection = (u32, u32, Vec<RawItem>);

/// One `(subscription, section, position, remove_count, items)` entry from a
/// `org.gtk.Menus.Changed` signal: `a(uuuuaa{sv})`.
pub type RawChange = (u32, u32, u32, u32, Vec<RawItem>);

/// A `:section` or `:submenu` reference: `(uu)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuRef {
    /// The referenced subscription id.
    pub subscription: u32,
    /// The referenced section index within that subscription.
    pub section: u32,
}

/// Why a GMenu item is hidden, per the `hidden-when` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenWhen {
    ActionDisabled,
    ActionMissing,
    MacosMenubar,
}

impl HiddenWhen {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "action-disabled" => Some(Self::ActionDisabled),
            "action-missing" => Some(Self::ActionMissing),
            "macos-menubar" => Some(Self::MacosMenubar),
            _ => None,
        }
    }
}

/// A single GMenu item, as an unordered attribute map plus the parsed
/// `:section`/`:submenu` references for convenient matching.
#[derive(Debug, Clone, Default)]
pub struct MenuItem {
    attrs: RawItem,
    section_ref: Option<MenuRef>,
    submenu_ref: Option<MenuRef>,
}

impl MenuItem {
    /// Build a `MenuItem` from a raw attribute map, parsing out the
    /// `:section`/`:submenu` references.
    pub fn from_raw(attrs: RawItem) -> Self {
        let section_ref = attrs.get(":section").and_then(parse_menu_ref);
        let submenu_ref = attrs.get(":submenu").and_then(parse_menu_ref);
        Self {
            attrs,
            section_ref,
            submenu_ref,
        }
    }

    /// Construct a synthetic item not backed by any remote data (used for
    /// the virtual-root rewrite).
    pub fn synthetic(attrs: RawItem) -> Self {
        Self::from_raw(attrs)
    }

    pub fn label(&self) -> Option<&str> {
        self.string_attr("label")
    }

    pub fn action(&self) -> Option<&str> {
        self.string_attr("action")
    }

    pub fn target(&self) -> Option<&OwnedValue> {
        self.attrs.get("target")
    }

    pub fn accel(&self) -> Option<&str> {
        self.string_attr("accel")
    }

    pub fn icon(&self) -> Option<&str> {
        self.string_attr("icon")
    }

    pub fn verb_icon(&self) -> Option<&str> {
        self.string_attr("verb-icon")
    }

    pub fn hidden_when(&self) -> Option<HiddenWhen> {
        self.string_attr("hidden-when").and_then(HiddenWhen::parse)
    }

    pub fn section_ref(&self) -> Option<MenuRef> {
        self.section_ref
    }

    pub fn submenu_ref(&self) -> Option<MenuRef> {
        self.submenu_ref
    }

    pub fn is_section_alias(&self) -> bool {
        self.section_ref.is_some()
    }

    pub fn is_submenu(&self) -> bool {
        self.submenu_ref.is_some()
    }

    /// Rewrite subscription `0` to `new_sub` in this item's `:section`
    /// and `:submenu` references, used by the virtual-root rewrite.
    pub fn rewrite_subscription(&mut self, from: u32, to: u32) {
        if let Some(r) = &mut self.section_ref {
            if r.subscription == from {
                r.subscription = to;
            }
        }
        if let Some(r) = &mut self.submenu_ref {
            if r.subscription == from {
                r.subscription = to;
            }
        }
    }

    fn string_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.downcast_ref::<zvariant::Str>().ok()).map(|s| s.as_str())
    }
}

fn parse_menu_ref(value: &OwnedValue) -> Option<MenuRef> {
    let structure = value.downcast_ref::<zvariant::Structure>().ok()?;
    let fields = structure.fields();
    if fields.len() != 2 {
        return None;
    }
    let subscription: u32 = (&fields[0]).try_into().ok()?;
    let section: u32 = (&fields[1]).try_into().ok()?;
    Some(MenuRef { subscription, section })
}

/// An ordered list of [`MenuItem`].
pub type Section = Vec<MenuItem>;

/// Build an [`OwnedValue`] from any type [`Value`] can wrap, for assembling
/// DBusMenu property maps.
pub fn owned_value<'a, T: Into<Value<'a>>>(value: T) -> OwnedValue {
    OwnedValue::try_from(value.into()).expect("infallible conversion from owned Value")
}
