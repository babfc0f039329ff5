//! Ambient X11 window discovery: polls `_NET_CLIENT_LIST` on the root
//! window and reads the handful of properties that tell us a window
//! exports a GMenu-based menu. Grounded on the property-setting side of
//! this in `menubar/common/mod.rs::x11::set_appmenu_hints`; here we read
//! instead of write.

use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CString};

use x11_dl::xlib::{self, Xlib};

use crate::error::WatcherError;

/// Properties read off a window at discovery time. A missing property is
/// `None`, never an error.
#[derive(Debug, Clone, Default)]
pub struct WindowProperties {
    pub gtk_unique_bus_name: Option<String>,
    pub gtk_application_object_path: Option<String>,
    pub unity_object_path: Option<String>,
    pub gtk_window_object_path: Option<String>,
    pub gtk_app_menu_object_path: Option<String>,
    pub gtk_menubar_object_path: Option<String>,
}

impl WindowProperties {
    /// A window is menu-capable when it names its bus and at least one of
    /// the two menu object paths.
    pub fn is_menu_capable(&self) -> bool {
        self.gtk_unique_bus_name.is_some()
            && (self.gtk_app_menu_object_path.is_some() || self.gtk_menubar_object_path.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    WindowAdded(u32),
    WindowRemoved(u32),
}

struct Atoms {
    net_client_list: xlib::Atom,
    gtk_unique_bus_name: xlib::Atom,
    gtk_application_object_path: xlib::Atom,
    unity_object_path: xlib::Atom,
    gtk_window_object_path: xlib::Atom,
    gtk_app_menu_object_path: xlib::Atom,
    gtk_menubar_object_path: xlib::Atom,
    utf8_string: xlib::Atom,
}

/// Owns the X11 display connection and the set of currently known windows.
pub struct WindowWatcher {
    xlib: Xlib,
    display: *mut xlib::Display,
    root: xlib::Window,
    atoms: Atoms,
    known: HashSet<u32>,
}

impl WindowWatcher {
    pub fn open() -> Result<Self, WatcherError> {
        let xlib = Xlib::open().map_err(|e| WatcherError::LibraryLoad(e.to_string()))?;
        unsafe {
            let display = (xlib.XOpenDisplay)(std::ptr::null());
            if display.is_null() {
                return Err(WatcherError::DisplayOpenFailed);
            }
            let root = (xlib.XDefaultRootWindow)(display);
            let atoms = Atoms {
                net_client_list: intern(&xlib, display, "_NET_CLIENT_LIST")?,
                gtk_unique_bus_name: intern(&xlib, display, "_GTK_UNIQUE_BUS_NAME")?,
                gtk_application_object_path: intern(&xlib, display, "_GTK_APPLICATION_OBJECT_PATH")?,
                unity_object_path: intern(&xlib, display, "_UNITY_OBJECT_PATH")?,
                gtk_window_object_path: intern(&xlib, display, "_GTK_WINDOW_OBJECT_PATH")?,
                gtk_app_menu_object_path: intern(&xlib, display, "_GTK_APP_MENU_OBJECT_PATH")?,
                gtk_menubar_object_path: intern(&xlib, display, "_GTK_MENUBAR_OBJECT_PATH")?,
                utf8_string: intern(&xlib, display, "UTF8_STRING")?,
            };
            Ok(Self { xlib, display, root, atoms, known: HashSet::new() })
        }
    }

    /// Read the current `_NET_CLIENT_LIST`, diff against what we already
    /// knew about, and return add/remove events plus the properties of any
    /// newly discovered menu-capable window.
    pub fn poll(&mut self) -> (Vec<WatcherEvent>, HashMap<u32, WindowProperties>) {
        let current = self.read_client_list();
        let mut events = Vec::new();
        let mut discovered = HashMap::new();

        for &window in &current {
            if self.known.contains(&window) {
                continue;
            }
            let props = self.read_window_properties(window);
            if props.is_menu_capable() {
                self.known.insert(window);
                discovered.insert(window, props);
                events.push(WatcherEvent::WindowAdded(window));
            }
        }

        let gone: Vec<u32> = self.known.difference(&current).copied().collect();
        for window in gone {
            self.known.remove(&window);
            events.push(WatcherEvent::WindowRemoved(window));
        }

        (events, discovered)
    }

    fn read_client_list(&self) -> HashSet<u32> {
        let raw = unsafe { self.read_property_raw(self.root, self.atoms.net_client_list, xlib::XA_WINDOW) };
        match raw {
            Some(bytes) => bytes
                .chunks_exact(std::mem::size_of::<xlib::Window>())
                .map(|chunk| {
                    let mut buf = [0u8; std::mem::size_of::<xlib::Window>()];
                    buf.copy_from_slice(chunk);
                    xlib::Window::from_ne_bytes(buf) as u32
                })
                .collect(),
            None => HashSet::new(),
        }
    }

    fn read_window_properties(&self, window: u32) -> WindowProperties {
        WindowProperties {
            gtk_unique_bus_name: self.read_utf8_property(window, self.atoms.gtk_unique_bus_name),
            gtk_application_object_path: self.read_utf8_property(window, self.atoms.gtk_application_object_path),
            unity_object_path: self.read_utf8_property(window, self.atoms.unity_object_path),
            gtk_window_object_path: self.read_utf8_property(window, self.atoms.gtk_window_object_path),
            gtk_app_menu_object_path: self.read_utf8_property(window, self.atoms.gtk_app_menu_object_path),
            gtk_menubar_object_path: self.read_utf8_property(window, self.atoms.gtk_menubar_object_path),
        }
    }

    fn read_utf8_property(&self, window: u32, atom: xlib::Atom) -> Option<String> {
        let bytes = unsafe { self.read_property_raw(window as xlib::Window, atom, self.atoms.utf8_string)? };
        match String::from_utf8(bytes) {
            Ok(s) if !s.is_empty() => Some(s),
            Ok(_) => None,
            Err(_) => {
                log::debug!("window {window}: property value was not valid UTF-8");
                None
            }
        }
    }

    unsafe fn read_property_raw(&self, window: xlib::Window, atom: xlib::Atom, expected_type: xlib::Atom) -> Option<Vec<u8>> {
        let mut actual_type: xlib::Atom = 0;
        let mut actual_format: i32 = 0;
        let mut item_count: u64 = 0;
        let mut bytes_after: u64 = 0;
        let mut data: *mut u8 = std::ptr::null_mut();

        let status = (self.xlib.XGetWindowProperty)(
            self.display,
            window,
            atom,
            0,
            i64::MAX / 4,
            xlib::False,
            expected_type,
            &mut actual_type,
            &mut actual_format,
            &mut item_count,
            &mut bytes_after,
            &mut data,
        );

        if status != 0 || data.is_null() || actual_type != expected_type || item_count == 0 {
            if !data.is_null() {
                (self.xlib.XFree)(data as *mut c_void);
            }
            return None;
        }

        let byte_width = (actual_format / 8).max(1) as usize;
        let len = item_count as usize * byte_width;
        let out = std::slice::from_raw_parts(data, len).to_vec();
        (self.xlib.XFree)(data as *mut c_void);
        Some(out)
    }
}

unsafe fn intern(xlib: &Xlib, display: *mut xlib::Display, name: &'static str) -> Result<xlib::Atom, WatcherError> {
    let cname = CString::new(name).expect("atom name has no interior nul");
    let atom = (xlib.XInternAtom)(display, cname.as_ptr(), xlib::False);
    if atom == 0 {
        return Err(WatcherError::AtomInternFailed(name));
    }
    Ok(atom)
}

impl Drop for WindowWatcher {
    fn drop(&mut self) {
        unsafe {
            (self.xlib.XCloseDisplay)(self.display);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_capable_requires_bus_name_and_one_menu_path() {
        let mut props = WindowProperties::default();
        assert!(!props.is_menu_capable());

        props.gtk_unique_bus_name = Some(":1.23".to_string());
        assert!(!props.is_menu_capable());

        props.gtk_menubar_object_path = Some("/org/example/menubar".to_string());
        assert!(props.is_menu_capable());
    }
}
