//! Patches client-side GTK configuration so GTK2/GTK3 applications load
//! `appmenu-gtk-module` and export their menus over `org.gtk.Menus` in the
//! first place. Grounded on the original proxy's `settings.ini`/`gtkrc-2.0`
//! writer; best-effort, never fatal.

use std::io::Write;

use crate::config::{gtk2_settings_path, gtk3_settings_path};

const MODULE_NAME: &str = "appmenu-gtk-module";

/// Ensure both the gtk-2.0 and gtk-3.0 client config files load the appmenu
/// module. Logs and continues on any individual failure.
pub fn ensure_appmenu_module_enabled() {
    if let Err(err) = patch_gtk3_settings() {
        log::warn!("failed to patch gtk-3.0 settings.ini: {err}");
    }
    if let Err(err) = patch_gtk2_gtkrc() {
        log::warn!("failed to patch gtk-2.0 gtkrc: {err}");
    }
}

fn patch_gtk3_settings() -> std::io::Result<()> {
    let path = gtk3_settings_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    if gtk3_has_module(&existing) {
        return Ok(());
    }

    let updated = patch_gtk3_text(&existing);
    std::fs::write(&path, updated)?;
    log::info!("enabled {MODULE_NAME} in {}", path.display());
    Ok(())
}

fn gtk3_has_module(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        line.starts_with("gtk-modules") && line.contains(MODULE_NAME)
    })
}

fn patch_gtk3_text(existing: &str) -> String {
    let mut out_lines: Vec<String> = Vec::new();
    let mut in_settings = false;
    let mut saw_settings_section = false;
    let mut patched_modules_line = false;

    for line in existing.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            if in_settings && !patched_modules_line {
                out_lines.push(format!("gtk-modules={MODULE_NAME}"));
                patched_modules_line = true;
            }
            in_settings = trimmed.eq_ignore_ascii_case("[Settings]");
            if in_settings {
                saw_settings_section = true;
            }
            out_lines.push(line.to_string());
            continue;
        }

        if in_settings && trimmed.starts_with("gtk-modules") {
            let existing_value = trimmed.splitn(2, '=').nth(1).unwrap_or("").trim();
            let merged = if existing_value.is_empty() {
                MODULE_NAME.to_string()
            } else if existing_value.split(':').any(|m| m == MODULE_NAME) {
                existing_value.to_string()
            } else {
                format!("{existing_value}:{MODULE_NAME}")
            };
            out_lines.push(format!("gtk-modules={merged}"));
            patched_modules_line = true;
            continue;
        }

        out_lines.push(line.to_string());
    }

    if !saw_settings_section {
        out_lines.push("[Settings]".to_string());
        out_lines.push(format!("gtk-modules={MODULE_NAME}"));
    } else if !patched_modules_line {
        out_lines.push(format!("gtk-modules={MODULE_NAME}"));
    }

    let mut result = out_lines.join("\n");
    result.push('\n');
    result
}

fn patch_gtk2_gtkrc() -> std::io::Result<()> {
    let path = gtk2_settings_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    if existing
        .lines()
        .any(|line| line.trim().starts_with("gtk-modules") && line.contains(MODULE_NAME))
    {
        return Ok(());
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "gtk-modules=\"{MODULE_NAME}\"")?;
    log::info!("enabled {MODULE_NAME} in {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_settings_section_when_absent() {
        let patched = patch_gtk3_text("");
        assert!(gtk3_has_module(&patched));
        assert!(patched.contains("[Settings]"));
    }

    #[test]
    fn merges_into_existing_modules_list() {
        let existing = "[Settings]\ngtk-modules=unity-gtk-module\n";
        let patched = patch_gtk3_text(existing);
        assert!(patched.contains("unity-gtk-module"));
        assert!(patched.contains(MODULE_NAME));
        assert!(gtk3_has_module(&patched));
    }

    #[test]
    fn leaves_file_untouched_when_already_present() {
        let existing = format!("[Settings]\ngtk-modules={MODULE_NAME}\n");
        assert!(gtk3_has_module(&existing));
    }
}
