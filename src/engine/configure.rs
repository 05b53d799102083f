//! User account, locale, time zone and keyboard configuration of the installed system.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::InstallationEngine;
use crate::commands::{ChmodArgs, ChownArgs, MkdirArgs, PasswdArgs, UserAddArgs, UserModGroupArgs};
use crate::error::Result;
use crate::progress::Reporter;
use crate::runner::ProcessRunner;
use crate::setup::KeyboardSelection;

/// Supplementary groups every installed user joins
pub const USER_GROUPS: &[&str] = &["audio", "video", "wheel"];

const AUTOLOGIN_KEY: &str = "autologin-user";

/// Contents of `/etc/env.d/02locale`
pub fn locale_env(language: &str) -> String {
    format!(
        "LC_COLLATE=C\nLC_ALL={0}.UTF-8\nLANG={0}.UTF-8\n",
        language
    )
}

/// `/etc/environment` assembled from the `env.d` fragments in name order, comments dropped
pub fn assemble_environment(env_d: &Path) -> std::io::Result<String> {
    let mut fragments: Vec<_> = fs::read_dir(env_d)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    fragments.sort();

    let mut environment = String::new();
    for fragment in fragments {
        let content = fs::read_to_string(&fragment)?;
        for line in content.lines().filter(|line| !line.starts_with('#')) {
            environment.push_str(line);
            environment.push('\n');
        }
    }
    Ok(environment)
}

/// Console keymap for OpenRC's `conf.d/keymaps`
pub fn keymaps_conf(keyboard: &KeyboardSelection) -> String {
    let primary = if keyboard.primary.is_empty() {
        "en"
    } else {
        keyboard.primary.as_str()
    };
    format!("keymap=\"{}{}\"\n", primary, keyboard.variant)
}

/// X11 `InputClass` section; layout and variant are written as stored
pub fn x11_keyboard_conf(layout: &str, model: &str, variant: &str, composite: bool) -> String {
    let toggle = if composite { "" } else { "#" };
    format!(
        "Section \"InputClass\"\n\
         Identifier \"system-keyboard\"\n\
         MatchIsKeyboard \"on\"\n\
         Option \"XkbLayout\" \"{layout}\"\n\
         Option \"XkbModel\" \"{model}\"\n\
         Option \"XkbVariant\" \"{variant}\"\n\
         {toggle}Option \"XkbOptions\" \"grp:alt_shift_toggle\"\n\
         EndSection\n"
    )
}

/// Point every (possibly commented) `autologin-user=` line at `user`.
///
/// Returns `None` when the file has no such line.
pub fn patch_autologin(content: &str, user: &str) -> Option<String> {
    let mut found = false;
    let mut patched: Vec<String> = content
        .lines()
        .map(|line| {
            let key = line.strip_prefix('#').unwrap_or(line);
            let is_autologin = key
                .strip_prefix(AUTOLOGIN_KEY)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if is_autologin {
                found = true;
                format!("{}={}", AUTOLOGIN_KEY, user)
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        return None;
    }
    if content.ends_with('\n') {
        patched.push(String::new());
    }
    Some(patched.join("\n"))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

impl<R: ProcessRunner, S: Reporter> InstallationEngine<R, S> {
    /// Create the user account inside the chroot
    pub(super) fn setup_user(&mut self) -> Result<()> {
        let username = self.setup.username.clone();
        let password = self.setup.password1.clone();
        self.report_within(0, 3, "Adding new user to the system");

        self.exec_in_chroot(&UserAddArgs {
            username: username.clone(),
        });
        // Root gets the user's password as well
        for account in [Some(username.clone()), None] {
            self.exec_in_chroot(&PasswdArgs {
                username: account,
                password: password.clone(),
            });
        }
        for group in USER_GROUPS {
            self.exec_in_chroot(&UserModGroupArgs {
                username: username.clone(),
                group: group.to_string(),
            });
        }

        self.report_within(1, 3, "Creating user data area");
        let data_dir = format!("/data/app/{}", username);
        self.exec_in_chroot(&MkdirArgs {
            path: data_dir.clone(),
        });
        self.exec_in_chroot(&ChmodArgs {
            mode: "641".to_string(),
            path: data_dir.clone(),
        });
        self.exec_in_chroot(&ChownArgs {
            owner: username.clone(),
            path: data_dir,
        });

        if self.setup.autologin {
            self.report_within(2, 3, "Enabling automatic login");
            self.enable_autologin(&username);
        }
        Ok(())
    }

    fn enable_autologin(&self, username: &str) {
        let conf = self.config.in_target("/etc/lightdm/lightdm.conf");
        let content = match fs::read_to_string(&conf) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Autologin not configured, cannot read {}: {}", conf.display(), e);
                return;
            }
        };
        match patch_autologin(&content, username) {
            Some(patched) => {
                if let Err(e) = fs::write(&conf, patched) {
                    tracing::warn!("Cannot write {}: {}", conf.display(), e);
                }
            }
            None => tracing::warn!("No {} entry in {}", AUTOLOGIN_KEY, conf.display()),
        }
    }

    /// Locale, hostname, time zone and keyboard files
    pub(super) fn write_locale_and_console(&mut self) -> Result<()> {
        self.report_within(0, 3, "Setting locale");
        write_file(
            &self.config.in_target("/etc/env.d/02locale"),
            &locale_env(&self.setup.language),
        )?;

        self.report_within(1, 3, "Updating environment");
        let environment = assemble_environment(&self.config.in_target("/etc/env.d"))?;
        write_file(&self.config.in_target("/etc/environment"), &environment)?;

        write_file(
            &self.config.in_target("/etc/hostname"),
            &format!("{}\n", self.setup.hostname),
        )?;
        write_file(
            &self.config.in_target("/etc/timezone"),
            &format!("{}\n", self.setup.timezone),
        )?;
        self.link_localtime()?;

        self.report_within(2, 3, "Setting keyboard options");
        let keyboard = self.setup.keyboard();
        write_file(&self.config.in_target("/etc/conf.d/keymaps"), &keymaps_conf(&keyboard))?;

        self.report_within(3, 3, "Setting X11 keyboard options");
        write_file(
            &self.config.in_target("/etc/X11/xorg.conf.d/10-keyboard.conf"),
            &x11_keyboard_conf(
                &self.setup.keyboard_layout,
                &self.setup.keyboard_model,
                &self.setup.keyboard_variant,
                keyboard.composite,
            ),
        )?;
        Ok(())
    }

    fn link_localtime(&self) -> Result<()> {
        let localtime = self.config.in_target("/etc/localtime");
        if let Err(e) = fs::remove_file(&localtime) {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        let zone = Path::new("/usr/share/zoneinfo").join(&self.setup.timezone);
        std::os::unix::fs::symlink(&zone, &localtime)?;
        Ok(())
    }
}
