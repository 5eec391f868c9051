//! The editing form as seen by a session driver.

use std::collections::BTreeMap;

use editlock_core::session::Notice;

/// What a session needs from the form it guards.
pub trait EditForm: Send {
    /// Disable every control as a group.
    fn disable_all(&mut self);

    /// Undo [`EditForm::disable_all`]. Controls that were disabled for
    /// their own reasons stay disabled.
    fn enable_all(&mut self);

    fn show_notice(&mut self, notice: &Notice);
}

#[derive(Debug, Clone, Copy, Default)]
struct Control {
    disabled: bool,
    /// Was already disabled when the group was disabled.
    pinned: bool,
}

/// A named set of form controls plus the notices shown to the user.
#[derive(Debug, Clone, Default)]
pub struct FormControls {
    controls: BTreeMap<String, Control>,
    group_disabled: bool,
    notices: Vec<String>,
}

impl FormControls {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            controls: names
                .into_iter()
                .map(|name| (name.into(), Control::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Disable or enable one control independently of the group.
    pub fn set_disabled(&mut self, name: &str, disabled: bool) {
        if let Some(control) = self.controls.get_mut(name) {
            control.disabled = disabled;
            if self.group_disabled {
                control.pinned = disabled;
                control.disabled = true;
            }
        }
    }

    /// `None` for an unknown control.
    pub fn is_disabled(&self, name: &str) -> Option<bool> {
        self.controls.get(name).map(|c| c.disabled)
    }

    pub fn is_group_disabled(&self) -> bool {
        self.group_disabled
    }

    /// Every notice shown so far, oldest first.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn last_notice(&self) -> Option<&str> {
        self.notices.last().map(String::as_str)
    }
}

impl EditForm for FormControls {
    fn disable_all(&mut self) {
        if self.group_disabled {
            return;
        }
        self.group_disabled = true;
        for control in self.controls.values_mut() {
            control.pinned = control.disabled;
            control.disabled = true;
        }
    }

    fn enable_all(&mut self) {
        if !self.group_disabled {
            return;
        }
        self.group_disabled = false;
        for control in self.controls.values_mut() {
            control.disabled = control.pinned;
            control.pinned = false;
        }
    }

    fn show_notice(&mut self, notice: &Notice) {
        tracing::info!(notice = %notice, "Edit form notice");
        self.notices.push(notice.to_string());
    }
}
