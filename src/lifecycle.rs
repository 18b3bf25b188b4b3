//! Component lifecycle.
//!
//! Phase entries are driven from outside (normally by whatever mutates the tree); here they only
//! run hooks. Three independent axes: attached/detached, enabled/disabled and active/inactive.
//! Each has a one-time hook that runs on its first entry only. `setup` is a fourth one-time gate
//! of its own.

use crate::component::{Component, Deferred};
use crate::element::ElementId;
use crate::error::Result;
use crate::stage::Stage;
use tracing::trace;

/// One-time gates of a component instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleFlags {
    pub setup: bool,
    pub initialized: bool,
    pub first_enable: bool,
    pub first_active: bool,
}

impl Stage {
    pub fn lifecycle_flags(&self, id: ElementId) -> Option<LifecycleFlags> {
        Some(self.element(id)?.component.as_ref()?.flags)
    }

    /// Sets a one-time gate; returns true if it was not yet set. Plain elements have no gates.
    fn pass_gate(&mut self, id: ElementId, gate: fn(&mut LifecycleFlags) -> &mut bool) -> Result<bool> {
        match self.element_mut(id)?.component.as_mut() {
            Some(slot) => {
                let flag = gate(&mut slot.flags);
                let first = !*flag;
                *flag = true;
                Ok(first)
            }
            None => Ok(false),
        }
    }

    fn run_hook(&mut self, id: ElementId, hook: fn(&mut dyn Component, &mut crate::Cx)) -> Result<()> {
        self.element_ref(id)?;
        self.with_behavior(id, hook);
        Ok(())
    }

    pub fn on_setup(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "setup");
        if self.pass_gate(id, |f| &mut f.setup)? {
            self.run_hook(id, |c, cx| c.setup(cx))?;
        }
        Ok(())
    }

    pub fn on_attach(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "attach");
        if self.pass_gate(id, |f| &mut f.initialized)? {
            self.run_hook(id, |c, cx| c.init(cx))?;
        }
        self.run_hook(id, |c, cx| c.attach(cx))
    }

    pub fn on_detach(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "detach");
        self.run_hook(id, |c, cx| c.detach(cx))
    }

    pub fn on_enabled(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "enabled");
        if self.pass_gate(id, |f| &mut f.first_enable)? {
            self.run_hook(id, |c, cx| c.first_enable(cx))?;
        }
        self.run_hook(id, |c, cx| c.enable(cx))
    }

    pub fn on_disabled(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "disabled");
        self.run_hook(id, |c, cx| c.disable(cx))
    }

    pub fn on_active(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "active");
        if self.pass_gate(id, |f| &mut f.first_active)? {
            self.run_hook(id, |c, cx| c.first_active(cx))?;
        }
        self.run_hook(id, |c, cx| c.active(cx))
    }

    pub fn on_inactive(&mut self, id: ElementId) -> Result<()> {
        trace!(?id, "inactive");
        self.run_hook(id, |c, cx| c.inactive(cx))
    }

    /// The named state of a component; empty in the base state.
    pub fn state(&self, id: ElementId) -> Option<&str> {
        Some(self.element(id)?.component.as_ref()?.state.as_str())
    }

    /// Switches a component's named state.
    ///
    /// A change calls `state_changed` and then recomputes the focus path, if there still is an
    /// application. Both wait for a component's own running hook to return.
    pub fn set_state(&mut self, id: ElementId, state: &str) -> Result<()> {
        let slot = self
            .element_mut(id)?
            .component
            .as_mut()
            .ok_or(crate::Error::NotAComponent(id))?;
        if slot.state == state {
            return Ok(());
        }
        let from = core::mem::replace(&mut slot.state, state.to_owned());
        trace!(?id, from = %from, to = state, "state change");

        if self.is_busy(id) {
            self.deferred.push(Deferred::StateChanged {
                id,
                from,
                to: state.to_owned(),
            });
        } else {
            self.with_behavior(id, |c, cx| c.state_changed(cx, &from, state));
        }
        self.refocus()
    }

    /// Requests a focus path update. A no-op without an application; while hooks run, the update
    /// waits for the outermost one to return.
    pub fn refocus(&mut self) -> Result<()> {
        if self.application.is_some() {
            self.update_focus_path()?;
        }
        Ok(())
    }

    /// Runs setup, attach, enable and active over every component in a subtree, parents first.
    pub fn mount(&mut self, id: ElementId) -> Result<()> {
        let components = self.subtree_components(id);
        for &c in &components {
            self.on_setup(c)?;
        }
        for &c in &components {
            self.on_attach(c)?;
        }
        for &c in &components {
            self.on_enabled(c)?;
        }
        for &c in &components {
            self.on_active(c)?;
        }
        Ok(())
    }

    /// Runs inactive, disable and detach over every component in a subtree, children first.
    pub fn unmount(&mut self, id: ElementId) -> Result<()> {
        let mut components = self.subtree_components(id);
        components.reverse();
        for &c in &components {
            self.on_inactive(c)?;
        }
        for &c in &components {
            self.on_disabled(c)?;
        }
        for &c in &components {
            self.on_detach(c)?;
        }
        Ok(())
    }

    /// All components in a subtree in pre-order, including nested ones.
    fn subtree_components(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if self.is_component(id) {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentType, Registry};
    use crate::template::Template;
    use crate::Cx;

    #[derive(Debug, Default)]
    struct Counted {
        log: Vec<&'static str>,
    }

    impl Counted {
        fn count(&self, hook: &str) -> usize {
            self.log.iter().filter(|h| **h == hook).count()
        }
    }

    impl Component for Counted {
        fn setup(&mut self, _: &mut Cx) {
            self.log.push("setup");
        }
        fn init(&mut self, _: &mut Cx) {
            self.log.push("init");
        }
        fn attach(&mut self, _: &mut Cx) {
            self.log.push("attach");
        }
        fn detach(&mut self, _: &mut Cx) {
            self.log.push("detach");
        }
        fn first_enable(&mut self, _: &mut Cx) {
            self.log.push("first_enable");
        }
        fn enable(&mut self, _: &mut Cx) {
            self.log.push("enable");
        }
        fn disable(&mut self, _: &mut Cx) {
            self.log.push("disable");
        }
        fn first_active(&mut self, _: &mut Cx) {
            self.log.push("first_active");
        }
        fn active(&mut self, _: &mut Cx) {
            self.log.push("active");
        }
        fn inactive(&mut self, _: &mut Cx) {
            self.log.push("inactive");
        }
        fn state_changed(&mut self, _: &mut Cx, from: &str, _to: &str) {
            self.log.push(if from.is_empty() { "enter" } else { "leave" });
        }
    }

    #[derive(Debug, Default)]
    struct Holder;
    impl Component for Holder {
        fn template() -> Template {
            template! { Box: { Child: { type: ComponentType::of::<Counted>() } } }
        }
    }

    /// Moves itself into `Ready` when initialized.
    #[derive(Debug, Default)]
    struct SelfStarting {
        log: Vec<String>,
    }

    impl Component for SelfStarting {
        fn init(&mut self, cx: &mut Cx) {
            cx.set_state("Ready").unwrap();
            self.log.push(format!("init in [{}]", cx.state()));
        }
        fn state_changed(&mut self, cx: &mut Cx, from: &str, to: &str) {
            self.log.push(format!("[{}] -> [{}] in [{}]", from, to, cx.state()));
        }
    }

    fn stage() -> Stage {
        let stage = Stage::new(Registry::new());
        stage.register::<Counted>();
        stage.register::<Holder>();
        stage.register::<SelfStarting>();
        stage
    }

    #[test]
    fn one_time_hooks_run_once() {
        let mut stage = stage();
        let id = stage.create_component::<Counted>(None).unwrap();

        for _ in 0..3 {
            stage.on_setup(id).unwrap();
            stage.on_attach(id).unwrap();
            stage.on_enabled(id).unwrap();
            stage.on_active(id).unwrap();
        }

        let c = stage.behavior::<Counted>(id).unwrap();
        assert_eq!(c.count("setup"), 1);
        assert_eq!(c.count("init"), 1);
        assert_eq!(c.count("first_enable"), 1);
        assert_eq!(c.count("first_active"), 1);
        assert_eq!(c.count("attach"), 3);
        assert_eq!(c.count("enable"), 3);
        assert_eq!(c.count("active"), 3);
    }

    #[test]
    fn setup_and_init_are_separate_gates() {
        let mut stage = stage();
        let id = stage.create_component::<Counted>(None).unwrap();

        stage.on_attach(id).unwrap();
        let flags = stage.lifecycle_flags(id).unwrap();
        assert!(flags.initialized);
        assert!(!flags.setup);

        stage.on_setup(id).unwrap();
        let c = stage.behavior::<Counted>(id).unwrap();
        assert_eq!(c.log, ["init", "attach", "setup"]);
    }

    #[test]
    fn leaving_hooks_always_run() {
        let mut stage = stage();
        let id = stage.create_component::<Counted>(None).unwrap();
        for _ in 0..2 {
            stage.on_detach(id).unwrap();
            stage.on_disabled(id).unwrap();
            stage.on_inactive(id).unwrap();
        }
        let c = stage.behavior::<Counted>(id).unwrap();
        assert_eq!(c.count("detach"), 2);
        assert_eq!(c.count("disable"), 2);
        assert_eq!(c.count("inactive"), 2);
    }

    #[test]
    fn plain_elements_are_ignored_and_missing_ones_fail() {
        let mut stage = stage();
        let plain = stage.create_element();
        stage.on_attach(plain).unwrap();
        stage.remove(plain).unwrap();
        assert!(stage.on_attach(plain).is_err());
    }

    #[test]
    fn mount_reaches_nested_components() {
        let mut stage = stage();
        let holder = stage.create_component::<Holder>(None).unwrap();
        let child = stage.tag(holder, "Box.Child").unwrap();

        stage.mount(holder).unwrap();
        stage.unmount(holder).unwrap();

        let c = stage.behavior::<Counted>(child).unwrap();
        assert_eq!(
            c.log,
            [
                "setup",
                "init",
                "attach",
                "first_enable",
                "enable",
                "first_active",
                "active",
                "inactive",
                "disable",
                "detach",
            ]
        );
    }

    #[test]
    fn state_changes_notify_and_tolerate_no_application() {
        let mut stage = stage();
        let id = stage.create_component::<Counted>(None).unwrap();
        assert_eq!(stage.state(id), Some(""));

        stage.set_state(id, "Loading").unwrap();
        stage.set_state(id, "Loading").unwrap();
        stage.set_state(id, "").unwrap();

        assert_eq!(stage.state(id), Some(""));
        let c = stage.behavior::<Counted>(id).unwrap();
        assert_eq!(c.log, ["enter", "leave"]);
    }

    #[test]
    fn state_set_by_own_hook_notifies_once_it_returns() {
        let mut stage = stage();
        let id = stage.create_component::<SelfStarting>(None).unwrap();
        stage.on_attach(id).unwrap();
        stage.on_attach(id).unwrap();

        assert_eq!(stage.state(id), Some("Ready"));
        let log = &stage.behavior::<SelfStarting>(id).unwrap().log;
        assert_eq!(log, &["init in [Ready]", "[] -> [Ready] in [Ready]"]);
    }

    #[test]
    fn state_set_on_a_child_from_a_hook_notifies_at_once() {
        let mut stage = stage();
        let holder = stage.create_component::<Holder>(None).unwrap();
        let child = stage.tag(holder, "Box.Child").unwrap();

        let log = stage
            .with_behavior(holder, |_, cx| {
                cx.stage().set_state(child, "Open").unwrap();
                cx.stage().behavior::<Counted>(child).unwrap().log.clone()
            })
            .unwrap();
        assert_eq!(log, ["enter"]);
    }
}
