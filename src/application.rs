//! The application: root of focus.
//!
//! Focus runs along a path of components from the application root downward. Each component on
//! it picks the next one with [`Component::get_focused`](crate::Component::get_focused); the last
//! one is the final focus target.

use crate::element::ElementId;
use crate::error::Result;
use crate::stage::Stage;
use crate::value::ValueMap;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Application {
    root: ElementId,
    focus_path: Vec<ElementId>,
    /// Number of completed focus path updates.
    focus_updates: u64,
    focus_settings: ValueMap,
    /// Set while an update runs, so hooks that trigger another one are skipped.
    updating: bool,
    /// An update was requested while hooks were running.
    pending: bool,
}

impl Application {
    pub fn new(root: ElementId) -> Application {
        Application {
            root,
            focus_path: Vec::new(),
            focus_updates: 0,
            focus_settings: ValueMap::new(),
            updating: false,
            pending: false,
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Components with focus, root first.
    pub fn focus_path(&self) -> &[ElementId] {
        &self.focus_path
    }

    /// The final focus target.
    pub fn focused(&self) -> Option<ElementId> {
        self.focus_path.last().copied()
    }

    pub fn focus_updates(&self) -> u64 {
        self.focus_updates
    }

    /// Settings collected along the focus path by the last update.
    pub fn focus_settings(&self) -> &ValueMap {
        &self.focus_settings
    }
}

impl Stage {
    /// Whether a component is on the focus path.
    pub fn has_focus(&self, id: ElementId) -> bool {
        self.application()
            .map_or(false, |app| app.focus_path.contains(&id))
    }

    /// Whether a component is the final focus target.
    pub fn has_final_focus(&self, id: ElementId) -> bool {
        self.application().and_then(Application::focused) == Some(id)
    }

    /// Recomputes the focus path from the application root and notifies the components on the
    /// old and new paths.
    ///
    /// Does nothing without an application, or while an update is already running. Requested
    /// while component hooks are running, the update is made when the outermost one returns, so
    /// every component on the path is asked for its focus.
    pub fn update_focus_path(&mut self) -> Result<()> {
        let hooks_running = self.running > 0;
        let run_now = match self.application.as_mut() {
            Some(app) if app.updating => false,
            Some(app) if hooks_running => {
                app.pending = true;
                false
            }
            Some(_) => true,
            None => false,
        };
        if run_now {
            self.run_focus_update();
        }
        Ok(())
    }

    pub(crate) fn run_pending_focus_update(&mut self) {
        let pending = self
            .application
            .as_mut()
            .map_or(false, |app| core::mem::replace(&mut app.pending, false));
        if pending {
            trace!("running deferred focus update");
            self.run_focus_update();
        }
    }

    fn run_focus_update(&mut self) {
        match self.application.as_mut() {
            Some(app) if !app.updating => app.updating = true,
            _ => return,
        }

        self.recompute_focus_path();

        if let Some(app) = self.application.as_mut() {
            app.updating = false;
        }
    }

    fn recompute_focus_path(&mut self) {
        let root = match self.application() {
            Some(app) => app.root,
            None => return,
        };

        let mut path = Vec::new();
        let mut current = Some(root);
        while let Some(id) = current {
            if !self.is_component(id) || path.contains(&id) {
                break;
            }
            path.push(id);
            current = self.with_behavior(id, |c, cx| c.get_focused(cx)).flatten();
        }

        let prev_path = match self.application.as_mut() {
            Some(app) => {
                app.focus_updates += 1;
                core::mem::replace(&mut app.focus_path, path.clone())
            }
            None => return,
        };
        trace!(len = path.len(), "focus path updated");

        if prev_path != path {
            let new_target = path.last().copied();
            let prev_target = prev_path.last().copied();
            let common = path
                .iter()
                .zip(&prev_path)
                .take_while(|(a, b)| a == b)
                .count();

            for &id in prev_path[common..].iter().rev() {
                self.with_behavior(id, |c, cx| c.unfocus(cx, new_target));
            }
            if let Some(target) = new_target {
                for &id in &path[common..] {
                    self.with_behavior(id, |c, cx| c.focus(cx, target, prev_target));
                }
                for &id in &path[..common] {
                    self.with_behavior(id, |c, cx| c.focus_change(cx, target, prev_target));
                }
            }
        }

        let mut settings = ValueMap::new();
        for &id in &path {
            self.with_behavior(id, |c, cx| c.set_focus_settings(cx, &mut settings));
        }
        for &id in &path {
            self.with_behavior(id, |c, cx| c.handle_focus_settings(cx, &settings));
        }
        if let Some(app) = self.application.as_mut() {
            app.focus_settings = settings;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentType, Registry};
    use crate::template::Template;
    use crate::value::Value;
    use crate::Cx;

    #[derive(Debug, Default)]
    struct Menu {
        /// Which item to focus.
        selected: Option<&'static str>,
        events: Vec<String>,
        settings: Option<ValueMap>,
    }

    impl Component for Menu {
        fn template() -> Template {
            template! {
                First: { type: ComponentType::of::<Item>() },
                Second: { type: ComponentType::of::<Item>() },
            }
        }

        fn first_enable(&mut self, cx: &mut Cx) {
            self.selected = Some("Second");
            cx.refocus().unwrap();
        }

        fn get_focused(&mut self, cx: &mut Cx) -> Option<ElementId> {
            self.selected.and_then(|tag| cx.tag(tag))
        }

        fn focus_change(&mut self, _: &mut Cx, _: ElementId, _: Option<ElementId>) {
            self.events.push("change".to_owned());
        }

        fn set_focus_settings(&mut self, _: &mut Cx, settings: &mut ValueMap) {
            settings.insert("clearColor".to_owned(), Value::from(0));
            settings.insert("owner".to_owned(), Value::from("menu"));
        }

        fn handle_focus_settings(&mut self, _: &mut Cx, settings: &ValueMap) {
            self.settings = Some(settings.clone());
        }
    }

    #[derive(Debug, Default)]
    struct Item {
        events: Vec<&'static str>,
    }

    impl Component for Item {
        fn focus(&mut self, _: &mut Cx, _: ElementId, _: Option<ElementId>) {
            self.events.push("focus");
        }

        fn unfocus(&mut self, _: &mut Cx, _: Option<ElementId>) {
            self.events.push("unfocus");
        }

        fn set_focus_settings(&mut self, _: &mut Cx, settings: &mut ValueMap) {
            settings.insert("owner".to_owned(), Value::from("item"));
        }
    }

    /// Focuses its list once it is ready.
    #[derive(Debug, Default)]
    struct Launcher {
        changes: usize,
    }

    impl Component for Launcher {
        fn template() -> Template {
            template! { List: { type: ComponentType::of::<Item>() } }
        }

        fn init(&mut self, cx: &mut Cx) {
            cx.set_state("Ready").unwrap();
        }

        fn state_changed(&mut self, _: &mut Cx, _: &str, _: &str) {
            self.changes += 1;
        }

        fn get_focused(&mut self, cx: &mut Cx) -> Option<ElementId> {
            if cx.state() == "Ready" {
                cx.tag("List")
            } else {
                None
            }
        }
    }

    fn setup() -> (Stage, ElementId, ElementId, ElementId) {
        let mut stage = Stage::new(Registry::new());
        stage.register::<Menu>();
        let menu = stage.create_component::<Menu>(None).unwrap();
        let first = stage.tag(menu, "First").unwrap();
        let second = stage.tag(menu, "Second").unwrap();
        stage.set_application(Application::new(menu));
        (stage, menu, first, second)
    }

    fn select(stage: &mut Stage, menu: ElementId, tag: &'static str) {
        stage.behavior_mut::<Menu>(menu).unwrap().selected = Some(tag);
        stage.refocus().unwrap();
    }

    #[test]
    fn path_follows_get_focused() {
        let (mut stage, menu, first, second) = setup();
        stage.update_focus_path().unwrap();
        assert_eq!(stage.application().unwrap().focus_path(), &[menu]);
        assert!(stage.has_final_focus(menu));

        select(&mut stage, menu, "First");
        assert_eq!(stage.application().unwrap().focus_path(), &[menu, first]);
        assert!(stage.has_focus(menu));
        assert!(!stage.has_final_focus(menu));
        assert!(stage.has_final_focus(first));
        assert!(!stage.has_focus(second));
    }

    #[test]
    fn entering_leaving_and_staying_are_notified() {
        let (mut stage, menu, first, second) = setup();
        select(&mut stage, menu, "First");
        select(&mut stage, menu, "Second");
        select(&mut stage, menu, "Second");

        assert_eq!(stage.behavior::<Item>(first).unwrap().events, ["focus", "unfocus"]);
        assert_eq!(stage.behavior::<Item>(second).unwrap().events, ["focus"]);
        assert_eq!(stage.behavior::<Menu>(menu).unwrap().events, ["change"]);
        assert_eq!(stage.application().unwrap().focus_updates(), 3);
    }

    #[test]
    fn settings_are_collected_root_first() {
        let (mut stage, menu, _, _) = setup();
        select(&mut stage, menu, "First");

        let settings = stage.application().unwrap().focus_settings().clone();
        assert_eq!(settings.get("owner"), Some(&Value::from("item")));
        assert_eq!(settings.get("clearColor"), Some(&Value::from(0)));
        assert_eq!(stage.behavior::<Menu>(menu).unwrap().settings, Some(settings));
    }

    #[test]
    fn shut_down_application_tolerates_state_changes() {
        let (mut stage, menu, _, _) = setup();
        assert!(stage.shutdown_application().is_some());
        stage.set_state(menu, "Hidden").unwrap();
        stage.refocus().unwrap();
        assert!(!stage.has_focus(menu));
    }

    #[test]
    fn refocus_from_a_hook_waits_for_it() {
        let (mut stage, menu, _, second) = setup();
        stage.on_enabled(menu).unwrap();

        let app = stage.application().unwrap();
        assert_eq!(app.focus_path(), &[menu, second]);
        assert_eq!(app.focus_updates(), 1);
    }

    #[test]
    fn state_set_during_init_focuses_the_new_target() {
        let mut stage = Stage::new(Registry::new());
        stage.register::<Launcher>();
        let launcher = stage.create_component::<Launcher>(None).unwrap();
        let list = stage.tag(launcher, "List").unwrap();
        stage.set_application(Application::new(launcher));

        stage.on_attach(launcher).unwrap();

        assert_eq!(stage.application().unwrap().focus_path(), &[launcher, list]);
        assert_eq!(stage.application().unwrap().focus_updates(), 1);
        assert_eq!(stage.behavior::<Launcher>(launcher).unwrap().changes, 1);
        assert_eq!(stage.behavior::<Item>(list).unwrap().events, ["focus"]);
    }
}
