//! App instance lifecycle: launch, hook dispatch, team switches, and teardown.
//!
//! The runtime owns one [`AppInstance`] per managed window. It is the only place app hooks are
//! invoked, and every invocation goes through [`guard_hook`]/[`guard_sync_hook`] so a failing or
//! panicking app never aborts the surrounding window transition. No `RefCell` borrow is held across
//! an `.await` or a hook call; after each suspension the instance table is consulted again.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
    rc::{Rc, Weak},
};

use desktop_app_contract::{
    guard_hook, guard_sync_hook, AppCommand, AppContext, AppRegistration, AppServices, BaseApp,
    ContentRegion, DesktopEvent, EventChannel, EventScope, HookError, Principal, Subscription,
    TeamId, WindowService,
};
use leptos::logging;
use serde_json::{Map, Value};

use crate::{
    context_source::ContextSource,
    error::DesktopError,
    model::{OpenWindowRequest, WindowId},
    window_manager::WindowManager,
};

/// Hook failures kept for [`AppRuntime::take_hook_failures`]; older ones are only logged.
pub const MAX_RETAINED_HOOK_FAILURES: usize = 64;

struct AppInstance {
    app: Box<dyn BaseApp>,
    registration: AppRegistration,
    region: ContentRegion,
    context: RefCell<Rc<AppContext>>,
    services: AppServices,
    launch_params: Value,
    mounted: Cell<bool>,
    closing: Cell<bool>,
}

impl AppInstance {
    fn context(&self) -> Rc<AppContext> {
        self.context.borrow().clone()
    }
}

/// Drives [`BaseApp`] hooks for every app window.
pub struct AppRuntime {
    manager: Rc<WindowManager>,
    source: Rc<dyn ContextSource>,
    principal: RefCell<Principal>,
    instances: RefCell<BTreeMap<WindowId, Rc<AppInstance>>>,
    hook_failures: RefCell<VecDeque<DesktopError>>,
    _subscriptions: Vec<Subscription>,
}

impl AppRuntime {
    pub fn new(
        manager: Rc<WindowManager>,
        source: Rc<dyn ContextSource>,
        principal: Principal,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let bus = manager.bus();
            let subscriptions = vec![
                bus.on(
                    EventChannel::WindowActivated,
                    relay(this, |runtime, event| {
                        if let DesktopEvent::WindowActivated { window_id } = event {
                            runtime.dispatch_sync(*window_id, "on_activate", |app, context| {
                                app.on_activate(context)
                            });
                        }
                    }),
                ),
                bus.on(
                    EventChannel::WindowDeactivated,
                    relay(this, |runtime, event| {
                        if let DesktopEvent::WindowDeactivated { window_id } = event {
                            runtime.dispatch_sync(*window_id, "on_deactivate", |app, context| {
                                app.on_deactivate(context)
                            });
                        }
                    }),
                ),
                bus.on(
                    EventChannel::WindowResized,
                    relay(this, |runtime, event| {
                        if let DesktopEvent::WindowResized {
                            window_id,
                            width,
                            height,
                        } = event
                        {
                            let (width, height) = (*width, *height);
                            runtime.dispatch_sync(*window_id, "on_resize", |app, context| {
                                app.on_resize(context, width, height)
                            });
                        }
                    }),
                ),
                bus.on(
                    EventChannel::WindowClosed,
                    relay(this, |runtime, event| {
                        if let DesktopEvent::WindowClosed { window_id } = event {
                            runtime.teardown_out_of_band(*window_id);
                        }
                    }),
                ),
            ];

            Self {
                manager,
                source,
                principal: RefCell::new(principal),
                instances: RefCell::new(BTreeMap::new()),
                hook_failures: RefCell::new(VecDeque::new()),
                _subscriptions: subscriptions,
            }
        })
    }

    pub fn manager(&self) -> &Rc<WindowManager> {
        &self.manager
    }

    pub fn principal(&self) -> Principal {
        self.principal.borrow().clone()
    }

    /// Context currently injected into the app of `window_id`.
    pub fn instance_context(&self, window_id: WindowId) -> Option<Rc<AppContext>> {
        self.instance(window_id).map(|instance| instance.context())
    }

    pub fn is_mounted(&self, window_id: WindowId) -> bool {
        self.instance(window_id)
            .map(|instance| instance.mounted.get())
            .unwrap_or(false)
    }

    /// Latest markup rendered into the window content region.
    pub fn rendered_content(&self, window_id: WindowId) -> Option<String> {
        self.instance(window_id)
            .and_then(|instance| instance.region.markup())
    }

    /// Windows with a live app instance, in id order.
    pub fn running_windows(&self) -> Vec<WindowId> {
        self.instances.borrow().keys().copied().collect()
    }

    /// Drains the most recent hook failures, oldest first. At most
    /// [`MAX_RETAINED_HOOK_FAILURES`] are kept between calls.
    pub fn take_hook_failures(&self) -> Vec<DesktopError> {
        self.hook_failures.borrow_mut().drain(..).collect()
    }

    /// Opens a window for `request.app_id` and mounts a fresh app instance into it.
    ///
    /// Single-instance apps restore and focus their existing window instead.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::AppNotRegistered`] or [`DesktopError::PermissionDenied`] before any
    /// window exists. Hook failures after that point are logged, not returned.
    pub async fn launch(&self, request: OpenWindowRequest) -> Result<WindowId, DesktopError> {
        let catalog = self.manager.catalog();
        let (registration, module) = catalog
            .registration(&request.app_id)
            .cloned()
            .zip(catalog.module(&request.app_id))
            .ok_or_else(|| DesktopError::AppNotRegistered(request.app_id.clone()))?;

        let principal = self.principal();
        let missing = registration.missing_permissions(&principal);
        if !missing.is_empty() {
            return Err(DesktopError::PermissionDenied {
                app_id: registration.app_id,
                missing,
            });
        }

        if registration.single_instance {
            if let Some(existing) = self.manager.find_app_window(&registration.app_id) {
                self.manager.restore(existing);
                self.manager.activate(existing);
                return Ok(existing);
            }
        }

        let launch_params = request.launch_params.clone();
        let window_id = self.manager.create_window(&principal, request)?;
        let services = AppServices {
            window: self.window_service(window_id),
            events: EventScope::new(self.manager.bus().clone(), Some(window_id)),
        };
        let context = self
            .build_context(window_id, &registration, &launch_params, services.clone())
            .await;
        if !self.manager.contains(window_id) {
            logging::warn!("window {window_id} closed while its app was launching");
            services.events.release_all();
            return Ok(window_id);
        }

        let instance = Rc::new(AppInstance {
            app: module.instantiate(),
            registration,
            region: ContentRegion::new(window_id),
            context: RefCell::new(Rc::new(context)),
            services,
            launch_params,
            mounted: Cell::new(false),
            closing: Cell::new(false),
        });
        self.instances
            .borrow_mut()
            .insert(window_id, instance.clone());

        let context = instance.context();
        if let Err(err) = guard_sync_hook(|| instance.app.render(&context, &instance.region)) {
            self.hook_failed(window_id, "render", err);
        }
        if let Err(err) = guard_hook(|| instance.app.on_mount(&context)).await {
            self.hook_failed(window_id, "on_mount", err);
        }
        if self.instance(window_id).is_none() {
            return Ok(window_id);
        }

        instance.mounted.set(true);
        self.manager.bus().emit(&DesktopEvent::AppLaunched {
            window_id,
            app_id: instance.registration.app_id.clone(),
        });
        if self.manager.active_window_id() == Some(window_id) {
            self.dispatch_sync(window_id, "on_activate", |app, context| {
                app.on_activate(context)
            });
        }
        Ok(window_id)
    }

    /// Unmounts the app and removes its window. Returns `false` when the window is already gone
    /// or closing.
    pub async fn close(&self, window_id: WindowId) -> bool {
        let Some(instance) = self.instance(window_id) else {
            return self.manager.close_window(window_id);
        };
        if instance.closing.replace(true) {
            return false;
        }

        if instance.mounted.get() {
            let context = instance.context();
            if let Err(err) = guard_hook(|| instance.app.on_unmount(&context)).await {
                self.hook_failed(window_id, "on_unmount", err);
            }
        }

        instance.services.events.release_all();
        let removed = self.instances.borrow_mut().remove(&window_id);
        drop(removed);
        self.manager.close_window(window_id);
        instance.region.clear();
        true
    }

    /// Asks the app whether it may close, then closes it. A failing hook counts as consent.
    pub async fn request_close(&self, window_id: WindowId) -> bool {
        let Some(instance) = self.instance(window_id) else {
            return self.manager.close_window(window_id);
        };
        if instance.closing.get() {
            return false;
        }

        if instance.mounted.get() {
            let context = instance.context();
            let allowed = match guard_hook(|| instance.app.on_close_requested(&context)).await {
                Ok(allowed) => allowed,
                Err(err) => {
                    self.hook_failed(window_id, "on_close_requested", err);
                    true
                }
            };
            if !allowed {
                return false;
            }
        }
        self.close(window_id).await
    }

    /// Switches the principal to `team_id` and rebuilds every app context.
    ///
    /// Returns `false` when the team is unchanged.
    pub async fn switch_team(&self, team_id: Option<TeamId>) -> bool {
        let (user_id, previous) = {
            let principal = self.principal.borrow();
            (principal.user_id, principal.team_id)
        };
        if previous == team_id {
            return false;
        }

        let permissions = match self.source.permissions(user_id, team_id).await {
            Ok(permissions) => permissions,
            Err(err) => {
                logging::warn!("permission fetch for team switch failed: {err}; keeping current");
                None
            }
        };
        {
            let mut principal = self.principal.borrow_mut();
            principal.team_id = team_id;
            if let Some(permissions) = permissions {
                principal.permissions = permissions;
            }
        }
        self.manager.bus().emit(&DesktopEvent::TeamSwitched {
            team_id,
            previous_team_id: previous,
        });

        let instances: Vec<(WindowId, Rc<AppInstance>)> = self
            .instances
            .borrow()
            .iter()
            .map(|(window_id, instance)| (*window_id, instance.clone()))
            .collect();
        for (window_id, instance) in instances {
            if instance.closing.get() {
                continue;
            }
            let context = self
                .build_context(
                    window_id,
                    &instance.registration,
                    &instance.launch_params,
                    instance.services.clone(),
                )
                .await;
            if self.instance(window_id).is_none() {
                continue;
            }
            let context = Rc::new(context);
            *instance.context.borrow_mut() = context.clone();

            if let Err(err) =
                guard_hook(|| instance.app.on_team_switch(&context, team_id, previous)).await
            {
                self.hook_failed(window_id, "on_team_switch", err);
            }
            if instance.registration.team_scoped && self.instance(window_id).is_some() {
                let context = instance.context();
                if let Err(err) =
                    guard_sync_hook(|| instance.app.render(&context, &instance.region))
                {
                    self.hook_failed(window_id, "render", err);
                }
            }
        }
        true
    }

    async fn build_context(
        &self,
        window_id: WindowId,
        registration: &AppRegistration,
        launch_params: &Value,
        services: AppServices,
    ) -> AppContext {
        let principal = self.principal();
        let team_id = if registration.team_scoped {
            principal.team_id
        } else {
            None
        };

        let permissions = match self
            .source
            .permissions(principal.user_id, principal.team_id)
            .await
        {
            Ok(Some(permissions)) => permissions,
            Ok(None) => principal.permissions.clone(),
            Err(err) => {
                logging::warn!(
                    "permission fetch for `{}` failed: {err}; using principal permissions",
                    registration.app_id
                );
                principal.permissions.clone()
            }
        };
        let config = match self.source.app_config(&registration.app_id, team_id).await {
            Ok(config) => config,
            Err(err) => {
                logging::warn!(
                    "config fetch for `{}` failed: {err}; using empty config",
                    registration.app_id
                );
                Map::new()
            }
        };

        AppContext::new(
            window_id,
            registration.app_id.clone(),
            team_id,
            principal.user_id,
            permissions,
            config,
            launch_params.clone(),
            services,
        )
    }

    fn window_service(&self, window_id: WindowId) -> WindowService {
        let manager = Rc::downgrade(&self.manager);
        WindowService::new(Rc::new(move |command: AppCommand| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            match command {
                AppCommand::SetWindowTitle { title } => {
                    manager.set_title(window_id, title);
                }
                AppCommand::FocusWindow => {
                    manager.restore(window_id);
                    manager.activate(window_id);
                }
                AppCommand::MinimizeWindow => {
                    manager.minimize(window_id);
                }
            }
        }))
    }

    fn instance(&self, window_id: WindowId) -> Option<Rc<AppInstance>> {
        self.instances.borrow().get(&window_id).cloned()
    }

    fn dispatch_sync(
        &self,
        window_id: WindowId,
        hook: &'static str,
        call: impl FnOnce(&dyn BaseApp, &AppContext) -> Result<(), HookError>,
    ) {
        let Some(instance) = self.instance(window_id) else {
            return;
        };
        if !instance.mounted.get() || instance.closing.get() {
            return;
        }
        let context = instance.context();
        if let Err(err) = guard_sync_hook(|| call(instance.app.as_ref(), &*context)) {
            self.hook_failed(window_id, hook, err);
        }
    }

    /// Cleans up after a window removed directly through the window manager.
    fn teardown_out_of_band(&self, window_id: WindowId) {
        let removed = self.instances.borrow_mut().remove(&window_id);
        let Some(instance) = removed else {
            return;
        };
        logging::warn!("window {window_id} closed outside the app runtime; on_unmount skipped");
        instance.closing.set(true);
        instance.services.events.release_all();
        instance.region.clear();
    }

    fn hook_failed(&self, window_id: WindowId, hook: &'static str, err: HookError) {
        let err = DesktopError::HookFailure {
            window_id,
            hook,
            message: err.message().to_string(),
        };
        logging::warn!("{err}");
        let mut failures = self.hook_failures.borrow_mut();
        if failures.len() == MAX_RETAINED_HOOK_FAILURES {
            failures.pop_front();
        }
        failures.push_back(err);
    }
}

fn relay(
    this: &Weak<AppRuntime>,
    handler: fn(&AppRuntime, &DesktopEvent),
) -> impl Fn(&DesktopEvent) + 'static {
    let this = this.clone();
    move |event: &DesktopEvent| {
        if let Some(runtime) = this.upgrade() {
            handler(&runtime, event);
        }
    }
}
