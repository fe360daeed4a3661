use std::{cell::Cell, rc::Rc};

use desktop_app_contract::{
    AppContext, BaseApp, ContentRegion, DesktopEvent, EventChannel, HookError, HookFuture, TeamId,
};

use super::BuiltinApp;

fn team_label(team_id: Option<TeamId>) -> String {
    match team_id {
        Some(team) => format!("team {}", team.0),
        None => "no team".to_string(),
    }
}

fn display_name(kind: BuiltinApp) -> &'static str {
    match kind {
        BuiltinApp::Calculator => "Calculator",
        BuiltinApp::FileExplorer => "File Explorer",
        BuiltinApp::Email => "Email",
        BuiltinApp::Messages => "Messages",
        BuiltinApp::SiteBuilder => "Site Builder",
    }
}

/// Headless stand-in for a built-in app until its real module lands.
pub(super) struct PlaceholderApp {
    kind: BuiltinApp,
    focused: Cell<bool>,
    size: Cell<Option<(i32, i32)>>,
}

impl PlaceholderApp {
    pub(super) fn new(kind: BuiltinApp) -> Self {
        Self {
            kind,
            focused: Cell::new(false),
            size: Cell::new(None),
        }
    }
}

impl BaseApp for PlaceholderApp {
    fn render(&self, context: &AppContext, region: &ContentRegion) -> Result<(), HookError> {
        let id = self.kind.id_str();
        let size = self
            .size
            .get()
            .map(|(width, height)| format!(" data-size=\"{width}x{height}\""))
            .unwrap_or_default();
        region.replace(format!(
            "<div class=\"app-shell app-{id}-shell\" data-focused=\"{}\"{size}><p><strong>{}</strong></p><p>{}</p></div>",
            self.focused.get(),
            display_name(self.kind),
            team_label(context.team_id),
        ));
        Ok(())
    }

    fn on_activate(&self, _context: &AppContext) -> Result<(), HookError> {
        self.focused.set(true);
        Ok(())
    }

    fn on_deactivate(&self, _context: &AppContext) -> Result<(), HookError> {
        self.focused.set(false);
        Ok(())
    }

    fn on_resize(&self, _context: &AppContext, width: i32, height: i32) -> Result<(), HookError> {
        self.size.set(Some((width, height)));
        Ok(())
    }

    fn on_team_switch<'a>(
        &'a self,
        context: &'a AppContext,
        new_team: Option<TeamId>,
        _old_team: Option<TeamId>,
    ) -> HookFuture<'a> {
        Box::pin(async move {
            if self.kind == BuiltinApp::Email {
                context
                    .window()
                    .set_title(format!("Email ({})", team_label(new_team)));
            }
            Ok(())
        })
    }
}

/// Messages placeholder: counts `messages.incoming` topic events and mirrors the unread count in
/// the window title.
#[derive(Default)]
pub(super) struct MessagesPlaceholderApp {
    unread: Rc<Cell<u32>>,
}

impl BaseApp for MessagesPlaceholderApp {
    fn render(&self, context: &AppContext, region: &ContentRegion) -> Result<(), HookError> {
        region.replace(format!(
            "<div class=\"app-shell app-messages-shell\"><p><strong>Messages</strong></p><p>{}</p><p>{} unread</p></div>",
            team_label(context.team_id),
            self.unread.get(),
        ));
        Ok(())
    }

    fn on_mount<'a>(&'a self, context: &'a AppContext) -> HookFuture<'a> {
        Box::pin(async move {
            let unread = self.unread.clone();
            let window = context.window().clone();
            context.events().on(
                EventChannel::Topic("messages.incoming".to_string()),
                move |event| {
                    if let DesktopEvent::App(_) = event {
                        unread.set(unread.get() + 1);
                        window.set_title(format!("Messages ({})", unread.get()));
                    }
                },
            );
            Ok(())
        })
    }

    fn on_activate(&self, context: &AppContext) -> Result<(), HookError> {
        if self.unread.replace(0) > 0 {
            context.window().set_title("Messages");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use desktop_app_contract::{
        AppServices, ApplicationId, EventBus, EventScope, UserId, WindowId, WindowService,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};

    use super::*;

    fn context() -> AppContext {
        AppContext::new(
            WindowId(3),
            ApplicationId::trusted("file-explorer"),
            None,
            UserId(1),
            Default::default(),
            Map::new(),
            Value::Null,
            AppServices {
                window: WindowService::disabled(),
                events: EventScope::new(EventBus::new(), Some(WindowId(3))),
            },
        )
    }

    #[test]
    fn placeholder_markup_reflects_focus_and_size() {
        let app = PlaceholderApp::new(BuiltinApp::FileExplorer);
        let context = context();
        let region = ContentRegion::new(WindowId(3));

        app.render(&context, &region).expect("render");
        assert_eq!(
            region.markup().as_deref(),
            Some(
                "<div class=\"app-shell app-file-explorer-shell\" data-focused=\"false\"><p><strong>File Explorer</strong></p><p>no team</p></div>"
            )
        );

        app.on_activate(&context).expect("activate");
        app.on_resize(&context, 640, 480).expect("resize");
        app.render(&context, &region).expect("render");
        assert_eq!(
            region.markup().as_deref(),
            Some(
                "<div class=\"app-shell app-file-explorer-shell\" data-focused=\"true\" data-size=\"640x480\"><p><strong>File Explorer</strong></p><p>no team</p></div>"
            )
        );
    }
}
