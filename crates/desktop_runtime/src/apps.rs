//! Built-in app kinds and their module factories.

mod placeholders;

use desktop_app_contract::{AppModule, ApplicationId, BaseApp};

use self::placeholders::{MessagesPlaceholderApp, PlaceholderApp};

/// Closed set of apps shipped with the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinApp {
    Calculator,
    FileExplorer,
    Email,
    Messages,
    SiteBuilder,
}

impl BuiltinApp {
    pub const ALL: [BuiltinApp; 5] = [
        Self::Calculator,
        Self::FileExplorer,
        Self::Email,
        Self::Messages,
        Self::SiteBuilder,
    ];

    pub fn id_str(self) -> &'static str {
        match self {
            Self::Calculator => "calculator",
            Self::FileExplorer => "file-explorer",
            Self::Email => "email",
            Self::Messages => "messages",
            Self::SiteBuilder => "site-builder",
        }
    }

    pub fn app_id(self) -> ApplicationId {
        ApplicationId::trusted(self.id_str())
    }

    pub fn from_app_id(app_id: &ApplicationId) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|app| app.id_str() == app_id.as_str())
    }

    pub fn module(self) -> AppModule {
        match self {
            Self::Calculator => AppModule::new(calculator),
            Self::FileExplorer => AppModule::new(file_explorer),
            Self::Email => AppModule::new(email),
            Self::Messages => AppModule::new(messages),
            Self::SiteBuilder => AppModule::new(site_builder),
        }
    }
}

fn calculator() -> Box<dyn BaseApp> {
    Box::new(PlaceholderApp::new(BuiltinApp::Calculator))
}

fn file_explorer() -> Box<dyn BaseApp> {
    Box::new(PlaceholderApp::new(BuiltinApp::FileExplorer))
}

fn email() -> Box<dyn BaseApp> {
    Box::new(PlaceholderApp::new(BuiltinApp::Email))
}

fn messages() -> Box<dyn BaseApp> {
    Box::new(MessagesPlaceholderApp::default())
}

fn site_builder() -> Box<dyn BaseApp> {
    Box::new(PlaceholderApp::new(BuiltinApp::SiteBuilder))
}
