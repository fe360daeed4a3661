//! App registration table and the built-in catalog compiled from `manifests/*.app.toml`.

use std::collections::BTreeMap;

use desktop_app_contract::{AppModule, AppRegistration, ApplicationId, Principal};
use leptos::logging;

use crate::{apps::BuiltinApp, error::DesktopError, model::OpenWindowRequest};

mod generated {
    include!(concat!(env!("OUT_DIR"), "/app_catalog_generated.rs"));
}

pub use generated::APP_MANIFEST_CATALOG_JSON;

/// Maps app ids to their registration metadata and module factory.
///
/// Entries are immutable once registered.
#[derive(Debug, Default)]
pub struct AppRegistry {
    entries: BTreeMap<ApplicationId, (AppRegistration, AppModule)>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the compiled manifest catalog.
    ///
    /// Manifests without a built-in module are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::InvalidManifest`] when the catalog cannot be decoded.
    pub fn builtin() -> Result<Self, DesktopError> {
        Self::from_catalog_json(APP_MANIFEST_CATALOG_JSON)
    }

    /// Builds a registry from a JSON array of registrations, pairing each with its built-in module.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::InvalidManifest`] for malformed JSON and
    /// [`DesktopError::AppAlreadyRegistered`] for duplicate ids.
    pub fn from_catalog_json(raw: &str) -> Result<Self, DesktopError> {
        let registrations: Vec<AppRegistration> =
            serde_json::from_str(raw).map_err(|err| DesktopError::InvalidManifest(err.to_string()))?;

        let mut registry = Self::new();
        for registration in registrations {
            let Some(app) = BuiltinApp::from_app_id(&registration.app_id) else {
                logging::warn!(
                    "manifest `{}` has no built-in module; skipping",
                    registration.app_id
                );
                continue;
            };
            registry.register(registration, app.module())?;
        }
        Ok(registry)
    }

    /// Adds an app.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::AppAlreadyRegistered`] if the id is taken.
    pub fn register(
        &mut self,
        registration: AppRegistration,
        module: AppModule,
    ) -> Result<(), DesktopError> {
        if self.entries.contains_key(&registration.app_id) {
            return Err(DesktopError::AppAlreadyRegistered(registration.app_id));
        }
        self.entries
            .insert(registration.app_id.clone(), (registration, module));
        Ok(())
    }

    pub fn contains(&self, app_id: &ApplicationId) -> bool {
        self.entries.contains_key(app_id)
    }

    pub fn registration(&self, app_id: &ApplicationId) -> Option<&AppRegistration> {
        self.entries.get(app_id).map(|(registration, _)| registration)
    }

    pub fn module(&self, app_id: &ApplicationId) -> Option<AppModule> {
        self.entries.get(app_id).map(|(_, module)| *module)
    }

    /// All registrations in app-id order.
    pub fn registrations(&self) -> impl Iterator<Item = &AppRegistration> {
        self.entries.values().map(|(registration, _)| registration)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Launcher menu entries the principal may open.
    pub fn launcher_entries(&self, principal: &Principal) -> Vec<&AppRegistration> {
        self.registrations()
            .filter(|registration| registration.show_in_launcher)
            .filter(|registration| registration.missing_permissions(principal).is_empty())
            .collect()
    }

    /// Desktop icons the principal may open.
    pub fn desktop_icon_entries(&self, principal: &Principal) -> Vec<&AppRegistration> {
        self.registrations()
            .filter(|registration| registration.show_on_desktop)
            .filter(|registration| registration.missing_permissions(principal).is_empty())
            .collect()
    }

    /// Open request used by the launcher and desktop icons.
    pub fn default_open_request(&self, app_id: &ApplicationId) -> Option<OpenWindowRequest> {
        self.registration(app_id)
            .map(|registration| OpenWindowRequest::new(registration.app_id.clone()))
    }
}
