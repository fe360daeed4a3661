//! Backend boundary for the permissions and app settings injected into [`AppContext`]s.
//!
//! [`AppContext`]: desktop_app_contract::AppContext

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeSet, HashMap},
    future::Future,
    pin::Pin,
    rc::Rc,
};

use desktop_app_contract::{ApplicationId, TeamId, UserId};
use serde_json::{Map, Value};

/// Object-safe boxed future used by [`ContextSource`] async methods.
pub type ContextSourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Host service resolving per-team capabilities and app settings.
pub trait ContextSource {
    /// Loads the capabilities of `user_id` in `team_id`. `Ok(None)` keeps the principal's own set.
    fn permissions<'a>(
        &'a self,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> ContextSourceFuture<'a, Result<Option<BTreeSet<String>>, String>>;

    /// Loads settings for `app_id` scoped to `team_id`.
    fn app_config<'a>(
        &'a self,
        app_id: &'a ApplicationId,
        team_id: Option<TeamId>,
    ) -> ContextSourceFuture<'a, Result<Map<String, Value>, String>>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Context source without a backend: principal permissions and empty settings.
pub struct NoopContextSource;

impl ContextSource for NoopContextSource {
    fn permissions<'a>(
        &'a self,
        _user_id: UserId,
        _team_id: Option<TeamId>,
    ) -> ContextSourceFuture<'a, Result<Option<BTreeSet<String>>, String>> {
        Box::pin(async { Ok(None) })
    }

    fn app_config<'a>(
        &'a self,
        _app_id: &'a ApplicationId,
        _team_id: Option<TeamId>,
    ) -> ContextSourceFuture<'a, Result<Map<String, Value>, String>> {
        Box::pin(async { Ok(Map::new()) })
    }
}

#[derive(Debug, Default)]
struct MemoryContextState {
    permissions: HashMap<(UserId, Option<TeamId>), BTreeSet<String>>,
    configs: HashMap<(ApplicationId, Option<TeamId>), Map<String, Value>>,
}

#[derive(Debug, Clone, Default)]
/// In-memory context source. Clones share state.
pub struct MemoryContextSource {
    inner: Rc<RefCell<MemoryContextState>>,
    offline: Rc<Cell<bool>>,
}

impl MemoryContextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_permissions<I, S>(&self, user_id: UserId, team_id: Option<TeamId>, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.borrow_mut().permissions.insert(
            (user_id, team_id),
            permissions.into_iter().map(Into::into).collect(),
        );
    }

    pub fn set_app_config(
        &self,
        app_id: ApplicationId,
        team_id: Option<TeamId>,
        config: Map<String, Value>,
    ) {
        self.inner
            .borrow_mut()
            .configs
            .insert((app_id, team_id), config);
    }

    /// Makes every lookup fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    fn check_online(&self) -> Result<(), String> {
        if self.offline.get() {
            Err("context source offline".to_string())
        } else {
            Ok(())
        }
    }
}

impl ContextSource for MemoryContextSource {
    fn permissions<'a>(
        &'a self,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> ContextSourceFuture<'a, Result<Option<BTreeSet<String>>, String>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self
                .inner
                .borrow()
                .permissions
                .get(&(user_id, team_id))
                .cloned())
        })
    }

    fn app_config<'a>(
        &'a self,
        app_id: &'a ApplicationId,
        team_id: Option<TeamId>,
    ) -> ContextSourceFuture<'a, Result<Map<String, Value>, String>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self
                .inner
                .borrow()
                .configs
                .get(&(app_id.clone(), team_id))
                .cloned()
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn memory_source_scopes_by_team_and_reports_outages() {
        let source = MemoryContextSource::new();
        let email = ApplicationId::trusted("email");
        source.set_permissions(UserId(1), Some(TeamId(4)), ["email.read"]);
        let mut config = Map::new();
        config.insert("folder".to_string(), Value::from("inbox"));
        source.set_app_config(email.clone(), Some(TeamId(4)), config.clone());

        assert_eq!(
            block_on(source.permissions(UserId(1), Some(TeamId(4)))),
            Ok(Some(["email.read".to_string()].into_iter().collect()))
        );
        assert_eq!(block_on(source.permissions(UserId(1), Some(TeamId(5)))), Ok(None));
        assert_eq!(block_on(source.app_config(&email, Some(TeamId(4)))), Ok(config));
        assert_eq!(block_on(source.app_config(&email, None)), Ok(Map::new()));

        source.set_offline(true);
        assert!(block_on(source.permissions(UserId(1), Some(TeamId(4)))).is_err());
    }

    #[test]
    fn noop_source_defers_to_the_principal() {
        let source = NoopContextSource;
        assert_eq!(block_on(source.permissions(UserId(1), None)), Ok(None));
        assert_eq!(
            block_on(source.app_config(&ApplicationId::trusted("calculator"), None)),
            Ok(Map::new())
        );
    }
}
