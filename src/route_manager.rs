//! In-memory route manager
//!
//! A process-local implementation of the [`RouteManager`] contract: an
//! insertion-ordered multimap from route keys to registered targets.
//! Registration order is preserved so that the router's "later means more
//! specific" reliance holds observably.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::domain_types::{
    EndpointAddress, Route, RouteRegistration, RouteRegistrationOptions, RouteTarget,
};
use crate::traits::{BoxError, RouteManager};

#[derive(Debug, Clone)]
struct RegistrationEntry {
    end_point: EndpointAddress,
    options: RouteRegistrationOptions,
}

/// Route directory backed by process memory; nothing is persistent, so
/// `include_persistent` has no additional effect here.
#[derive(Debug, Default)]
pub struct InMemoryRouteManager {
    routes: DashMap<Route, Vec<RegistrationEntry>>,
}

impl InMemoryRouteManager {
    /// Creates an empty route directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }
}

#[async_trait]
impl RouteManager for InMemoryRouteManager {
    async fn add_route(
        &self,
        end_point: EndpointAddress,
        registration: RouteRegistration,
        _token: CancellationToken,
    ) -> Result<(), BoxError> {
        let mut entries = self.routes.entry(registration.route().clone()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|entry| entry.end_point == end_point)
        {
            // Re-registration updates the options without losing the
            // original position in the specificity order.
            existing.options = registration.options();
        } else {
            entries.push(RegistrationEntry {
                end_point: end_point.clone(),
                options: registration.options(),
            });
        }
        trace!(target: "telford::route_manager", route = %registration.route(), end_point = %end_point, "route added");
        Ok(())
    }

    async fn remove_route(
        &self,
        end_point: EndpointAddress,
        route: Route,
        _token: CancellationToken,
    ) -> Result<(), BoxError> {
        if let Some(mut entries) = self.routes.get_mut(&route) {
            entries.retain(|entry| entry.end_point != end_point);
            drop(entries);
            self.routes.remove_if(&route, |_, entries| entries.is_empty());
        }
        trace!(target: "telford::route_manager", route = %route, end_point = %end_point, "route removed");
        Ok(())
    }

    async fn remove_routes(
        &self,
        end_point: EndpointAddress,
        _include_persistent: bool,
        _token: CancellationToken,
    ) -> Result<(), BoxError> {
        let mut emptied = Vec::new();
        for mut entry in self.routes.iter_mut() {
            entry.value_mut().retain(|e| e.end_point != end_point);
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for route in emptied {
            self.routes.remove_if(&route, |_, entries| entries.is_empty());
        }
        trace!(target: "telford::route_manager", end_point = %end_point, "all routes removed");
        Ok(())
    }

    async fn get_routes(
        &self,
        route: Route,
        _token: CancellationToken,
    ) -> Result<Vec<RouteTarget>, BoxError> {
        Ok(self
            .routes
            .get(&route)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| RouteTarget::new(entry.end_point.clone(), entry.options))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(route: &str, options: RouteRegistrationOptions) -> RouteRegistration {
        RouteRegistration::new(route.into(), options)
    }

    #[tokio::test]
    async fn register_then_unregister_restores_initial_state() {
        let manager = InMemoryRouteManager::new();
        let token = CancellationToken::new();

        manager
            .add_route(
                "a".into(),
                registration("r", RouteRegistrationOptions::empty()),
                token.clone(),
            )
            .await
            .unwrap();
        manager
            .remove_route("a".into(), "r".into(), token.clone())
            .await
            .unwrap();

        assert!(manager
            .get_routes("r".into(), token)
            .await
            .unwrap()
            .is_empty());
        assert!(manager.routes.is_empty());
    }

    #[tokio::test]
    async fn registration_order_is_preserved() {
        let manager = InMemoryRouteManager::new();
        let token = CancellationToken::new();

        for address in ["a", "b", "c"] {
            manager
                .add_route(
                    address.into(),
                    registration("r", RouteRegistrationOptions::empty()),
                    token.clone(),
                )
                .await
                .unwrap();
        }

        let targets = manager.get_routes("r".into(), token).await.unwrap();
        let addresses: Vec<EndpointAddress> =
            targets.iter().map(|t| t.end_point().clone()).collect();
        let expected: Vec<EndpointAddress> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(addresses, expected);
    }

    #[tokio::test]
    async fn reregistration_updates_options_in_place() {
        let manager = InMemoryRouteManager::new();
        let token = CancellationToken::new();

        manager
            .add_route(
                "a".into(),
                registration("r", RouteRegistrationOptions::empty()),
                token.clone(),
            )
            .await
            .unwrap();
        manager
            .add_route(
                "b".into(),
                registration("r", RouteRegistrationOptions::empty()),
                token.clone(),
            )
            .await
            .unwrap();
        manager
            .add_route(
                "a".into(),
                registration("r", RouteRegistrationOptions::PUBLISH_ONLY),
                token.clone(),
            )
            .await
            .unwrap();

        let targets = manager.get_routes("r".into(), token).await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(*targets[0].end_point(), EndpointAddress::from("a"));
        assert_eq!(targets[0].options(), RouteRegistrationOptions::PUBLISH_ONLY);
        assert_eq!(*targets[1].end_point(), EndpointAddress::from("b"));
    }

    #[tokio::test]
    async fn remove_routes_clears_every_registration_of_an_end_point() {
        let manager = InMemoryRouteManager::new();
        let token = CancellationToken::new();

        for route in ["r1", "r2"] {
            manager
                .add_route(
                    "a".into(),
                    registration(route, RouteRegistrationOptions::empty()),
                    token.clone(),
                )
                .await
                .unwrap();
        }
        manager
            .add_route(
                "b".into(),
                registration("r1", RouteRegistrationOptions::empty()),
                token.clone(),
            )
            .await
            .unwrap();

        manager
            .remove_routes("a".into(), false, token.clone())
            .await
            .unwrap();

        let r1 = manager.get_routes("r1".into(), token.clone()).await.unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(*r1[0].end_point(), EndpointAddress::from("b"));
        assert!(manager
            .get_routes("r2".into(), token)
            .await
            .unwrap()
            .is_empty());
    }
}
