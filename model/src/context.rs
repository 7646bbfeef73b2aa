//! The per-request context handed to GraphQL resolvers.

use crate::backend::{DataSource, D};
use async_graphql::{Context, Result};

/// Capabilities available to resolvers for the duration of a single request.
///
/// A fresh context is attached to each incoming request (see
/// [`Request::data`](async_graphql::Request::data)); contexts are never shared between requests.
#[derive(Clone)]
pub struct RequestContext {
    users: D,
}

impl RequestContext {
    /// A context serving data from `users`.
    pub fn new(users: D) -> Self {
        Self { users }
    }

    /// The data source for this request.
    pub fn users(&self) -> &dyn DataSource {
        self.users.as_ref()
    }
}

/// Access to the [`RequestContext`] from inside a resolver.
pub trait ContextExt {
    /// The data source for the current request.
    ///
    /// # Errors
    ///
    /// Fails if the request was executed without a [`RequestContext`].
    fn users(&self) -> Result<&dyn DataSource>;
}

impl ContextExt for Context<'_> {
    fn users(&self) -> Result<&dyn DataSource> {
        Ok(self.data::<RequestContext>()?.users())
    }
}
