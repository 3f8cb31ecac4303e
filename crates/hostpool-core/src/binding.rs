//! Resource bindings
//!
//! A binding is the pair of async functions a pool uses to open and close one
//! connection for its destination. Callers register a binding per key before
//! the key is first used; pools copy it at construction time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

/// Connection-level error produced by caller-supplied factories and closers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Opens a new connection
pub type Factory<C> = Arc<dyn Fn() -> BoxFuture<'static, Result<C, BoxError>> + Send + Sync>;

/// Closes a connection that is leaving the pool
pub type Closer<C> = Arc<dyn Fn(C) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Box an async closure into a [`Factory`]
pub fn factory_fn<C, F, Fut, E>(f: F) -> Factory<C>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, E>> + Send + 'static,
    E: Into<BoxError>,
    C: 'static,
{
    Arc::new(move || -> BoxFuture<'static, Result<C, BoxError>> {
        f().map(|result| result.map_err(Into::into)).boxed()
    })
}

/// Box an async closure into a [`Closer`]
pub fn closer_fn<C, F, Fut, E>(f: F) -> Closer<C>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
    C: 'static,
{
    Arc::new(move |conn: C| -> BoxFuture<'static, Result<(), BoxError>> {
        f(conn).map(|result| result.map_err(Into::into)).boxed()
    })
}

/// Factory/closer pair for one destination
pub struct ResourceBinding<C> {
    factory: Factory<C>,
    closer: Closer<C>,
}

impl<C> ResourceBinding<C> {
    pub fn new(factory: Factory<C>, closer: Closer<C>) -> Self {
        Self { factory, closer }
    }

    /// Build a binding straight from two async closures
    pub fn from_fns<F, FFut, FE, G, GFut, GE>(factory: F, closer: G) -> Self
    where
        F: Fn() -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<C, FE>> + Send + 'static,
        FE: Into<BoxError>,
        G: Fn(C) -> GFut + Send + Sync + 'static,
        GFut: Future<Output = Result<(), GE>> + Send + 'static,
        GE: Into<BoxError>,
        C: 'static,
    {
        Self::new(factory_fn(factory), closer_fn(closer))
    }

    pub fn factory(&self) -> &Factory<C> {
        &self.factory
    }

    pub fn closer(&self) -> &Closer<C> {
        &self.closer
    }

    /// Open one connection
    pub fn dial(&self) -> BoxFuture<'static, Result<C, BoxError>> {
        (self.factory)()
    }

    /// Close one connection
    pub fn close(&self, conn: C) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.closer)(conn)
    }
}

impl<C> Clone for ResourceBinding<C> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            closer: Arc::clone(&self.closer),
        }
    }
}

impl<C> fmt::Debug for ResourceBinding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceBinding").finish_non_exhaustive()
    }
}
