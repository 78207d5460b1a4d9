use crate::{Context, Result};
use std::{future::Future, marker::PhantomData, sync::Arc};

/// Creates a fresh context on demand, once per query execution.
///
/// Implementations are expected to be cheap to call (pooling, if any, lives
/// behind them) and safe to share across tasks: the same factory serves every
/// concurrent query, each call producing an independently owned context.
pub trait ContextFactory: Send + Sync + 'static {
    type Context: Context;

    fn create(&self) -> Result<Self::Context>;

    /// Creation as a suspension point, for factories that must wait on a
    /// pool slot or a handshake. Defaults to the immediate form.
    fn create_async(&self) -> impl Future<Output = Result<Self::Context>> + Send {
        let created = self.create();
        async move { created }
    }
}

impl<F: ContextFactory> ContextFactory for Arc<F> {
    type Context = F::Context;

    fn create(&self) -> Result<Self::Context> {
        (**self).create()
    }

    fn create_async(&self) -> impl Future<Output = Result<Self::Context>> + Send {
        (**self).create_async()
    }
}

/// Adapts a factory of one context type into a factory of another, usually a
/// more general one, so a caller that did not pin a specific context type can
/// still be served. Pure delegation: errors of the wrapped factory pass
/// through untouched.
pub struct MappedFactory<F, C, M> {
    factory: F,
    map: M,
    marker: PhantomData<fn() -> C>,
}

impl<F, C, M> MappedFactory<F, C, M>
where
    F: ContextFactory,
    C: Context,
    M: Fn(F::Context) -> C + Send + Sync + 'static,
{
    pub fn new(factory: F, map: M) -> Self {
        Self {
            factory,
            map,
            marker: PhantomData,
        }
    }
}

impl<F, C, M> ContextFactory for MappedFactory<F, C, M>
where
    F: ContextFactory,
    C: Context,
    M: Fn(F::Context) -> C + Send + Sync + 'static,
{
    type Context = C;

    fn create(&self) -> Result<C> {
        Ok((self.map)(self.factory.create()?))
    }

    fn create_async(&self) -> impl Future<Output = Result<C>> + Send {
        async move { Ok((self.map)(self.factory.create_async().await?)) }
    }
}

pub trait ContextFactoryExt: ContextFactory {
    /// Treat this factory as a factory of a different (typically less
    /// specific) context type.
    fn map_context<C, M>(self, map: M) -> MappedFactory<Self, C, M>
    where
        Self: Sized,
        C: Context,
        M: Fn(Self::Context) -> C + Send + Sync + 'static,
    {
        MappedFactory::new(self, map)
    }
}

impl<F: ContextFactory> ContextFactoryExt for F {}
