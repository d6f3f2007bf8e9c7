//! Callback registry: ordered before/after hooks for one service type.
//!
//! A registry is built once per service type, usually inside a
//! [`LazyLock`](std::sync::LazyLock) returned from
//! [`Service::callbacks`](crate::service::Service::callbacks), and is
//! read-only from then on. Hooks run in registration order.
//!
//! Deriving copies: [`derive`](CallbackRegistry::derive) and
//! [`derive_for`](CallbackRegistry::derive_for) hand out an independent
//! registry seeded with the parent's hooks, so registering on the child never
//! touches the parent.
//!
//! ```ignore
//! impl Service for CreateUser {
//!     fn callbacks() -> Option<&'static CallbackRegistry<Self>> {
//!         static CALLBACKS: LazyLock<CallbackRegistry<CreateUser>> = LazyLock::new(|| {
//!             CallbackRegistry::new()
//!                 .before("normalize_email", |svc, _ctx| { svc.email.make_ascii_lowercase(); Ok(()) })
//!                 .after("announce", |_svc, ctx, _user| ctx.add_notice("Welcome aboard"))
//!         });
//!         Some(&CALLBACKS)
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use steroids_domain::error::ServiceError;

use crate::service::{Context, Service};

type BeforeFn<S> = dyn Fn(&mut S, &mut Context) -> Result<(), ServiceError> + Send + Sync;
type AfterFn<S> =
    dyn Fn(&mut S, &mut Context, &<S as Service>::Output) -> Result<(), ServiceError> + Send + Sync;

struct Hook<F: ?Sized> {
    name: &'static str,
    run: Arc<F>,
}

impl<F: ?Sized> Clone for Hook<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            run: Arc::clone(&self.run),
        }
    }
}

/// Ordered before/after hooks of one service type.
pub struct CallbackRegistry<S: Service> {
    before: Vec<Hook<BeforeFn<S>>>,
    after: Vec<Hook<AfterFn<S>>>,
}

impl<S: Service> Default for CallbackRegistry<S> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl<S: Service> Clone for CallbackRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

impl<S: Service> fmt::Debug for CallbackRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("service", &S::NAME)
            .field("before", &self.before_names())
            .field("after", &self.after_names())
            .finish()
    }
}

impl<S: Service> CallbackRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register_before`](Self::register_before).
    #[must_use]
    pub fn before<F>(mut self, name: &'static str, hook: F) -> Self
    where
        F: Fn(&mut S, &mut Context) -> Result<(), ServiceError> + Send + Sync + 'static,
    {
        self.register_before(name, hook);
        self
    }

    /// Builder form of [`register_after`](Self::register_after).
    #[must_use]
    pub fn after<F>(mut self, name: &'static str, hook: F) -> Self
    where
        F: Fn(&mut S, &mut Context, &S::Output) -> Result<(), ServiceError> + Send + Sync + 'static,
    {
        self.register_after(name, hook);
        self
    }

    /// Append a hook that runs before the entry point.
    pub fn register_before<F>(&mut self, name: &'static str, hook: F)
    where
        F: Fn(&mut S, &mut Context) -> Result<(), ServiceError> + Send + Sync + 'static,
    {
        self.before.push(Hook {
            name,
            run: Arc::new(hook),
        });
    }

    /// Append a hook that runs after a successful entry point, with its value.
    pub fn register_after<F>(&mut self, name: &'static str, hook: F)
    where
        F: Fn(&mut S, &mut Context, &S::Output) -> Result<(), ServiceError> + Send + Sync + 'static,
    {
        self.after.push(Hook {
            name,
            run: Arc::new(hook),
        });
    }

    /// Independent copy for a variant of the same service type.
    #[must_use]
    pub fn derive(&self) -> Self {
        self.clone()
    }

    /// Independent copy for a child type that embeds this one.
    ///
    /// `project` reaches the parent inside the child; every inherited hook
    /// runs against that projection.
    #[must_use]
    pub fn derive_for<C>(&self, project: fn(&mut C) -> &mut S) -> CallbackRegistry<C>
    where
        C: Service<Output = S::Output>,
    {
        let before = self
            .before
            .iter()
            .map(|hook| {
                let run = Arc::clone(&hook.run);
                Hook {
                    name: hook.name,
                    run: Arc::new(move |child: &mut C, ctx: &mut Context| run(project(child), ctx))
                        as Arc<BeforeFn<C>>,
                }
            })
            .collect();
        let after = self
            .after
            .iter()
            .map(|hook| {
                let run = Arc::clone(&hook.run);
                Hook {
                    name: hook.name,
                    run: Arc::new(
                        move |child: &mut C, ctx: &mut Context, output: &C::Output| {
                            run(project(child), ctx, output)
                        },
                    ) as Arc<AfterFn<C>>,
                }
            })
            .collect();
        CallbackRegistry { before, after }
    }

    #[must_use]
    pub fn before_names(&self) -> Vec<&'static str> {
        self.before.iter().map(|hook| hook.name).collect()
    }

    #[must_use]
    pub fn after_names(&self) -> Vec<&'static str> {
        self.after.iter().map(|hook| hook.name).collect()
    }

    /// Run before-hooks in order, stopping at the first failure.
    pub(crate) fn run_before(
        &self,
        service: &mut S,
        ctx: &mut Context,
    ) -> Result<(), ServiceError> {
        for hook in &self.before {
            tracing::trace!(service = S::NAME, hook = hook.name, "running before hook");
            (hook.run)(service, ctx)?;
        }
        Ok(())
    }

    /// Run after-hooks in order, stopping at the first failure.
    pub(crate) fn run_after(
        &self,
        service: &mut S,
        ctx: &mut Context,
        output: &S::Output,
    ) -> Result<(), ServiceError> {
        for hook in &self.after {
            tracing::trace!(service = S::NAME, hook = hook.name, "running after hook");
            (hook.run)(service, ctx, output)?;
        }
        Ok(())
    }
}
