//! Tool registry
//!
//! Maps a typed [`Capability`] (name + input type + output type) to the
//! external tool implementing it. Tools are stored type-erased and
//! recovered by downcasting, so a capability registered with one I/O
//! contract can never be resolved under another.

use crate::error::{StageError, ToolError};
use async_trait::async_trait;
use dashmap::DashMap;
use forge_artifact::CancellationToken;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// External tool implementing one capability
#[async_trait]
pub trait Tool<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Run the tool
    ///
    /// Long-running tools should observe `cancel`; the stage runner stops
    /// awaiting them once it fires either way.
    async fn invoke(&self, input: I, cancel: &CancellationToken) -> Result<O, ToolError>;
}

/// Typed capability handle: `input: I -> output: O`
pub struct Capability<I, O> {
    name: &'static str,
    _io: PhantomData<fn(I) -> O>,
}

impl<I, O> Capability<I, O> {
    /// Create capability
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _io: PhantomData,
        }
    }

    /// Capability name; also the default stage name
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<I, O> Clone for Capability<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for Capability<I, O> {}

impl<I, O> fmt::Debug for Capability<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CapabilityKey {
    name: &'static str,
    input: TypeId,
    output: TypeId,
}

impl CapabilityKey {
    fn of<I: 'static, O: 'static>(capability: Capability<I, O>) -> Self {
        Self {
            name: capability.name,
            input: TypeId::of::<I>(),
            output: TypeId::of::<O>(),
        }
    }
}

/// Registry of tools keyed by capability
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<CapabilityKey, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.tools.iter().map(|e| e.key().name).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("capabilities", &names).finish()
    }
}

impl ToolRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` for `capability`, replacing any previous tool
    pub fn register<I, O>(&self, capability: Capability<I, O>, tool: Arc<dyn Tool<I, O>>)
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        tracing::debug!(capability = capability.name(), "tool registered");
        self.tools
            .insert(CapabilityKey::of(capability), Arc::new(tool));
    }

    /// Register with a builder chain
    #[must_use]
    pub fn with<I, O>(self, capability: Capability<I, O>, tool: Arc<dyn Tool<I, O>>) -> Self
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        self.register(capability, tool);
        self
    }

    /// Resolve the tool for `capability`
    ///
    /// # Errors
    /// `StageError::ToolNotFound` if nothing is registered under this
    /// capability's name and I/O types.
    pub fn resolve<I, O>(&self, capability: Capability<I, O>) -> Result<Arc<dyn Tool<I, O>>, StageError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        self.tools
            .get(&CapabilityKey::of(capability))
            .and_then(|entry| entry.value().downcast_ref::<Arc<dyn Tool<I, O>>>().cloned())
            .ok_or_else(|| StageError::ToolNotFound {
                capability: capability.name().to_string(),
            })
    }

    /// Check if `capability` is registered
    #[must_use]
    pub fn contains<I, O>(&self, capability: Capability<I, O>) -> bool
    where
        I: 'static,
        O: 'static,
    {
        self.tools.contains_key(&CapabilityKey::of(capability))
    }

    /// Number of registered tools
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Tool backed by an async closure
///
/// ```rust,ignore
/// let echo = FnTool::new(|input: String, _cancel| async move { Ok::<_, ToolError>(input) });
/// registry.register(ECHO, Arc::new(echo));
/// ```
pub struct FnTool<F> {
    f: F,
}

impl<F> FnTool<F> {
    /// Wrap a closure
    #[inline]
    #[must_use]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnTool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").finish_non_exhaustive()
    }
}

#[async_trait]
impl<I, O, F, Fut> Tool<I, O> for FnTool<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ToolError>> + Send,
{
    async fn invoke(&self, input: I, cancel: &CancellationToken) -> Result<O, ToolError> {
        (self.f)(input, cancel.clone()).await
    }
}
