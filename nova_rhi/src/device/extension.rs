/// Extension registry
///
/// Extensions are optional auxiliary contexts (compressed texture loaders,
/// profilers, ...) that a backend may or may not support. Each one is
/// described by an `ExtensionDescriptor` (a stable name plus a factory
/// function); the factory instantiates every registered descriptor at init
/// and exposes the results by name.

use std::any::Any;
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::device::backend::Backend;
use crate::device::config::BackendKind;
use crate::device::selection::AdapterInfo;

/// Auxiliary context instantiated by a factory
pub trait Extension: Any + Send {
    /// Stable registry name
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Extension type with a compile-time name, for typed lookups
pub trait NamedExtension: Extension {
    const NAME: &'static str;
}

/// What an extension factory gets to see of the device
pub struct ExtensionInit<'a> {
    pub backend_kind: BackendKind,
    pub adapter: &'a AdapterInfo,
    /// Backend, downcastable through `as_any` to reach native objects
    pub backend: &'a dyn Backend,
}

/// Builds an extension; `Ok(None)` when the backend does not support it
pub type ExtensionFactory = fn(&ExtensionInit<'_>) -> Result<Option<Box<dyn Extension>>>;

/// Name + factory pair registered before factory init
#[derive(Debug, Clone, Copy)]
pub struct ExtensionDescriptor {
    pub name: &'static str,
    pub factory: ExtensionFactory,
}

impl ExtensionDescriptor {
    pub const fn new(name: &'static str, factory: ExtensionFactory) -> Self {
        Self { name, factory }
    }
}

/// Name-keyed descriptors and the instances built from them
#[derive(Default)]
pub struct ExtensionRegistry {
    descriptors: FxHashMap<&'static str, ExtensionDescriptor>,
    contexts: FxHashMap<&'static str, Box<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor; a later registration under the same name wins
    pub fn register(&mut self, descriptor: ExtensionDescriptor) {
        if self.descriptors.insert(descriptor.name, descriptor).is_some() {
            crate::engine_warn!(
                "nova::device",
                "Extension '{}' registered twice, keeping the last descriptor",
                descriptor.name
            );
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Instantiate one registered extension
    ///
    /// # Returns
    ///
    /// `true` when the backend supports the extension
    pub fn instantiate(&mut self, name: &'static str, init: &ExtensionInit<'_>) -> Result<bool> {
        let Some(descriptor) = self.descriptors.get(name).copied() else {
            return Ok(false);
        };
        match (descriptor.factory)(init)? {
            Some(context) => {
                crate::engine_debug!("nova::device", "Extension '{}' instantiated", name);
                self.contexts.insert(name, context);
                Ok(true)
            }
            None => {
                crate::engine_info!(
                    "nova::device",
                    "Extension '{}' not supported by the {:?} backend",
                    name,
                    init.backend_kind
                );
                Ok(false)
            }
        }
    }

    /// Instantiate every registered extension
    pub fn instantiate_all(&mut self, init: &ExtensionInit<'_>) -> Result<()> {
        let mut names: Vec<&'static str> = self.descriptors.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            self.instantiate(name, init)?;
        }
        Ok(())
    }

    pub fn get<T: NamedExtension>(&self) -> Option<&T> {
        self.contexts.get(T::NAME)?.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: NamedExtension>(&mut self) -> Option<&mut T> {
        self.contexts.get_mut(T::NAME)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Extension> {
        self.contexts.get(name).map(|context| context.as_ref())
    }

    /// Names of the instantiated extensions, sorted
    pub fn active(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.contexts.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Drop every instance (descriptors stay registered)
    pub fn clear(&mut self) {
        self.contexts.clear();
    }
}

#[cfg(test)]
#[path = "extension_tests.rs"]
mod tests;
