//! Component runtime seam and the isolated context's mount root.
//!
//! The runtime owns the library bindings pre-loaded into the isolated
//! context and turns a linked [`CompiledModule`] into a mountable
//! [`Component`]. The production implementation is
//! [`EngineRuntime`](super::engine::EngineRuntime); tests plug in their own.

use std::collections::BTreeSet;

use crate::errors::{RenderError, RuntimeError};

use super::compiler::{CompiledModule, ExportKind, ModuleBinding};

/// Libraries loaded into the isolated context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTable {
    loaded: BTreeSet<ModuleBinding>,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::full()
    }
}

impl BindingTable {
    /// Every library in the module map.
    pub fn full() -> Self {
        Self {
            loaded: [
                ModuleBinding::React,
                ModuleBinding::ReactDom,
                ModuleBinding::Recharts,
            ]
            .into_iter()
            .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            loaded: BTreeSet::new(),
        }
    }

    pub fn with(mut self, binding: ModuleBinding) -> Self {
        self.loaded.insert(binding);
        self
    }

    pub fn without(mut self, binding: ModuleBinding) -> Self {
        self.loaded.remove(&binding);
        self
    }

    pub fn is_loaded(&self, binding: ModuleBinding) -> bool {
        self.loaded.contains(&binding)
    }

    /// React and ReactDOM are needed to mount anything; other libraries only
    /// when the module imports them.
    pub fn check(&self, module: &CompiledModule) -> Result<(), RuntimeError> {
        let required = [ModuleBinding::React, ModuleBinding::ReactDom]
            .into_iter()
            .chain(module.bindings());
        for binding in required {
            if !self.is_loaded(binding) {
                return Err(RuntimeError::DependencyMissing {
                    binding: binding.library_name().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// An evaluated default export, ready to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub kind: ExportKind,
    /// Markup of the first render
    pub markup: String,
}

pub trait ComponentRuntime: Send {
    /// Execute a linked module and render its default-exported component.
    fn evaluate(&mut self, module: &CompiledModule) -> Result<Component, RenderError>;

    /// Mount into the root, replacing any previous instance.
    fn mount(&mut self, root: &mut MountRoot, component: Component) -> Result<u64, RuntimeError> {
        Ok(root.mount(component))
    }
}

/// What the root node currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RootContent {
    #[default]
    Empty,
    Mounted {
        component: Component,
        instance: u64,
    },
    /// Fallback view rendered inside the context when a render fails
    ErrorView(String),
}

/// The single root node of the isolated context.
#[derive(Debug, Default)]
pub struct MountRoot {
    content: RootContent,
    mounts: u64,
}

impl MountRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a component, unmounting whatever was there. Returns the new
    /// instance number.
    pub fn mount(&mut self, component: Component) -> u64 {
        self.unmount();
        self.mounts += 1;
        self.content = RootContent::Mounted {
            component,
            instance: self.mounts,
        };
        self.mounts
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.unmount();
        self.content = RootContent::ErrorView(message.into());
    }

    pub fn unmount(&mut self) {
        if let RootContent::Mounted { component, instance } = &self.content {
            tracing::trace!(component = %component.name, instance, "unmounting artifact");
        }
        self.content = RootContent::Empty;
    }

    pub fn content(&self) -> &RootContent {
        &self.content
    }

    pub fn mounted(&self) -> Option<&Component> {
        match &self.content {
            RootContent::Mounted { component, .. } => Some(component),
            _ => None,
        }
    }
}
