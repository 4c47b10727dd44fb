//! Named collections of host types

use super::types::HostTypeRef;

/// A set of host types registered together, grouped by namespace on import
#[derive(Debug, Clone, Default)]
pub struct HostAssembly {
    name: String,
    types: Vec<HostTypeRef>,
}

/// Types of one assembly sharing a namespace and simple name
#[derive(Debug, Clone)]
pub struct TypeGroup {
    pub namespace: String,
    pub name: String,
    pub types: Vec<HostTypeRef>,
}

impl HostAssembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: &HostTypeRef) -> Self {
        self.add(ty);
        self
    }

    pub fn add(&mut self, ty: &HostTypeRef) {
        self.types.push(ty.clone());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[HostTypeRef] {
        &self.types
    }

    /// Find a type by namespace-qualified display name
    pub fn find(&self, full_name: &str) -> Option<&HostTypeRef> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }

    /// Group types by namespace and simple name, in registration order
    pub fn groups(&self) -> Vec<TypeGroup> {
        let mut groups: Vec<TypeGroup> = Vec::new();
        for ty in &self.types {
            match groups
                .iter_mut()
                .find(|g| g.namespace == ty.namespace() && g.name == ty.name())
            {
                Some(group) => group.types.push(ty.clone()),
                None => groups.push(TypeGroup {
                    namespace: ty.namespace().to_string(),
                    name: ty.name().to_string(),
                    types: vec![ty.clone()],
                }),
            }
        }
        groups
    }
}
