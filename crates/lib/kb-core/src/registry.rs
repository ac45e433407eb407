//! Host-facing tool registration.

use crate::schema::InvocationError;
use crate::tools::{Invocation, ToolSpec};

/// Options attached to a registered tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// The host may leave the tool disabled until a user opts in.
    pub optional: bool,
}

impl RegisterOptions {
    #[must_use]
    pub const fn optional() -> Self {
        Self { optional: true }
    }
}

/// Capability handed to the bridge by whatever hosts the tools.
pub trait ToolRegistrar {
    fn register(&mut self, spec: ToolSpec, options: RegisterOptions);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub spec: ToolSpec,
    pub options: RegisterOptions,
}

/// In-process registrar that also validates calls against registered schemas.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
}

impl ToolCatalog {
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.spec.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.spec.name).collect()
    }

    /// Validates an invocation against its tool's schema.
    ///
    /// # Errors
    /// Returns [`InvocationError::UnknownTool`] for unregistered tools, or the
    /// first schema violation.
    pub fn validate(&self, invocation: &Invocation) -> Result<(), InvocationError> {
        let entry = self
            .get(invocation.tool())
            .ok_or_else(|| InvocationError::UnknownTool(invocation.tool().to_string()))?;
        entry.spec.parameters.validate(invocation.arguments())
    }
}

impl ToolRegistrar for ToolCatalog {
    fn register(&mut self, spec: ToolSpec, options: RegisterOptions) {
        let entry = CatalogEntry { spec, options };
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.spec.name == entry.spec.name)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{ParamKind, ParamSchema};
    use crate::tools::{KB_INGEST, KB_SEARCH, tool_specs};

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::default();
        for spec in tool_specs() {
            catalog.register(spec, RegisterOptions::optional());
        }
        catalog
    }

    #[test]
    fn reregistering_replaces_entry() {
        let mut catalog = catalog();
        catalog.register(
            ToolSpec {
                name: KB_INGEST,
                description: "replacement",
                parameters: ParamSchema::new().optional("rebuild", ParamKind::Boolean),
            },
            RegisterOptions::default(),
        );

        assert_eq!(catalog.entries().len(), 3);
        let entry = catalog.get(KB_INGEST).expect("kb_ingest registered");
        assert_eq!(entry.spec.description, "replacement");
        assert!(!entry.options.optional);
    }

    #[test]
    fn validates_against_registered_schema() {
        let catalog = catalog();
        let ok = Invocation::from_value(KB_SEARCH, json!({ "query": "foo" })).expect("object");
        let unknown = Invocation::from_value("kb_drop", json!({})).expect("object");
        let extra = Invocation::from_value(KB_INGEST, json!({ "force": true })).expect("object");

        assert_eq!(catalog.validate(&ok), Ok(()));
        assert_eq!(
            catalog.validate(&unknown),
            Err(InvocationError::UnknownTool("kb_drop".to_string()))
        );
        assert_eq!(
            catalog.validate(&extra),
            Err(InvocationError::UnknownProperty("force".to_string()))
        );
    }
}
