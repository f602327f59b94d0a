//! Declarative attribute schemas for the resource and data source.

use serde::Serialize;
use serde_json::Value;

use crate::sensitive::REDACTED;

/// How an attribute is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Required,
    Optional,
    Computed,
    /// Optional in configuration, filled in by the server when absent.
    OptionalComputed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeKind,
    /// Changing the value replaces the resource.
    pub force_new: bool,
    pub sensitive: bool,
}

impl Attribute {
    fn new(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            force_new: false,
            sensitive: false,
        }
    }

    fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Replace sensitive attributes of a state object with a placeholder.
    pub fn redact(&self, mut state: Value) -> Value {
        if let Some(obj) = state.as_object_mut() {
            for attr in self.attributes.iter().filter(|a| a.sensitive) {
                if let Some(v) = obj.get_mut(attr.name) {
                    *v = Value::String(REDACTED.to_string());
                }
            }
        }
        state
    }
}

/// Schema of the `cloudstack_unique_nic` resource.
pub fn unique_nic_schema() -> Schema {
    Schema {
        attributes: vec![
            Attribute::new("network_id", AttributeKind::Required).force_new(),
            Attribute::new("ip_address", AttributeKind::OptionalComputed).force_new(),
            Attribute::new("virtual_machine_id", AttributeKind::Required).force_new(),
        ],
    }
}

/// Schema of the `cloudstack_kubernetes_cluster_config` data source.
pub fn kubernetes_cluster_config_schema() -> Schema {
    Schema {
        attributes: vec![
            Attribute::new("id", AttributeKind::Required),
            Attribute::new("name", AttributeKind::Computed),
            Attribute::new("config_data", AttributeKind::Computed).sensitive(),
        ],
    }
}
