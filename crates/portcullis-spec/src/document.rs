//! The subset of an OpenAPI 3.x document the compiler reads.
//!
//! Only paths, operations, parameters and vendor extensions are modelled.
//! Everything else (schemas, responses, servers, ...) is accepted and
//! ignored; this is not a validator.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// HTTP methods an OpenAPI path item can declare, in document order.
pub const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// A parsed OpenAPI document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenApiDocument {
    /// Path templates to path items, in document order.
    #[serde(default)]
    pub paths: IndexMap<String, PathItem>,
    /// Reusable components.
    #[serde(default)]
    pub components: Components,
    /// Remaining top-level keys, vendor extensions included.
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
}

impl OpenApiDocument {
    /// Looks up a top-level extension block.
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// Resolves a parameter entry, following a `#/components/parameters` reference.
    ///
    /// Returns `Err(reference)` when the reference cannot be resolved.
    pub fn resolve_parameter<'a>(&'a self, entry: &'a ParameterOrRef) -> Result<&'a Parameter, &'a str> {
        match entry {
            ParameterOrRef::Parameter(parameter) => Ok(parameter),
            ParameterOrRef::Ref { reference } => reference
                .strip_prefix("#/components/parameters/")
                .and_then(|name| self.components.parameters.get(name))
                .ok_or(reference.as_str()),
        }
    }
}

/// The `components` object; only parameters are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Components {
    /// Named reusable parameters.
    #[serde(default)]
    pub parameters: IndexMap<String, Parameter>,
}

/// One path template's operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    /// Parameters shared by every operation of this path.
    #[serde(default)]
    pub parameters: Vec<ParameterOrRef>,
    /// `GET` operation.
    pub get: Option<Operation>,
    /// `PUT` operation.
    pub put: Option<Operation>,
    /// `POST` operation.
    pub post: Option<Operation>,
    /// `DELETE` operation.
    pub delete: Option<Operation>,
    /// `OPTIONS` operation.
    pub options: Option<Operation>,
    /// `HEAD` operation.
    pub head: Option<Operation>,
    /// `PATCH` operation.
    pub patch: Option<Operation>,
    /// `TRACE` operation.
    pub trace: Option<Operation>,
}

impl PathItem {
    /// Iterates over declared operations as `(lowercase method, operation)`.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &Operation)> {
        let slots = [
            &self.get,
            &self.put,
            &self.post,
            &self.delete,
            &self.options,
            &self.head,
            &self.patch,
            &self.trace,
        ];
        OPERATION_METHODS
            .into_iter()
            .zip(slots)
            .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    }
}

/// A single operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    /// Operation-level parameters.
    #[serde(default)]
    pub parameters: Vec<ParameterOrRef>,
    /// Remaining keys, vendor extensions included.
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
}

/// A parameter or a reference to one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParameterOrRef {
    /// `{"$ref": "#/components/parameters/..."}`.
    Ref {
        /// Reference string.
        #[serde(rename = "$ref")]
        reference: String,
    },
    /// An inline parameter object.
    Parameter(Parameter),
}

/// An OpenAPI parameter object.
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Location as written (`path`, `query`, `header`, `cookie`).
    #[serde(rename = "in")]
    pub location: String,
    /// Remaining keys, vendor extensions included.
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
}

/// The gateway extension block (`x-tyk-api-gateway` by default).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayExtension {
    /// Server settings.
    #[serde(default)]
    pub server: GatewayServer,
}

/// Server section of the gateway extension.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayServer {
    /// Prefix every path of the document is served under.
    #[serde(default)]
    pub listen_path: ListenPath,
}

/// The listen path setting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenPath {
    /// Path prefix, e.g. `/api/v3/provider/`.
    #[serde(default)]
    pub value: String,
    /// Whether the gateway strips the prefix before proxying.
    #[serde(default)]
    pub strip: bool,
}

impl ListenPath {
    /// Returns the prefix without trailing slashes and with a leading one.
    ///
    /// An empty value yields an empty prefix.
    pub fn normalized(&self) -> String {
        let trimmed = self.value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Operation-level security block (`x-security` by default).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationSecurity {
    /// Roles of which the caller must hold at least one.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Parameter bindings.
    #[serde(default)]
    pub parameters: Vec<SecuredParameter>,
}

/// A binding declared in an operation-level security block.
#[derive(Debug, Clone, Deserialize)]
pub struct SecuredParameter {
    /// Request parameter name.
    pub name: String,
    /// Location: `path`, `query`, `body` (or `request`).
    #[serde(rename = "in")]
    pub location: String,
    /// Resource type checked against.
    #[serde(alias = "resource-type", alias = "resourceType")]
    pub resource: String,
    /// Permission evaluated.
    pub permission: String,
}

/// Security block carried by an individual parameter object.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSecurity {
    /// Resource type checked against.
    #[serde(alias = "resource-type", alias = "resourceType")]
    pub resource: String,
    /// Permission evaluated.
    pub permission: String,
}
