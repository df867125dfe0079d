//! Compiles OpenAPI security annotations into a [`PathIndex`].
//!
//! Every operation of a document becomes one index entry keyed by
//! `lowercase(method) + listen path + path template`. Roles come from the
//! operation's security block; bindings come from that block's `parameters`
//! list and from security blocks on individual parameter objects, the
//! latter taking precedence for the same name.

use portcullis_router::{
    ParameterLocation, PathIndex, RouterError, SecurityBinding, SecurityRequirements,
};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::document::{
    GatewayExtension, OpenApiDocument, Operation, OperationSecurity, Parameter, ParameterOrRef,
    ParameterSecurity,
};
use crate::error::{SpecError, SpecResult};

/// Default gateway extension key.
pub const DEFAULT_GATEWAY_EXTENSION: &str = "x-tyk-api-gateway";

/// Default security extension key.
pub const DEFAULT_SECURITY_EXTENSION: &str = "x-security";

/// Extension keys the compiler looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOptions {
    /// Top-level block carrying `server.listenPath.value`.
    pub gateway_extension: String,
    /// Operation- and parameter-level security block.
    pub security_extension: String,
}

impl Default for SpecOptions {
    fn default() -> Self {
        Self {
            gateway_extension: DEFAULT_GATEWAY_EXTENSION.to_string(),
            security_extension: DEFAULT_SECURITY_EXTENSION.to_string(),
        }
    }
}

impl SpecOptions {
    /// Sets the gateway extension key.
    pub fn with_gateway_extension(mut self, key: impl Into<String>) -> Self {
        self.gateway_extension = key.into();
        self
    }

    /// Sets the security extension key.
    pub fn with_security_extension(mut self, key: impl Into<String>) -> Self {
        self.security_extension = key.into();
        self
    }
}

/// One operation ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOperation {
    /// Lowercase HTTP method.
    pub method: &'static str,
    /// Listen path joined with the path template.
    pub path: String,
    /// Roles and bindings for the entry.
    pub requirements: SecurityRequirements,
}

/// Accumulates documents into a single index.
///
/// Documents are compiled atomically: if any operation of a document is
/// invalid, or inserting it would conflict with the index built so far, the
/// whole document is rejected and the index is left untouched.
#[derive(Debug, Clone, Default)]
pub struct SpecCompiler {
    options: SpecOptions,
    index: PathIndex,
    documents: usize,
    operations: usize,
}

impl SpecCompiler {
    /// Creates a compiler with an empty index.
    pub fn new(options: SpecOptions) -> Self {
        Self {
            options,
            index: PathIndex::new(),
            documents: 0,
            operations: 0,
        }
    }

    /// Parses and compiles one JSON document.
    ///
    /// Returns the number of operations added.
    pub fn add_document(&mut self, name: &str, json: &str) -> SpecResult<usize> {
        let document: OpenApiDocument =
            serde_json::from_str(json).map_err(|e| SpecError::Parse {
                document: name.to_string(),
                message: e.to_string(),
            })?;
        self.add_parsed(name, &document)
    }

    /// Compiles an already parsed document.
    pub fn add_parsed(&mut self, name: &str, document: &OpenApiDocument) -> SpecResult<usize> {
        let operations = self.compile(name, document)?;
        let count = operations.len();

        // conflicts within the document, then against what is already indexed
        let mut scratch = PathIndex::new();
        for op in &operations {
            scratch
                .insert(op.method, &op.path, SecurityRequirements::new())
                .map_err(|e| SpecError::index(name, e))?;
            self.index
                .check_insert(op.method, &op.path)
                .map_err(|e| SpecError::index(name, e))?;
        }

        for op in operations {
            trace!(document = name, method = op.method, path = %op.path, "inserting operation");
            self.index
                .insert(op.method, &op.path, op.requirements)
                .map_err(|e| SpecError::index(name, e))?;
        }

        self.documents += 1;
        self.operations += count;
        debug!(document = name, operations = count, "document compiled");
        Ok(count)
    }

    /// Compiles a document's operations without touching the index.
    pub fn compile(
        &self,
        name: &str,
        document: &OpenApiDocument,
    ) -> SpecResult<Vec<CompiledOperation>> {
        let gateway = document
            .extension(&self.options.gateway_extension)
            .ok_or_else(|| SpecError::MissingGatewayExtension {
                document: name.to_string(),
                extension: self.options.gateway_extension.clone(),
            })?;
        let gateway = GatewayExtension::deserialize(gateway).map_err(|e| {
            SpecError::InvalidGatewayExtension {
                document: name.to_string(),
                message: e.to_string(),
            }
        })?;
        let prefix = gateway.server.listen_path.normalized();

        let mut compiled = Vec::new();
        for (template, item) in &document.paths {
            let shared = resolve_parameters(name, document, &item.parameters)?;
            for (method, operation) in item.operations() {
                let own = resolve_parameters(name, document, &operation.parameters)?;
                let location = format!("{} {template}", method.to_ascii_uppercase());
                let requirements = self.requirements_for(
                    name,
                    &location,
                    operation,
                    &effective_parameters(&shared, &own),
                )?;
                compiled.push(CompiledOperation {
                    method,
                    path: format!("{prefix}{template}"),
                    requirements,
                });
            }
        }
        Ok(compiled)
    }

    fn requirements_for(
        &self,
        document: &str,
        location: &str,
        operation: &Operation,
        parameters: &[&Parameter],
    ) -> SpecResult<SecurityRequirements> {
        let mut requirements = SecurityRequirements::new();
        let key = self.options.security_extension.as_str();

        if let Some(block) = operation.extensions.get(key) {
            let security = OperationSecurity::deserialize(block)
                .map_err(|e| SpecError::invalid_security(document, location, e))?;
            for role in security.roles {
                if !role.trim().is_empty() {
                    requirements.add_role(role);
                }
            }
            for parameter in security.parameters {
                let binding = make_binding(&parameter.location, parameter.resource, parameter.permission)
                    .map_err(|e| {
                        SpecError::invalid_security(
                            document,
                            format!("{location} ({})", parameter.name),
                            e,
                        )
                    })?;
                requirements.bind(parameter.name, binding);
            }
        }

        for parameter in parameters {
            let Some(block) = parameter.extensions.get(key) else {
                continue;
            };
            let at = format!("{location} ({})", parameter.name);
            let security = ParameterSecurity::deserialize(block)
                .map_err(|e| SpecError::invalid_security(document, at.as_str(), e))?;
            let binding = make_binding(&parameter.location, security.resource, security.permission)
                .map_err(|e| SpecError::invalid_security(document, at.as_str(), e))?;
            requirements.bind(parameter.name.clone(), binding);
        }

        Ok(requirements)
    }

    /// The index built so far.
    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Number of documents compiled successfully.
    pub fn document_count(&self) -> usize {
        self.documents
    }

    /// Number of operations compiled successfully.
    pub fn operation_count(&self) -> usize {
        self.operations
    }

    /// Consumes the compiler and returns the index.
    pub fn finish(self) -> PathIndex {
        self.index
    }
}

fn make_binding(
    location: &str,
    resource: String,
    permission: String,
) -> Result<SecurityBinding, RouterError> {
    let location: ParameterLocation = location.parse()?;
    SecurityBinding::new(location, resource, permission)
}

fn resolve_parameters<'a>(
    document_name: &str,
    document: &'a OpenApiDocument,
    entries: &'a [ParameterOrRef],
) -> SpecResult<Vec<&'a Parameter>> {
    entries
        .iter()
        .map(|entry| {
            document
                .resolve_parameter(entry)
                .map_err(|reference| SpecError::UnresolvedReference {
                    document: document_name.to_string(),
                    reference: reference.to_string(),
                })
        })
        .collect()
}

/// Path-item parameters not redeclared by the operation, then the
/// operation's own.
fn effective_parameters<'a>(shared: &[&'a Parameter], own: &[&'a Parameter]) -> Vec<&'a Parameter> {
    shared
        .iter()
        .filter(|s| {
            !own.iter()
                .any(|o| o.name == s.name && o.location.eq_ignore_ascii_case(&s.location))
        })
        .chain(own.iter())
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(paths: serde_json::Value) -> String {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "test", "version": "1.0.0"},
            "paths": paths,
            "x-tyk-api-gateway": {"server": {"listenPath": {"value": "/api/test/", "strip": true}}}
        })
        .to_string()
    }

    #[test]
    fn test_key_includes_listen_path() {
        let mut compiler = SpecCompiler::default();
        let added = compiler
            .add_document("test-oas.json", &document(json!({"/users": {"get": {}, "post": {}}})))
            .unwrap();
        assert_eq!(added, 2);

        let index = compiler.finish();
        assert!(index.find("GET", "/api/test/users").is_some());
        assert!(index.find("POST", "/api/test/users").is_some());
        assert!(index.find("GET", "/users").is_none());
    }

    #[test]
    fn test_operation_roles_and_bindings() {
        let mut compiler = SpecCompiler::default();
        compiler
            .add_document(
                "test-oas.json",
                &document(json!({
                    "/providers/{providerCode}": {"get": {
                        "x-security": {
                            "roles": ["PROVIDER", "PLATFORM_ADMIN"],
                            "parameters": [
                                {"name": "providerCode", "in": "path", "resource": "provider", "permission": "view"},
                                {"name": "programId", "in": "query", "resource": "program", "permission": "view"}
                            ]
                        }
                    }}
                })),
            )
            .unwrap();

        let index = compiler.finish();
        let found = index.find("get", "/api/test/providers/AAR").unwrap();
        let node = found.node();
        assert_eq!(node.required_roles().len(), 2);
        assert_eq!(node.parameter_bindings()["providerCode"].location, ParameterLocation::Path);
        assert_eq!(node.parameter_bindings()["programId"].location, ParameterLocation::Query);
    }

    #[test]
    fn test_parameter_level_binding_wins() {
        let mut compiler = SpecCompiler::default();
        compiler
            .add_document(
                "test-oas.json",
                &document(json!({
                    "/accounts/{accountCode}": {"get": {
                        "x-security": {"parameters": [
                            {"name": "accountCode", "in": "path", "resource": "account", "permission": "view"}
                        ]},
                        "parameters": [{
                            "name": "accountCode", "in": "path", "required": true,
                            "x-security": {"resource": "payment-account", "permission": "manage"}
                        }]
                    }}
                })),
            )
            .unwrap();

        let index = compiler.finish();
        let found = index.find("get", "/api/test/accounts/1").unwrap();
        let binding = &found.node().parameter_bindings()["accountCode"];
        assert_eq!(binding.resource_type, "payment-account");
        assert_eq!(binding.permission, "manage");
    }

    #[test]
    fn test_path_item_parameters_and_refs() {
        let json = json!({
            "openapi": "3.0.3",
            "paths": {
                "/providers/{providerCode}/payers": {
                    "parameters": [{"$ref": "#/components/parameters/ProviderCode"}],
                    "get": {},
                    "post": {"parameters": [
                        {"name": "providerCode", "in": "path"}
                    ]}
                }
            },
            "components": {"parameters": {"ProviderCode": {
                "name": "providerCode", "in": "path",
                "x-security": {"resource": "provider", "permission": "view"}
            }}},
            "x-tyk-api-gateway": {"server": {"listenPath": {"value": "/p"}}}
        })
        .to_string();

        let mut compiler = SpecCompiler::default();
        compiler.add_document("ref-oas.json", &json).unwrap();
        let index = compiler.finish();

        let get = index.find("get", "/p/providers/AAR/payers").unwrap();
        assert_eq!(get.node().parameter_bindings()["providerCode"].resource_type, "provider");

        // the operation redeclares the parameter without a security block
        let post = index.find("post", "/p/providers/AAR/payers").unwrap();
        assert!(post.node().parameter_bindings().is_empty());
    }

    #[test]
    fn test_request_location_alias() {
        let mut compiler = SpecCompiler::default();
        compiler
            .add_document(
                "test-oas.json",
                &document(json!({"/payments": {"post": {"x-security": {"parameters": [
                    {"name": "payerId", "in": "request", "resource": "payer", "permission": "pay"}
                ]}}}})),
            )
            .unwrap();

        let index = compiler.finish();
        let found = index.find("post", "/api/test/payments").unwrap();
        assert_eq!(found.node().parameter_bindings()["payerId"].location, ParameterLocation::Body);
    }

    #[test]
    fn test_missing_gateway_extension() {
        let mut compiler = SpecCompiler::default();
        let err = compiler
            .add_document("bare-oas.json", r#"{"openapi": "3.0.3", "paths": {"/a": {"get": {}}}}"#)
            .unwrap_err();
        assert!(matches!(err, SpecError::MissingGatewayExtension { .. }));
        assert!(compiler.index().is_empty());
    }

    #[test]
    fn test_unparsable_document() {
        let mut compiler = SpecCompiler::default();
        let err = compiler.add_document("bad-oas.json", "{ not json").unwrap_err();
        assert!(matches!(err, SpecError::Parse { ref document, .. } if document == "bad-oas.json"));
    }

    #[test]
    fn test_invalid_security_block_rejects_document() {
        let mut compiler = SpecCompiler::default();
        let err = compiler
            .add_document(
                "test-oas.json",
                &document(json!({
                    "/ok": {"get": {}},
                    "/bad": {"get": {"x-security": {"roles": "PROVIDER"}}}
                })),
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::InvalidSecurity { ref location, .. } if location == "GET /bad"));
        assert!(compiler.index().find("get", "/api/test/ok").is_none());
    }

    #[test]
    fn test_unknown_location_rejects_document() {
        let mut compiler = SpecCompiler::default();
        let err = compiler
            .add_document(
                "test-oas.json",
                &document(json!({"/a": {"get": {"x-security": {"parameters": [
                    {"name": "X-Tenant", "in": "header", "resource": "tenant", "permission": "view"}
                ]}}}})),
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::InvalidSecurity { .. }));
    }

    #[test]
    fn test_ambiguous_document_is_atomic() {
        let mut compiler = SpecCompiler::default();
        compiler
            .add_document("a-oas.json", &document(json!({"/users/{id}": {"get": {}}})))
            .unwrap();

        let err = compiler
            .add_document(
                "b-oas.json",
                &document(json!({
                    "/groups": {"get": {}},
                    "/users/{userId}/orders": {"get": {}}
                })),
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::AmbiguousParameter { .. }));
        assert!(compiler.index().find("get", "/api/test/groups").is_none());
        assert_eq!(compiler.document_count(), 1);
    }

    #[test]
    fn test_conflict_within_one_document_is_atomic() {
        let mut compiler = SpecCompiler::default();
        compiler
            .add_document("a-oas.json", &document(json!({"/users": {"get": {}}})))
            .unwrap();
        let nodes = compiler.index().node_count();

        let err = compiler
            .add_document(
                "b-oas.json",
                &document(json!({
                    "/groups": {"get": {}},
                    "/groups/{gid}": {"get": {}},
                    "/groups/{groupId}/members": {"get": {}}
                })),
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::AmbiguousParameter { .. }));
        assert_eq!(compiler.index().node_count(), nodes);
        assert_eq!(compiler.operation_count(), 1);
    }

    #[test]
    fn test_documents_merge_on_same_key() {
        let mut compiler = SpecCompiler::default();
        compiler
            .add_document(
                "a-oas.json",
                &document(json!({"/users": {"get": {"x-security": {"roles": ["PAYER"]}}}})),
            )
            .unwrap();
        compiler
            .add_document(
                "b-oas.json",
                &document(json!({"/users": {"get": {"x-security": {"roles": ["PROVIDER"]}}}})),
            )
            .unwrap();

        assert_eq!(compiler.operation_count(), 2);
        let index = compiler.finish();
        let found = index.find("get", "/api/test/users").unwrap();
        assert!(found.node().required_roles().contains("PAYER"));
        assert!(found.node().required_roles().contains("PROVIDER"));
    }

    #[test]
    fn test_custom_extension_keys() {
        let options = SpecOptions::default()
            .with_gateway_extension("x-gateway")
            .with_security_extension("x-authz");
        let mut compiler = SpecCompiler::new(options);
        let json = json!({
            "paths": {"/a": {"get": {"x-authz": {"roles": ["ADMIN"]}}}},
            "x-gateway": {"server": {"listenPath": {"value": "/svc/"}}}
        })
        .to_string();
        compiler.add_document("custom-oas.json", &json).unwrap();

        let index = compiler.finish();
        assert!(index
            .find("get", "/svc/a")
            .unwrap()
            .node()
            .required_roles()
            .contains("ADMIN"));
    }
}
