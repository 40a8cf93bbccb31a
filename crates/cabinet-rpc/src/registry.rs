//! Method registry for the RPC endpoint
//!
//! A static table of the methods served, their argument schemas and whether
//! they require authentication.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::error::{RpcError, RpcResult};
use crate::handlers::MethodArgs;

/// Argument and return types understood by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Any,
}

impl ParamType {
    /// Name used in signatures
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Dict => "dict",
            ParamType::Any => "any",
        }
    }

    /// Whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Str => value.is_string(),
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_number(),
            ParamType::Bool => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Dict => value.is_object(),
            ParamType::Any => true,
        }
    }
}

/// Parameter definition
#[derive(Debug, Clone, Serialize)]
pub struct ParamDef {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDef {
    pub fn required(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
        }
    }

    pub fn with_default(name: &'static str, ty: ParamType, default: Value) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: Some(default),
        }
    }
}

/// Handler selector for a registered method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodId {
    Login,
    GetAll,
    Get,
    Add,
    Test,
    Echo,
    Describe,
}

/// Method definition
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    pub id: MethodId,
    /// Fully qualified name, e.g. `App.login`
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamDef>,
    pub returns: ParamType,
    /// Requires a valid session token
    pub authenticated: bool,
    /// Check argument types before dispatch
    pub validate: bool,
}

impl MethodDefinition {
    /// Signature string, e.g. `App.echo(name=str) -> str`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}={}", p.name, p.ty.as_str()))
            .collect();
        format!(
            "{}({}) -> {}",
            self.name,
            params.join(", "),
            self.returns.as_str()
        )
    }

    /// Bind positional or named params to the declared arguments
    pub fn bind(&self, params: Option<Value>) -> RpcResult<MethodArgs> {
        let mut args = HashMap::new();

        match params {
            None | Some(Value::Null) => {}
            Some(Value::Array(values)) => {
                if values.len() > self.params.len() {
                    return Err(RpcError::ValidationFailure(format!(
                        "{} takes at most {} params, got {}",
                        self.name,
                        self.params.len(),
                        values.len()
                    )));
                }
                for (def, value) in self.params.iter().zip(values) {
                    args.insert(def.name.to_string(), value);
                }
            }
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    if !self.params.iter().any(|p| p.name == key) {
                        return Err(RpcError::ValidationFailure(format!(
                            "unexpected param `{}` for {}",
                            key, self.name
                        )));
                    }
                    args.insert(key, value);
                }
            }
            Some(_) => {
                return Err(RpcError::ValidationFailure(
                    "params must be an array or an object".to_string(),
                ));
            }
        }

        for def in &self.params {
            match args.get(def.name) {
                Some(value) => {
                    if self.validate && !def.ty.accepts(value) {
                        return Err(RpcError::ValidationFailure(format!(
                            "param `{}` must be {}",
                            def.name,
                            def.ty.as_str()
                        )));
                    }
                }
                None => {
                    if let Some(default) = &def.default {
                        args.insert(def.name.to_string(), default.clone());
                    } else if def.required {
                        return Err(RpcError::ValidationFailure(format!(
                            "missing required param `{}`",
                            def.name
                        )));
                    }
                }
            }
        }

        Ok(MethodArgs { args })
    }

    /// Introspection entry for `system.describe`
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "signature": self.signature(),
            "summary": self.description,
            "params": self.params,
            "return": self.returns,
            "authenticated": self.authenticated,
            "validate": self.validate,
        })
    }
}

/// Method registry
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodDefinition>,
}

impl MethodRegistry {
    /// Registry with the default methods; store methods are open
    pub fn new() -> Self {
        Self::with_store_gated(false)
    }

    /// Registry with the default methods, optionally gating the store methods
    pub fn with_store_gated(gate_store: bool) -> Self {
        let mut registry = Self::default();
        registry.register_default_methods(gate_store);
        registry
    }

    fn register_default_methods(&mut self, gate_store: bool) {
        self.register(MethodDefinition {
            id: MethodId::Login,
            name: "App.login",
            description: "Check credentials against the cabinet and return a session token",
            params: vec![
                ParamDef::required("username", ParamType::Str),
                ParamDef::required("password", ParamType::Str),
                ParamDef::required("vault_path", ParamType::Str),
            ],
            returns: ParamType::Str,
            authenticated: false,
            validate: true,
        });

        self.register(MethodDefinition {
            id: MethodId::GetAll,
            name: "App.get_all",
            description: "List every entry in the cabinet",
            params: vec![],
            returns: ParamType::List,
            authenticated: gate_store,
            validate: false,
        });

        self.register(MethodDefinition {
            id: MethodId::Get,
            name: "App.get",
            description: "Fetch the entry with the given name",
            params: vec![ParamDef::required("name", ParamType::Str)],
            returns: ParamType::Dict,
            authenticated: gate_store,
            validate: false,
        });

        self.register(MethodDefinition {
            id: MethodId::Add,
            name: "App.add",
            description: "Add an entry; `item.name` is its key",
            params: vec![ParamDef::required("item", ParamType::Dict)],
            returns: ParamType::Dict,
            authenticated: gate_store,
            validate: true,
        });

        self.register(MethodDefinition {
            id: MethodId::Test,
            name: "Cabinet.test",
            description: "Authenticated liveness check",
            params: vec![],
            returns: ParamType::Str,
            authenticated: true,
            validate: false,
        });

        self.register(MethodDefinition {
            id: MethodId::Echo,
            name: "App.echo",
            description: "Authenticated greeting that exercises argument validation",
            params: vec![ParamDef::with_default(
                "name",
                ParamType::Str,
                json!("JSON-RPC"),
            )],
            returns: ParamType::Str,
            authenticated: true,
            validate: true,
        });

        self.register(MethodDefinition {
            id: MethodId::Describe,
            name: "system.describe",
            description: "Describe the service and its methods",
            params: vec![],
            returns: ParamType::Dict,
            authenticated: false,
            validate: false,
        });
    }

    /// Register a method
    pub fn register(&mut self, method: MethodDefinition) {
        self.methods.insert(method.name.to_string(), method);
    }

    /// All method definitions, sorted by name
    pub fn get_all(&self) -> Vec<&MethodDefinition> {
        let mut methods: Vec<_> = self.methods.values().collect();
        methods.sort_by_key(|m| m.name);
        methods
    }

    pub fn get(&self, name: &str) -> Option<&MethodDefinition> {
        self.methods.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Body of the `system.describe` response
    pub fn describe(&self) -> Value {
        let mut service = Map::new();
        service.insert("name".to_string(), json!(env!("CARGO_PKG_NAME")));
        service.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
        service.insert(
            "procs".to_string(),
            Value::Array(self.get_all().iter().map(|m| m.describe()).collect()),
        );
        Value::Object(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_methods() {
        let registry = MethodRegistry::new();

        for name in [
            "App.login",
            "App.get_all",
            "App.get",
            "App.add",
            "Cabinet.test",
            "App.echo",
            "system.describe",
        ] {
            assert!(registry.exists(name), "missing {name}");
        }
        assert!(!registry.exists("App.delete"));
    }

    #[test]
    fn test_auth_flags() {
        let registry = MethodRegistry::new();
        assert!(registry.get("Cabinet.test").unwrap().authenticated);
        assert!(registry.get("App.echo").unwrap().authenticated);
        assert!(!registry.get("App.login").unwrap().authenticated);
        assert!(!registry.get("App.get_all").unwrap().authenticated);

        let gated = MethodRegistry::with_store_gated(true);
        assert!(gated.get("App.get_all").unwrap().authenticated);
        assert!(gated.get("App.add").unwrap().authenticated);
        assert!(!gated.get("App.login").unwrap().authenticated);
    }

    #[test]
    fn test_signatures() {
        let registry = MethodRegistry::new();
        assert_eq!(
            registry.get("App.login").unwrap().signature(),
            "App.login(username=str, password=str, vault_path=str) -> str"
        );
        assert_eq!(
            registry.get("App.echo").unwrap().signature(),
            "App.echo(name=str) -> str"
        );
        assert_eq!(
            registry.get("App.get_all").unwrap().signature(),
            "App.get_all() -> list"
        );
    }

    #[test]
    fn test_bind_named_and_positional() {
        let registry = MethodRegistry::new();
        let login = registry.get("App.login").unwrap();

        let named = login
            .bind(Some(json!({"username": "a", "password": "b", "vault_path": "c"})))
            .unwrap();
        assert_eq!(named.get_string("vault_path"), Some("c".to_string()));

        let positional = login.bind(Some(json!(["a", "b", "c"]))).unwrap();
        assert_eq!(positional.get_string("password"), Some("b".to_string()));
    }

    #[test]
    fn test_bind_rejects_bad_shapes() {
        let registry = MethodRegistry::new();
        let login = registry.get("App.login").unwrap();

        assert!(login.bind(Some(json!(["a", "b"]))).is_err());
        assert!(login.bind(Some(json!(["a", "b", "c", "d"]))).is_err());
        assert!(login
            .bind(Some(json!({"username": "a", "password": "b", "vault_path": "c", "x": 1})))
            .is_err());
        assert!(login.bind(Some(json!("a"))).is_err());
    }

    #[test]
    fn test_bind_validates_types() {
        let registry = MethodRegistry::new();
        let echo = registry.get("App.echo").unwrap();

        assert!(matches!(
            echo.bind(Some(json!({"name": 5}))),
            Err(RpcError::ValidationFailure(_))
        ));

        // `App.get` does not validate; type errors surface in the handler
        let get = registry.get("App.get").unwrap();
        assert!(get.bind(Some(json!([5]))).is_ok());
    }

    #[test]
    fn test_bind_applies_defaults() {
        let registry = MethodRegistry::new();
        let args = registry.get("App.echo").unwrap().bind(None).unwrap();
        assert_eq!(args.get_string("name"), Some("JSON-RPC".to_string()));
    }

    #[test]
    fn test_describe_lists_all_methods() {
        let registry = MethodRegistry::new();
        let described = registry.describe();
        let procs = described["procs"].as_array().unwrap();

        assert_eq!(procs.len(), registry.get_all().len());
        assert!(procs
            .iter()
            .any(|p| p["signature"] == "App.add(item=dict) -> dict"));
    }
}
