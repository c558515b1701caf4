use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One declared parameter of an invocable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-schema type, e.g. "string" or "number".
    #[serde(default = "default_param_type", rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// Declaration of a function the model may ask to invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Vec<FunctionParam>,
}

/// Source of the current function declarations.
///
/// Consulted once per run, only when function calling is enabled; the
/// returned list is treated as an immutable snapshot for that run.
pub trait FunctionSource {
    fn declarations(&self) -> Vec<FunctionDeclaration>;
}

/// A fixed declaration list.
#[derive(Debug, Clone, Default)]
pub struct StaticFunctions(pub Vec<FunctionDeclaration>);

impl FunctionSource for StaticFunctions {
    fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.0.clone()
    }
}

/// Convert declarations to the `functions` array of the request body.
pub fn functions_to_spec(declarations: &[FunctionDeclaration]) -> Vec<Value> {
    declarations
        .iter()
        .map(|decl| {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for param in &decl.params {
                properties.insert(
                    param.name.clone(),
                    json!({
                        "type": param.param_type,
                        "description": param.description,
                    }),
                );
                if param.required {
                    required.push(param.name.clone());
                }
            }
            json!({
                "name": decl.name,
                "description": decl.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            })
        })
        .collect()
}
