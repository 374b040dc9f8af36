//! Function description metadata
//!
//! Descriptions serialize to the JSON shape Graphite serves from
//! `/functions`, and double as the parameter schema the evaluator
//! validates calls against.

use super::error::{EvalError, EvalResult};
use crate::parser::Call;
use serde::Serialize;

/// Parameter type vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamType {
    SeriesList,
    SeriesLists,
    String,
    Integer,
    Float,
    Boolean,
    Interval,
    IntOrInterval,
    AggFunc,
    NodeOrTag,
    Any,
}

/// A default value or suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One parameter of a function signature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    /// Variadic: absorbs every remaining positional argument
    #[serde(skip_serializing_if = "is_false")]
    pub multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<ParamValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FunctionParam {
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            multiple: false,
            default: None,
            suggestions: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Builder method: mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builder method: mark as variadic
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Builder method: set the default value
    pub fn default(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Builder method: add value suggestions
    pub fn suggestions<V: Into<ParamValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.suggestions.extend(values.into_iter().map(Into::into));
        self
    }

    /// Builder method: restrict to a fixed set of options
    pub fn options<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.options.extend(values.into_iter().map(Into::into));
        self
    }
}

/// Metadata for one function name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDescription {
    pub name: String,
    /// Signature, e.g. `scale(seriesList, factor)`
    pub function: String,
    pub description: String,
    pub module: String,
    pub group: String,
    pub params: Vec<FunctionParam>,
}

impl FunctionDescription {
    /// Create a description; the signature is derived from the params
    pub fn new(name: impl Into<String>, group: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            function: format!("{}()", name),
            name,
            description: description.into(),
            module: "graphex.functions".to_string(),
            group: group.into(),
            params: Vec::new(),
        }
    }

    /// Builder method: append a parameter
    pub fn param(mut self, param: FunctionParam) -> Self {
        self.params.push(param);
        self.function = self.signature();
        self
    }

    /// Same metadata under another name
    pub fn alias(&self, name: impl Into<String>) -> Self {
        let mut desc = self.clone();
        desc.name = name.into();
        desc.function = desc.signature();
        desc
    }

    fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match (&p.default, p.multiple) {
                (_, true) => format!("*{}", p.name),
                (Some(ParamValue::String(s)), _) => format!("{}='{}'", p.name, s),
                (Some(ParamValue::Bool(b)), _) => format!("{}={}", p.name, if *b { "True" } else { "False" }),
                (Some(ParamValue::Int(i)), _) => format!("{}={}", p.name, i),
                (Some(ParamValue::Float(f)), _) => format!("{}={}", p.name, f),
                (None, _) if p.required => p.name.clone(),
                (None, _) => format!("{}=None", p.name),
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// Check arity and required parameters before dispatch
    pub fn validate(&self, call: &Call) -> EvalResult<()> {
        let variadic = self.params.iter().any(|p| p.multiple);
        if !variadic && call.args.len() > self.params.len() {
            return Err(EvalError::TooManyArguments {
                target: call.name.clone(),
            });
        }
        for (index, param) in self.params.iter().enumerate() {
            if param.required && !call.has_arg(&param.name, index) {
                return Err(EvalError::MissingArgument {
                    target: call.name.clone(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, Expr};

    fn scale() -> FunctionDescription {
        FunctionDescription::new("scale", "Transform", "Multiply each value by a constant")
            .param(FunctionParam::new("seriesList", ParamType::SeriesList).required())
            .param(FunctionParam::new("factor", ParamType::Float).required())
    }

    fn call(text: &str) -> Call {
        match parse(text).unwrap() {
            Expr::Call(call) => call,
            other => panic!("not a call: {:?}", other),
        }
    }

    #[test]
    fn test_signature() {
        assert_eq!(scale().function, "scale(seriesList, factor)");
        let desc = FunctionDescription::new("groupByNodes", "Combine", "")
            .param(FunctionParam::new("seriesList", ParamType::SeriesList).required())
            .param(FunctionParam::new("callback", ParamType::AggFunc).default("average"))
            .param(FunctionParam::new("nodes", ParamType::NodeOrTag).multiple());
        assert_eq!(desc.function, "groupByNodes(seriesList, callback='average', *nodes)");
        assert_eq!(desc.alias("x").function, "x(seriesList, callback='average', *nodes)");
    }

    #[test]
    fn test_validate() {
        let desc = scale();
        assert!(desc.validate(&call("scale(a, 2)")).is_ok());
        assert!(desc.validate(&call("scale(a, factor=2)")).is_ok());
        assert!(matches!(
            desc.validate(&call("scale(a)")),
            Err(EvalError::MissingArgument { param, .. }) if param == "factor"
        ));
        assert!(matches!(
            desc.validate(&call("scale(a, 2, 3)")),
            Err(EvalError::TooManyArguments { .. })
        ));
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(scale()).unwrap();
        assert_eq!(json["name"], "scale");
        assert_eq!(json["group"], "Transform");
        assert_eq!(json["params"][0]["type"], "seriesList");
        assert_eq!(json["params"][1]["required"], true);
        assert!(json["params"][1].get("multiple").is_none());
    }
}
