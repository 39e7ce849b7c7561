//! Wire messages exchanged with the physics model.
//!
//! One JSON object per line in each direction.
//!
//! Requests:
//!
//! ```text
//! {"cmd":"tao","val":"show lat -no_label_lines -attribute b1_gradient Quadrupole::*"}
//! {"cmd":"send_orbit"}
//! ```
//!
//! Replies carry a `result` field. For table queries it is a list of text rows;
//! for everything else it is opaque and only logged.

use magsim_core::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command that switches kickers and quadrupoles to absolute field units.
pub const ABSOLUTE_FIELD_BASIS: &str = "set ele Kicker::*,Quadrupole::* field_master = T";

/// A request sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ModelRequest {
    /// A command in the model's own query language.
    Tao {
        /// Command text.
        val: String,
    },
    /// Ask the model to recompute orbit-dependent quantities.
    SendOrbit,
}

impl ModelRequest {
    /// Free-form model command.
    pub fn tao(command: impl Into<String>) -> Self {
        ModelRequest::Tao {
            val: command.into(),
        }
    }

    /// Table of `attribute` for every element matching `selection`.
    pub fn show_lattice(attribute: &str, selection: &str) -> Self {
        Self::tao(format!(
            "show lat -no_label_lines -attribute {attribute} {selection}"
        ))
    }

    /// Set one attribute of one element.
    pub fn set_element(element: &str, attribute: &str, value: f64) -> Self {
        Self::tao(format!("set ele {element} {attribute} = {value}"))
    }

    /// One-time switch to the absolute (non-normalized) field basis.
    pub fn absolute_field_basis() -> Self {
        Self::tao(ABSOLUTE_FIELD_BASIS)
    }

    /// Serialize as one newline-terminated line.
    pub fn encode(&self) -> SimResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        match self {
            ModelRequest::Tao { val } => val,
            ModelRequest::SendOrbit => "send_orbit",
        }
    }
}

/// A reply from the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    /// Command output. A list of rows for table queries.
    #[serde(default)]
    pub result: Value,

    /// Any other fields the model chose to send.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ModelReply {
    /// Reply with the given rows as its result.
    pub fn with_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            result: Value::Array(rows.into_iter().map(|r| Value::String(r.into())).collect()),
            extra: serde_json::Map::new(),
        }
    }

    /// Parse one reply line.
    pub fn decode(line: &str) -> SimResult<Self> {
        let value: Value = serde_json::from_str(line.trim_end())?;
        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(SimError::ModelProtocol(format!(
                "expected a reply object, got {other}"
            ))),
        }
    }

    /// Serialize as one newline-terminated line.
    pub fn encode(&self) -> SimResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// The `result` field as text rows.
    pub fn rows(&self) -> SimResult<Vec<String>> {
        match &self.result {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(row) => Ok(row.clone()),
                    other => Err(SimError::ModelProtocol(format!(
                        "table row is not a string: {other}"
                    ))),
                })
                .collect(),
            Value::String(text) => Ok(text.lines().map(str::to_string).collect()),
            other => Err(SimError::ModelProtocol(format!(
                "expected table rows in result, got {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ModelReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{:?}", self.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let line = ModelRequest::set_element("Q21201", "b1_gradient", -1.5)
            .encode()
            .unwrap();
        assert_eq!(
            line,
            "{\"cmd\":\"tao\",\"val\":\"set ele Q21201 b1_gradient = -1.5\"}\n"
        );
        assert_eq!(
            ModelRequest::SendOrbit.encode().unwrap(),
            "{\"cmd\":\"send_orbit\"}\n"
        );
    }

    #[test]
    fn test_show_lattice_command() {
        let req = ModelRequest::show_lattice("bl_hkick", "Kicker::X*");
        assert_eq!(
            req.label(),
            "show lat -no_label_lines -attribute bl_hkick Kicker::X*"
        );
    }

    #[test]
    fn test_absolute_field_basis_command() {
        assert_eq!(
            ModelRequest::absolute_field_basis(),
            ModelRequest::tao("set ele Kicker::*,Quadrupole::* field_master = T")
        );
    }

    #[test]
    fn test_reply_rows() {
        let reply = ModelReply::decode(r#"{"result": ["1 Q1 Quadrupole 0 0.1 2.0"]}"#).unwrap();
        assert_eq!(reply.rows().unwrap(), vec!["1 Q1 Quadrupole 0 0.1 2.0"]);

        let reply = ModelReply::decode(r#"{"status": "ok"}"#).unwrap();
        assert!(reply.rows().is_err());
        assert_eq!(reply.extra.get("status"), Some(&Value::String("ok".into())));
    }

    #[test]
    fn test_reply_must_be_object() {
        assert!(matches!(
            ModelReply::decode("[1, 2]"),
            Err(SimError::ModelProtocol(_))
        ));
        assert!(matches!(
            ModelReply::decode("nonsense"),
            Err(SimError::ModelProtocol(_))
        ));
    }
}
