//! In-process stand-in for the physics model.
//!
//! `FakeModel` holds a small lattice and answers the handful of commands the
//! magnet service sends: attribute tables, attribute sets, the field-basis
//! switch and orbit recomputes. It speaks the same line protocol as the real
//! model, so the client and the service can be exercised end to end without a
//! model process. Every request is recorded for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use magsim_core::error::SimResult;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::link::{DynStream, ModelConnector};
use crate::protocol::{ModelReply, ModelRequest};

const DUPLEX_BUFFER: usize = 64 * 1024;

// =============================================================================
// Lattice
// =============================================================================

/// One element of the fake lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeElement {
    /// Element name, e.g. `Q21201`.
    pub name: String,
    /// Element key, e.g. `Quadrupole`, `Kicker`, `Sbend`.
    pub key: String,
    /// Longitudinal position.
    pub s: f64,
    /// Element length.
    pub length: f64,
    attributes: HashMap<String, f64>,
    field_master: bool,
}

impl FakeElement {
    /// New element with no attributes set. Unset attributes read as zero.
    pub fn new(name: impl Into<String>, key: impl Into<String>, s: f64, length: f64) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            s,
            length,
            attributes: HashMap::new(),
            field_master: false,
        }
    }

    /// Builder: seed an attribute value.
    pub fn with_attribute(mut self, attribute: &str, value: f64) -> Self {
        self.attributes.insert(attribute.to_string(), value);
        self
    }

    fn attribute(&self, attribute: &str) -> f64 {
        self.attributes.get(attribute).copied().unwrap_or(0.0)
    }
}

/// Does `name` match a `*` wildcard pattern? Case-insensitive.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let name: Vec<char> = name.to_ascii_lowercase().chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// Does the element match a selection such as `Kicker::X*,Quadrupole::*`?
fn selects(selection: &str, element: &FakeElement) -> bool {
    selection.split(',').any(|term| match term.split_once("::") {
        Some((key, name)) => {
            wildcard_match(key, &element.key) && wildcard_match(name, &element.name)
        }
        None => wildcard_match(term, &element.name),
    })
}

// =============================================================================
// FakeModel
// =============================================================================

#[derive(Debug, Default)]
struct FakeState {
    elements: Vec<FakeElement>,
    requests: Vec<ModelRequest>,
    orbit_count: usize,
}

/// A scripted physics model.
#[derive(Debug, Default)]
pub struct FakeModel {
    state: Mutex<FakeState>,
    stalled: AtomicBool,
    connections: AtomicUsize,
}

impl FakeModel {
    /// Model over the given lattice.
    pub fn new(elements: Vec<FakeElement>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                elements,
                ..FakeState::default()
            }),
            ..Self::default()
        })
    }

    /// Connector that opens in-memory connections to this model.
    pub fn connector(self: &Arc<Self>) -> FakeConnector {
        FakeConnector {
            model: Arc::clone(self),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.state.lock().requests.clone()
    }

    /// Forget the request log.
    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Current value of an element attribute.
    pub fn attribute(&self, element: &str, attribute: &str) -> Option<f64> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(element))
            .map(|e| e.attribute(attribute))
    }

    /// Number of `send_orbit` requests handled.
    pub fn orbit_count(&self) -> usize {
        self.state.lock().orbit_count
    }

    /// Has the element been switched to absolute field units?
    pub fn field_master(&self, element: &str) -> bool {
        self.state
            .lock()
            .elements
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(element) && e.field_master)
    }

    /// While stalled the model records and applies requests but never replies.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Number of connections opened through [`FakeConnector`].
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Apply one request and build its reply.
    pub fn handle(&self, request: &ModelRequest) -> ModelReply {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        match request {
            ModelRequest::SendOrbit => {
                state.orbit_count += 1;
                ModelReply {
                    result: Value::String("orbit sent".into()),
                    ..ModelReply::default()
                }
            }
            ModelRequest::Tao { val } => state.run_command(val),
        }
    }

    /// Answer requests on `stream` until the peer hangs up.
    pub async fn serve<S>(self: Arc<Self>, stream: S) -> SimResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let reply = match serde_json::from_str::<ModelRequest>(&line) {
                Ok(request) => self.handle(&request),
                Err(err) => {
                    warn!(%err, line = %line, "Fake model received an unreadable request");
                    error_reply(format!("unreadable request: {err}"))
                }
            };
            if self.stalled.load(Ordering::SeqCst) {
                debug!("Fake model stalled; withholding reply");
                continue;
            }
            writer.write_all(reply.encode()?.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok(())
    }
}

impl FakeState {
    fn run_command(&mut self, command: &str) -> ModelReply {
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["show", "lat", flags @ ..] => self.show_lattice(flags),
            ["set", "ele", selection, attribute, "=", value] => {
                self.set_element(selection, attribute, value)
            }
            _ => error_reply(format!("unrecognized command: {command}")),
        }
    }

    fn show_lattice(&self, flags: &[&str]) -> ModelReply {
        let attribute = flags
            .windows(2)
            .find(|pair| pair[0] == "-attribute")
            .map(|pair| pair[1]);
        let (Some(attribute), Some(selection)) = (attribute, flags.last()) else {
            return error_reply("show lat needs -attribute <name> <selection>");
        };

        let rows: Vec<String> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, element)| selects(selection, element))
            .map(|(index, element)| {
                format!(
                    "{:>5}  {:<12} {:<12} {:>10.4} {} {}",
                    index + 1,
                    element.name,
                    element.key,
                    element.s,
                    element.length,
                    element.attribute(attribute)
                )
            })
            .collect();
        ModelReply::with_rows(rows)
    }

    fn set_element(&mut self, selection: &str, attribute: &str, value: &str) -> ModelReply {
        if attribute == "field_master" {
            let on = value.eq_ignore_ascii_case("T");
            let mut count = 0;
            for element in self.elements.iter_mut().filter(|e| selects(selection, e)) {
                element.field_master = on;
                count += 1;
            }
            return ModelReply::with_rows([format!("field_master = {value} on {count} elements")]);
        }

        let Ok(value) = value.parse::<f64>() else {
            return error_reply(format!("not a number: {value}"));
        };
        let mut count = 0;
        for element in self.elements.iter_mut().filter(|e| selects(selection, e)) {
            element.attributes.insert(attribute.to_string(), value);
            count += 1;
        }
        if count == 0 {
            return error_reply(format!("no element matches {selection}"));
        }
        ModelReply::with_rows(Vec::<String>::new())
    }
}

fn error_reply(message: impl Into<String>) -> ModelReply {
    let mut reply = ModelReply::default();
    reply
        .extra
        .insert("error".to_string(), Value::String(message.into()));
    reply
}

// =============================================================================
// FakeConnector
// =============================================================================

/// Opens in-memory connections served by a [`FakeModel`] task.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    model: Arc<FakeModel>,
}

#[async_trait]
impl ModelConnector for FakeConnector {
    async fn connect(&self) -> SimResult<DynStream> {
        let (client, server) = tokio::io::duplex(DUPLEX_BUFFER);
        self.model.connections.fetch_add(1, Ordering::SeqCst);

        let model = Arc::clone(&self.model);
        tokio::spawn(async move {
            if let Err(err) = model.serve(server).await {
                debug!(%err, "Fake model connection ended");
            }
        });
        Ok(Box::new(client))
    }

    fn endpoint(&self) -> String {
        "fake://in-process".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> Arc<FakeModel> {
        FakeModel::new(vec![
            FakeElement::new("XC21101", "Kicker", 1.0, 0.0).with_attribute("bl_hkick", 2e-4),
            FakeElement::new("YC21102", "Kicker", 2.0, 0.0),
            FakeElement::new("Q21201", "Quadrupole", 3.0, 0.1),
            FakeElement::new("BX21", "Sbend", 4.0, 2.0),
        ])
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("X*", "XC21101"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("q*1", "Q21201"));
        assert!(!wildcard_match("Y*", "XC21101"));
        assert!(wildcard_match("*2*0*", "Q21201"));
    }

    #[test]
    fn test_show_lattice_selects_by_key_and_name() {
        let model = lattice();
        let reply = model.handle(&ModelRequest::show_lattice("bl_hkick", "Kicker::X*"));
        let rows = reply.rows().unwrap();
        assert_eq!(rows.len(), 1);
        let fields: Vec<&str> = rows[0].split_whitespace().collect();
        assert_eq!(fields, vec!["1", "XC21101", "Kicker", "1.0000", "0", "0.0002"]);
    }

    #[test]
    fn test_set_element_and_field_master() {
        let model = lattice();
        model.handle(&ModelRequest::set_element("Q21201", "b1_gradient", -4.5));
        assert_eq!(model.attribute("Q21201", "b1_gradient"), Some(-4.5));

        model.handle(&ModelRequest::absolute_field_basis());
        assert!(model.field_master("XC21101"));
        assert!(model.field_master("Q21201"));
        assert!(!model.field_master("BX21"));
    }

    #[test]
    fn test_unknown_command_replies_with_error() {
        let model = lattice();
        let reply = model.handle(&ModelRequest::tao("frobnicate"));
        assert!(reply.extra.contains_key("error"));
        assert_eq!(model.requests().len(), 1);
    }
}
