//! Presence tracking for collaborative editing sessions.
//!
//! `Awareness` holds one ephemeral JSON state per client (user info, cursor)
//! and reports which clients were added, updated or removed whenever a state
//! actually changes. The transport carrying updates between replicas is not
//! part of this crate: it moves the bytes from [`Awareness::encode_update`]
//! to [`Awareness::apply_update`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;
use weaver_editor_core::ListenerId;

use crate::CrdtError;
use crate::position::RelativePosition;

/// Replica identifier, the Loro peer id.
pub type ClientId = u64;

/// Caret color for peers that do not advertise one.
pub const DEFAULT_CURSOR_COLOR: &str = "#ffa500";

/// Predefined collaborator colours (pastel-ish for readability).
const COLLABORATOR_COLORS: [u32; 8] = [
    0xFF6B6BFF, // Red
    0x4ECDC4FF, // Teal
    0xFFE66DFF, // Yellow
    0x95E1D3FF, // Mint
    0xF38181FF, // Coral
    0xAA96DAFF, // Purple
    0xFCBF49FF, // Orange
    0x2EC4B6FF, // Cyan
];

/// Palette colour for a client, as a CSS hex string.
pub fn collaborator_color(client: ClientId) -> SmolStr {
    let rgba = COLLABORATOR_COLORS[(client % COLLABORATOR_COLORS.len() as u64) as usize];
    smol_str::format_smolstr!("#{:06x}", rgba >> 8)
}

/// Clients whose state changed in one step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceChange {
    pub added: Vec<ClientId>,
    pub updated: Vec<ClientId>,
    pub removed: Vec<ClientId>,
}

impl PresenceChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Every affected client.
    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .copied()
    }

    fn record(&mut self, client: ClientId, before: Option<&Value>, after: Option<&Value>) {
        match (before, after) {
            (None, Some(_)) => self.added.push(client),
            (Some(_), None) => self.removed.push(client),
            (Some(a), Some(b)) if a != b => self.updated.push(client),
            _ => {}
        }
    }
}

pub type PresenceListener = Rc<dyn Fn(&PresenceChange)>;

#[derive(Debug, Default)]
struct ClientEntry {
    clock: u64,
    state: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    client: ClientId,
    clock: u64,
    state: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct WireUpdate {
    entries: Vec<WireEntry>,
}

struct AwarenessInner {
    client_id: ClientId,
    entries: RefCell<HashMap<ClientId, ClientEntry>>,
    listeners: RefCell<Vec<(ListenerId, PresenceListener)>>,
    next_listener: Cell<u64>,
}

/// Shared handle to the presence state of all known clients.
#[derive(Clone)]
pub struct Awareness {
    inner: Rc<AwarenessInner>,
}

impl Awareness {
    /// Start with an empty object as the local state.
    pub fn new(client_id: ClientId) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            client_id,
            ClientEntry {
                clock: 0,
                state: Some(Value::Object(Map::new())),
            },
        );
        Self {
            inner: Rc::new(AwarenessInner {
                client_id,
                entries: RefCell::new(entries),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    pub fn local_state(&self) -> Option<Value> {
        self.state(self.inner.client_id)
    }

    /// Replace the local state. `None` marks this client as gone.
    pub fn set_local_state(&self, state: Option<Value>) {
        let mut change = PresenceChange::default();
        {
            let mut entries = self.inner.entries.borrow_mut();
            let entry = entries.entry(self.inner.client_id).or_default();
            entry.clock += 1;
            change.record(self.inner.client_id, entry.state.as_ref(), state.as_ref());
            entry.state = state;
        }
        self.emit(&change);
    }

    /// Set one field of the local state. Does nothing once the local state is gone.
    pub fn set_local_state_field(&self, field: &str, value: Value) {
        let Some(mut state) = self.local_state() else {
            return;
        };
        match &mut state {
            Value::Object(map) => {
                map.insert(field.to_string(), value);
            }
            other => {
                let mut map = Map::new();
                map.insert(field.to_string(), value);
                *other = Value::Object(map);
            }
        }
        self.set_local_state(Some(state));
    }

    pub fn state(&self, client: ClientId) -> Option<Value> {
        self.inner
            .entries
            .borrow()
            .get(&client)
            .and_then(|e| e.state.clone())
    }

    /// States of every client currently present.
    pub fn states(&self) -> BTreeMap<ClientId, Value> {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter_map(|(id, e)| e.state.clone().map(|s| (*id, s)))
            .collect()
    }

    /// Record a peer's state as delivered by the transport.
    pub fn apply_remote_state(&self, client: ClientId, state: Option<Value>) {
        let mut change = PresenceChange::default();
        {
            let mut entries = self.inner.entries.borrow_mut();
            let entry = entries.entry(client).or_default();
            entry.clock += 1;
            change.record(client, entry.state.as_ref(), state.as_ref());
            entry.state = state;
        }
        self.emit(&change);
    }

    /// Forget a peer, e.g. after its connection timed out.
    pub fn remove_client(&self, client: ClientId) {
        self.apply_remote_state(client, None);
    }

    /// Serialize the given clients' states with their clocks.
    pub fn encode_update(&self, clients: &[ClientId]) -> Result<Vec<u8>, CrdtError> {
        let entries = self.inner.entries.borrow();
        let update = WireUpdate {
            entries: clients
                .iter()
                .filter_map(|client| {
                    entries.get(client).map(|e| WireEntry {
                        client: *client,
                        clock: e.clock,
                        state: e.state.clone(),
                    })
                })
                .collect(),
        };
        Ok(serde_json::to_vec(&update)?)
    }

    /// Merge an encoded update. Entries older than what we hold are ignored,
    /// and our own entry is never overwritten.
    pub fn apply_update(&self, bytes: &[u8]) -> Result<PresenceChange, CrdtError> {
        let update: WireUpdate =
            serde_json::from_slice(bytes).map_err(|e| CrdtError::Presence(e.to_string()))?;
        let mut change = PresenceChange::default();
        {
            let mut entries = self.inner.entries.borrow_mut();
            for wire in update.entries {
                if wire.client == self.inner.client_id {
                    continue;
                }
                let entry = entries.entry(wire.client).or_default();
                let newer = entry.clock < wire.clock
                    || (entry.clock == wire.clock && wire.state.is_none() && entry.state.is_some());
                if !newer {
                    continue;
                }
                change.record(wire.client, entry.state.as_ref(), wire.state.as_ref());
                entry.clock = wire.clock;
                entry.state = wire.state;
            }
        }
        self.emit(&change);
        Ok(change)
    }

    pub fn on_change(&self, listener: PresenceListener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    pub fn off_change(&self, id: ListenerId) {
        self.inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    fn emit(&self, change: &PresenceChange) {
        if change.is_empty() {
            return;
        }
        let listeners: Vec<PresenceListener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(change);
        }
    }
}

/// Display info this replica advertises under the `user` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub name: SmolStr,
    pub color: SmolStr,
}

impl LocalUser {
    /// User with the palette colour for `client`.
    pub fn for_client(client: ClientId, name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            color: collaborator_color(client),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({ "name": self.name.as_str(), "color": self.color.as_str() })
    }
}

/// Anchor and head of a client's selection, as relative-position JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorPayload {
    pub anchor: Value,
    pub head: Value,
}

impl CursorPayload {
    pub fn new(anchor: &RelativePosition, head: &RelativePosition) -> Self {
        Self {
            anchor: anchor.to_json(),
            head: head.to_json(),
        }
    }

    /// `None` for null, non-objects, or objects missing either end.
    pub fn from_json(value: &Value) -> Option<Self> {
        let anchor = value.get("anchor").filter(|v| !v.is_null())?;
        let head = value.get("head").filter(|v| !v.is_null())?;
        Some(Self {
            anchor: anchor.clone(),
            head: head.clone(),
        })
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({ "anchor": self.anchor, "head": self.head })
    }

    pub fn anchor(&self) -> Option<RelativePosition> {
        RelativePosition::from_json(&self.anchor)
    }

    pub fn head(&self) -> Option<RelativePosition> {
        RelativePosition::from_json(&self.head)
    }
}

/// A peer's presence, decoded from untrusted JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerPresence {
    pub client: ClientId,
    pub name: SmolStr,
    pub color: SmolStr,
    pub cursor: Option<CursorPayload>,
}

impl PeerPresence {
    /// Decode with fallbacks: missing name becomes `User: <id>`, missing
    /// colour becomes `default_color`, and an incomplete cursor is no cursor.
    pub fn decode(client: ClientId, state: &Value, default_color: &str) -> Self {
        let user = state.get("user");
        let field = |key: &str| user.and_then(|u| u.get(key)).and_then(Value::as_str);
        Self {
            client,
            name: field("name")
                .map(SmolStr::new)
                .unwrap_or_else(|| smol_str::format_smolstr!("User: {client}")),
            color: field("color")
                .map(SmolStr::new)
                .unwrap_or_else(|| SmolStr::new(default_color)),
            cursor: state.get("cursor").and_then(CursorPayload::from_json),
        }
    }
}
