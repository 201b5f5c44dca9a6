//! Local cursor broadcast and peer cursor painting.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use smol_str::{SmolStr, format_smolstr};
use web_time::Instant;
use weaver_editor_core::{Decoration, DecorationId, EditorHost, Position};

use super::BindingInner;
use crate::presence::{ClientId, CursorPayload, PeerPresence, PresenceChange};

/// Decorations painted for one peer.
pub(super) struct CursorEntry {
    caret: Option<DecorationId>,
    ranges: Vec<DecorationId>,
    payload: CursorPayload,
    anchor: Position,
    head: Position,
    name: SmolStr,
    color: SmolStr,
}

pub(super) type CursorTable = BTreeMap<ClientId, CursorEntry>;

/// A painted peer selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCursor {
    pub client: ClientId,
    pub name: SmolStr,
    pub color: SmolStr,
    pub anchor: Position,
    pub head: Position,
    pub has_caret: bool,
}

/// Decorations for one peer selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionLayout {
    pub ranges: Vec<Decoration>,
    pub caret: Option<Decoration>,
}

/// Lay out a peer selection line by line.
///
/// A first line that starts mid-line is highlighted up to the next line
/// start, lines in between are filled whole, and the rest of the last line is
/// highlighted. When a range selection ends with the head at column 0 the
/// caret is left out, since the whole last line reads as selected.
pub fn layout_remote_selection(
    anchor: Position,
    head: Position,
    name: &str,
    color: &str,
    show_name: bool,
) -> SelectionLayout {
    let (mut from, to) = if head < anchor {
        (head, anchor)
    } else {
        (anchor, head)
    };
    let fill = format_smolstr!("{color}70");
    let mut ranges = Vec::new();

    if anchor != head {
        if from.line != to.line && from.ch != 0 {
            let next = Position::line_start(from.line + 1);
            ranges.push(Decoration::Highlight {
                from,
                to: next,
                color: fill.clone(),
            });
            from = next;
        }
        while from.line != to.line {
            ranges.push(Decoration::LineFill {
                line: from.line,
                color: fill.clone(),
            });
            from = Position::line_start(from.line + 1);
        }
        if from != to {
            ranges.push(Decoration::Highlight {
                from,
                to,
                color: fill,
            });
        }
    }

    let caret = if anchor != head && to == head && head.ch == 0 {
        None
    } else {
        Some(Decoration::Caret {
            at: head,
            name: name.into(),
            color: color.into(),
            show_name,
        })
    };
    SelectionLayout { ranges, caret }
}

impl<H: EditorHost + 'static> BindingInner<H> {
    pub(super) fn on_presence_change(&self, change: &PresenceChange) {
        let own = self.awareness.as_ref().map(|a| a.client_id());
        let clients: BTreeSet<ClientId> = change
            .clients()
            .filter(|client| Some(*client) != own)
            .collect();
        if clients.is_empty() {
            return;
        }
        self.presence_timer
            .borrow_mut()
            .schedule(Instant::now(), |pending| pending.extend(clients));
    }

    pub(super) fn update_remote_selections(&self, clients: BTreeSet<ClientId>) {
        for client in clients {
            self.update_remote_selection(client);
        }
    }

    /// Repaint one peer from its current presence state.
    fn update_remote_selection(&self, client: ClientId) {
        let previous = self.cursors.borrow_mut().remove(&client);
        let (caret, previous_payload) = match previous {
            Some(entry) => {
                for id in entry.ranges {
                    self.host.clear_decoration(id);
                }
                (entry.caret, Some(entry.payload))
            }
            None => (None, None),
        };

        let Some(state) = self.awareness.as_ref().and_then(|a| a.state(client)) else {
            self.release_caret(caret);
            return;
        };
        let peer = PeerPresence::decode(client, &state, &self.config.default_cursor_color);
        let Some(cursor) = peer.cursor else {
            self.release_caret(caret);
            return;
        };

        let resolved = cursor.anchor().zip(cursor.head()).and_then(|(anchor, head)| {
            Some((self.text.resolve(&anchor)?, self.text.resolve(&head)?))
        });
        let Some((anchor, head)) = resolved else {
            tracing::debug!(client, "peer cursor does not resolve in this text");
            self.release_caret(caret);
            return;
        };

        let anchor = self.host.pos_from_index(anchor);
        let head = self.host.pos_from_index(head);
        // A re-sent identical cursor keeps its label hidden.
        let show_name = previous_payload.as_ref() != Some(&cursor);
        let layout = layout_remote_selection(anchor, head, &peer.name, &peer.color, show_name);

        let ranges = layout
            .ranges
            .into_iter()
            .map(|d| self.host.add_decoration(d))
            .collect();
        let caret = match (layout.caret, caret) {
            (Some(decoration), Some(id)) => {
                self.host.update_decoration(id, decoration);
                Some(id)
            }
            (Some(decoration), None) => Some(self.host.add_decoration(decoration)),
            (None, Some(id)) => {
                self.host.clear_decoration(id);
                None
            }
            (None, None) => None,
        };

        self.cursors.borrow_mut().insert(
            client,
            CursorEntry {
                caret,
                ranges,
                payload: cursor,
                anchor,
                head,
                name: peer.name,
                color: peer.color,
            },
        );
    }

    fn release_caret(&self, caret: Option<DecorationId>) {
        if let Some(id) = caret {
            self.host.clear_decoration(id);
        }
    }

    /// Move peer carets whose head shifted under an edit.
    pub(super) fn refresh_remote_carets(&self) {
        let mut moved = Vec::new();
        {
            let mut cursors = self.cursors.borrow_mut();
            for entry in cursors.values_mut() {
                let Some(head) = entry.payload.head().and_then(|h| self.text.resolve(&h)) else {
                    continue;
                };
                let head = self.host.pos_from_index(head);
                if head == entry.head {
                    continue;
                }
                entry.head = head;
                if let Some(id) = entry.caret {
                    moved.push((
                        id,
                        Decoration::Caret {
                            at: head,
                            name: entry.name.clone(),
                            color: entry.color.clone(),
                            show_name: true,
                        },
                    ));
                }
            }
        }
        for (id, caret) in moved {
            self.host.update_decoration(id, caret);
        }
    }

    pub(super) fn clear_remote_cursors(&self) {
        let cursors = std::mem::take(&mut *self.cursors.borrow_mut());
        for entry in cursors.into_values() {
            self.release_caret(entry.caret);
            for id in entry.ranges {
                self.host.clear_decoration(id);
            }
        }
    }

    pub(super) fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.cursors
            .borrow()
            .iter()
            .map(|(client, entry)| RemoteCursor {
                client: *client,
                name: entry.name.clone(),
                color: entry.color.clone(),
                anchor: entry.anchor,
                head: entry.head,
                has_caret: entry.caret.is_some(),
            })
            .collect()
    }

    /// Publish the local selection unless it is unchanged or the editor is
    /// not focused.
    fn broadcast_local_cursor(&self) {
        let Some(awareness) = &self.awareness else {
            return;
        };
        let Some(local) = awareness.local_state() else {
            return;
        };
        if !self.host.has_focus() || !self.host.surface_has_focus() {
            return;
        }

        let selection = self.host.selection();
        let (Some(anchor), Some(head)) = (
            self.text.relative_position(selection.anchor),
            self.text.relative_position(selection.head),
        ) else {
            return;
        };
        let unchanged = local
            .get("cursor")
            .and_then(CursorPayload::from_json)
            .is_some_and(|current| {
                current.anchor().as_ref() == Some(&anchor) && current.head().as_ref() == Some(&head)
            });
        if unchanged {
            tracing::trace!("local cursor unchanged, not broadcasting");
            return;
        }
        awareness.set_local_state_field("cursor", CursorPayload::new(&anchor, &head).to_json());
    }

    pub(super) fn clear_local_cursor(&self) {
        if let Some(awareness) = &self.awareness {
            awareness.set_local_state_field("cursor", Value::Null);
        }
    }

    pub(super) fn schedule_settle(&self) {
        self.settle_timer
            .borrow_mut()
            .schedule(Instant::now(), |_| {});
    }

    pub(super) fn emit_cursor_activity(&self) {
        self.broadcast_local_cursor();
        let selection = self.host.selection();
        let listeners: Vec<_> = self
            .activity_listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(selection);
        }
    }
}
