//! Randomised editing across bound replicas.
//!
//! Every replica edits through its own `HeadlessEditor`; after each step the
//! buffer must mirror its shared text, and after a full sync all buffers must
//! agree.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use weaver_editor_core::{EditOrigin, EditorHost, HeadlessEditor};
use weaver_editor_crdt::{BindingOptions, CollabBinding, LoroDoc, Origin, SharedText};

const ALPHABET: &[&str] = &["a", "b", "z", " ", "\n", "é", "中", "xy", "\r\n"];

struct Replica {
    text: SharedText,
    host: Rc<HeadlessEditor>,
    _binding: CollabBinding<HeadlessEditor>,
}

impl Replica {
    fn new(text: SharedText) -> Self {
        let host = Rc::new(HeadlessEditor::default());
        let binding =
            CollabBinding::new(text.clone(), host.clone(), None, BindingOptions::default());
        Self {
            text,
            host,
            _binding: binding,
        }
    }

    fn assert_mirrored(&self) {
        assert_eq!(self.host.value(), self.text.to_string());
    }
}

fn replicas(count: usize, seed_text: &str) -> Vec<Replica> {
    let origin = SharedText::new(LoroDoc::new(), "content");
    origin
        .transact(&Origin::new("setup"), |txn| txn.insert(0, seed_text))
        .unwrap();
    let snapshot = origin.export_snapshot().unwrap();
    (0..count)
        .map(|_| Replica::new(SharedText::from_snapshot(&snapshot, "content").unwrap()))
        .collect()
}

fn sync(a: &SharedText, b: &SharedText) {
    if let Some(updates) = a.export_updates_since(&b.version()).unwrap() {
        b.import(&updates).unwrap();
    }
    if let Some(updates) = b.export_updates_since(&a.version()).unwrap() {
        a.import(&updates).unwrap();
    }
}

fn sync_all(replicas: &[Replica]) {
    for i in 0..replicas.len() {
        for j in (i + 1)..replicas.len() {
            sync(&replicas[i].text, &replicas[j].text);
        }
    }
    for i in 0..replicas.len() {
        for j in (i + 1)..replicas.len() {
            sync(&replicas[i].text, &replicas[j].text);
        }
    }
}

fn random_text(rng: &mut StdRng) -> String {
    let pieces = rng.random_range(1..4);
    (0..pieces)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
        .collect()
}

fn random_edit(rng: &mut StdRng, host: &HeadlessEditor) {
    let len = host.len_chars();
    match rng.random_range(0..5) {
        0 | 1 => {
            let at = rng.random_range(0..=len);
            host.insert_at(at, &random_text(rng));
        }
        2 => {
            let start = rng.random_range(0..=len);
            let end = rng.random_range(start..=len.min(start + 4));
            host.delete_range(start, end);
        }
        3 => {
            let anchor = rng.random_range(0..=len);
            let head = rng.random_range(0..=len);
            host.set_selection_indices(anchor, head);
            if rng.random_bool(0.3) {
                host.paste(&random_text(rng));
            } else {
                host.replace_selection(&random_text(rng));
            }
        }
        _ => {
            // Two edits in one operation reach the binding as one batch.
            host.operation(|| {
                let len = host.len_chars();
                let first = rng.random_range(0..=len);
                let from = host.pos_from_index(first);
                host.replace_range(&random_text(rng), from, from, EditOrigin::User);
                let len = host.len_chars();
                let start = rng.random_range(0..=len);
                let end = rng.random_range(start..=len.min(start + 3));
                host.replace_range(
                    "",
                    host.pos_from_index(start),
                    host.pos_from_index(end),
                    EditOrigin::User,
                );
            });
        }
    }
}

fn run(seed: u64, peers: usize, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let replicas = replicas(peers, "the quick\nbrown fox");

    for _ in 0..steps {
        let who = rng.random_range(0..peers);
        random_edit(&mut rng, &replicas[who].host);
        replicas[who].assert_mirrored();

        if rng.random_bool(0.25) {
            let a = rng.random_range(0..peers);
            let b = rng.random_range(0..peers);
            if a != b {
                sync(&replicas[a].text, &replicas[b].text);
                replicas[a].assert_mirrored();
                replicas[b].assert_mirrored();
            }
        }
    }

    sync_all(&replicas);
    let expected = replicas[0].text.to_string();
    for replica in &replicas {
        replica.assert_mirrored();
        assert_eq!(replica.host.value(), expected, "seed {seed}");
    }
}

#[test]
fn test_two_peers_converge() {
    for seed in 0..8 {
        run(seed, 2, 120);
    }
}

#[test]
fn test_three_peers_converge() {
    for seed in 100..104 {
        run(seed, 3, 200);
    }
}
