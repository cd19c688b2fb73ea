//! Full-pipeline tests: marker text in, edits through the arena,
//! patches and marker text out.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::Value;

use scriptorium_editor::{
    BookStore, Document, EditorError, EditorState, MemoryStore, NodeBody, NodeKey, NodeKind,
    OperationError, OperationType, PerfNode, SchemaValidator, SourceContext, UpdateTag,
    ValidationError, ValidationReport, DEFAULT_MERGE_DELAY,
};

fn context() -> SourceContext {
    SourceContext::new("local", "local", "en", "test")
}

fn open(source: &str, now: Instant) -> Document {
    Document::from_marker_text("TIT", source, &context(), DEFAULT_MERGE_DELAY, now).unwrap()
}

fn no_tags() -> HashSet<UpdateTag> {
    HashSet::new()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn paragraph_key(state: &EditorState) -> NodeKey {
    state
        .document_order()
        .into_iter()
        .find(|key| {
            matches!(
                state.node(key).map(|r| &r.body),
                Some(NodeBody::Element { tag, .. }) if tag == "p"
            )
        })
        .expect("no paragraph")
}

fn verse_numbers(state: &EditorState) -> Vec<String> {
    state
        .document_order()
        .into_iter()
        .filter_map(|key| match state.node(&key).map(|r| &r.body) {
            Some(NodeBody::Verse { number }) => Some(number.clone()),
            _ => None,
        })
        .collect()
}

struct RejectingValidator;

impl SchemaValidator for RejectingValidator {
    fn validate(&self, _: &str, _: &str, _: &str, _: &Value) -> ValidationReport {
        ValidationReport {
            errors: vec![ValidationError {
                path: "/sequences".to_string(),
                message: "rejected by test validator".to_string(),
            }],
        }
    }
}

#[test]
fn test_marker_text_round_trip_through_document() {
    let source = "\\id TIT Titus\n\\c 1\n\\p\n\\v 1 Paul, a servant of God\\f + \\fr 1:1 \\ft a note\\f*\n\\v 2 in hope of eternal life";
    let doc = open(source, Instant::now());

    let exported = doc.export_marker_text().unwrap();
    assert_eq!(normalize(source), normalize(&exported));
}

#[test]
fn test_text_edit_survives_export() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 1 in the beginning", t0);

    let state = doc.editor().state().clone();
    let key = state
        .document_order()
        .into_iter()
        .find(|key| {
            matches!(
                state.node(key).map(|r| &r.body),
                Some(NodeBody::TextRun { .. })
            )
        })
        .unwrap();

    doc.update(no_tags(), t0, |tx| tx.set_text(&key, "in the end"))
        .unwrap();

    let exported = doc.export_marker_text().unwrap();
    assert!(exported.contains("in the end"));
    assert!(!exported.contains("beginning"));
}

#[test]
fn test_verse_insert_triggers_renumbering() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 5 five\n\\v 6 six\n\\v 7 seven", t0);
    doc.editor_mut().register_verse_renumbering().unwrap();

    let para = paragraph_key(doc.editor().state());
    doc.update(no_tags(), t0, |tx| {
        tx.insert_node(
            &para,
            0,
            NodeBody::Verse {
                number: "5".to_string(),
            },
        )?;
        Ok(())
    })
    .unwrap();

    assert_eq!(verse_numbers(doc.editor().state()), vec!["5", "6", "7", "8"]);

    // Renumbering merged into the insert's entry: one undo reverts both.
    assert!(doc.editor_mut().undo(t0 + Duration::from_secs(1)));
    assert_eq!(verse_numbers(doc.editor().state()), vec!["5", "6", "7"]);
}

#[test]
fn test_verse_insert_before_range() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 5a-6b joined", t0);
    doc.editor_mut().register_verse_renumbering().unwrap();

    let para = paragraph_key(doc.editor().state());
    doc.update(no_tags(), t0, |tx| {
        tx.insert_node(
            &para,
            0,
            NodeBody::Verse {
                number: "5".to_string(),
            },
        )?;
        Ok(())
    })
    .unwrap();

    assert_eq!(verse_numbers(doc.editor().state()), vec!["5", "6a-7b"]);
}

#[test]
fn test_verse_insert_with_gap_early_exits() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 10 ten\n\\v 20 twenty", t0);
    doc.editor_mut().register_verse_renumbering().unwrap();

    let para = paragraph_key(doc.editor().state());
    doc.update(no_tags(), t0, |tx| {
        // Insert after verse 10 (children: [v10, text, v20, text]).
        tx.insert_node(
            &para,
            2,
            NodeBody::Verse {
                number: "10".to_string(),
            },
        )?;
        Ok(())
    })
    .unwrap();

    assert_eq!(verse_numbers(doc.editor().state()), vec!["10", "10", "20"]);
}

#[test]
fn test_renumbering_requires_registered_verse_kind() {
    let t0 = Instant::now();
    let source = "\\p\n\\v 1 words";
    let table = scriptorium_parser::MarkerTable::standard().unwrap();
    let perf = scriptorium_parser::to_perf(source, &context(), &table).unwrap();
    let tree = scriptorium_converter::perf_to_document(&perf, &table).unwrap();
    let mut ids = scriptorium_parser::id_generator::IdGenerator::new("TIT");
    let state = scriptorium_editor::EditorState::from_doc_tree(&tree, &mut ids);

    let kinds: HashSet<NodeKind> = [NodeKind::Element, NodeKind::TextRun].into_iter().collect();
    let mut editor = scriptorium_editor::Editor::with_node_kinds(
        "TIT",
        state,
        ids,
        DEFAULT_MERGE_DELAY,
        t0,
        kinds,
    );

    let err = editor.register_verse_renumbering().unwrap_err();
    assert!(matches!(err, EditorError::NodeKindNotRegistered("verse")));
}

#[test]
fn test_block_insert_emits_validated_add_operation() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 1 words", t0);

    let fragment = scriptorium_converter::node_from_marker_text(
        "\\v 2 more words",
        scriptorium_converter::FragmentKind::Block,
        doc.marker_table(),
    )
    .unwrap();

    let root = doc.editor().state().root().clone();
    let outcome = doc
        .update(no_tags(), t0, |tx| {
            tx.insert_subtree(&root, 1, &fragment)?;
            Ok(())
        })
        .unwrap();

    let add = outcome
        .operations
        .iter()
        .find(|op| op.op == OperationType::Add)
        .expect("no add operation emitted");
    assert!(matches!(add.value, Some(PerfNode::Block(_))));
    assert_eq!(outcome.skipped_moves, 0);
}

#[test]
fn test_block_remove_emits_remove_operation() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 1 one\n\\m\n\\v 2 two", t0);

    let state = doc.editor().state().clone();
    let second_block = state
        .node(state.root())
        .unwrap()
        .children
        .get(1)
        .cloned()
        .unwrap();

    let outcome = doc
        .update(no_tags(), t0, |tx| tx.remove_node(&second_block))
        .unwrap();

    let remove = outcome
        .operations
        .iter()
        .find(|op| op.op == OperationType::Remove)
        .expect("no remove operation emitted");
    assert!(remove.value.is_none());
}

#[test]
fn test_move_is_skipped_and_emits_nothing() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 1 one\n\\m\n\\v 2 two", t0);

    let state = doc.editor().state().clone();
    let root = state.root().clone();
    let first_block = state.node(&root).unwrap().children[0].clone();

    let outcome = doc
        .update(no_tags(), t0, |tx| tx.move_node(&first_block, &root, 1))
        .unwrap();

    assert_eq!(outcome.skipped_moves, 1);
    assert!(outcome
        .operations
        .iter()
        .all(|op| op.op != OperationType::Add && op.op != OperationType::Remove));
}

#[test]
fn test_validation_failure_blocks_patch_but_not_the_edit() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 1 words", t0);
    doc.set_validator(Box::new(RejectingValidator));

    let fragment = scriptorium_converter::node_from_marker_text(
        "\\v 2 rejected",
        scriptorium_converter::FragmentKind::Block,
        doc.marker_table(),
    )
    .unwrap();

    let root = doc.editor().state().root().clone();
    let err = doc
        .update(no_tags(), t0, |tx| {
            tx.insert_subtree(&root, 1, &fragment)?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        EditorError::Operation(OperationError::ValidationFailed { .. })
    ));

    // The editor state itself committed; only the patch was blocked.
    assert_eq!(
        doc.editor().state().node(&root).unwrap().children.len(),
        2
    );
}

#[test]
fn test_store_round_trip() {
    let t0 = Instant::now();
    let doc = open("\\id TIT\n\\c 1\n\\p\n\\v 1 words", t0);

    let mut store = MemoryStore::new();
    doc.save_to(&mut store).unwrap();

    let reopened = Document::read_from(&store, "TIT", DEFAULT_MERGE_DELAY, t0).unwrap();
    assert_eq!(
        normalize(&doc.export_marker_text().unwrap()),
        normalize(&reopened.export_marker_text().unwrap())
    );
}

#[test]
fn test_failed_transaction_leaves_state_untouched() {
    let t0 = Instant::now();
    let mut doc = open("\\p\n\\v 1 words", t0);
    let before = doc.editor().state().clone();

    let err = doc
        .update(no_tags(), t0, |tx| {
            let root = tx.state().root().clone();
            tx.set_text(&root, "not a text node")
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::NotText(_)));

    // Nothing committed, nothing recorded.
    assert_eq!(**doc.editor().state(), *before);
    assert_eq!(doc.editor().undo_depth(), 0);
    assert_eq!(doc.version, 0);
}
