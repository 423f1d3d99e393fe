use std::collections::BTreeMap;

use lectio_store::{LexiconStore, LoadMode, NewEntry, NewLink, SentenceAnnotation};
use lectio_types::{EntryStatus, MorphFeatures, Pos, SyntaxRole};

fn populated_store() -> LexiconStore {
    let mut store = LexiconStore::new();
    let rosa = store.insert_entry(NewEntry {
        lemma: "rosa".into(),
        pos: Pos::Noun,
        gloss: "rose".into(),
        status: EntryStatus::Active,
        declension: Some("1".into()),
        gender: Some("f".into()),
        genitive: Some("rosae".into()),
        ..NewEntry::default()
    });
    store
        .upsert_form(rosa, "rosam", [("Case", "Acc")].into_iter().collect())
        .unwrap();
    let text = store.insert_text("Rosa", "Rosam videō.", 1);
    store
        .replace_links(
            text,
            vec![
                NewLink {
                    sentence: 1,
                    position: 1,
                    surface: "Rosam".into(),
                    features: [("Case", "Acc")].into_iter().collect(),
                    role: SyntaxRole::DirectObject,
                    entry: Some(rosa),
                },
                NewLink {
                    sentence: 1,
                    position: 2,
                    surface: ".".into(),
                    features: MorphFeatures::new(),
                    role: SyntaxRole::Other,
                    entry: None,
                },
            ],
        )
        .unwrap();
    store.upsert_annotation(SentenceAnnotation {
        text,
        sentence: 1,
        tokens: Vec::new(),
        roles: BTreeMap::from([(SyntaxRole::DirectObject, vec![1])]),
        tree: Some("videō\n└─ Rosam".into()),
    });
    store
}

#[test]
fn snapshot_roundtrip_in_both_modes() {
    let store = populated_store();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("lexicon.json");
    store.save(&path).expect("save snapshot");

    for mode in [LoadMode::Mmap, LoadMode::Owned] {
        let loaded = LexiconStore::load(&path, mode).expect("load snapshot");
        assert_eq!(loaded.entry_count(), store.entry_count());
        assert_eq!(loaded.form_count(), store.form_count());
        assert_eq!(loaded.link_count(), store.link_count());
        assert_eq!(loaded.annotation_count(), store.annotation_count());
        assert_eq!(loaded.text_count(), store.text_count());

        // Indices are rebuilt, not persisted: lookups still work.
        let ids = loaded.candidates("rosam", Pos::Noun);
        assert_eq!(ids.len(), 1);
        let entry = loaded.entry(ids[0]).expect("entry live");
        assert_eq!(entry.lemma, "rosa");
        assert_eq!(entry.genitive.as_deref(), Some("rosae"));

        let text = loaded.find_text_by_title("Rosa").expect("text").id;
        let link = loaded.link_at(text, 1, 1).expect("link present");
        assert_eq!(link.surface, "Rosam");
        assert_eq!(loaded.links_for_entry(ids[0]).len(), 1);
        assert!(loaded.annotation(text, 1).expect("annotation").tree.is_some());
    }
}

#[test]
fn ids_keep_advancing_after_reload() {
    let store = populated_store();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("lexicon.json");
    store.save(&path).expect("save snapshot");

    let mut loaded = LexiconStore::load(&path, LoadMode::Owned).expect("load");
    let old_ids: Vec<_> = loaded.iter_entries().map(|e| e.id).collect();
    let fresh = loaded.insert_entry(NewEntry {
        lemma: "aqua".into(),
        pos: Pos::Noun,
        ..NewEntry::default()
    });
    assert!(!old_ids.contains(&fresh));
}
