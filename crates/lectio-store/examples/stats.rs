use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lectio_store::{LexiconStore, LoadMode};
use lectio_types::EntryStatus;

fn main() -> Result<()> {
    let snapshot = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cargo run -p lectio-store --example stats -- <snapshot.json>")?;

    let store = LexiconStore::load(&snapshot, LoadMode::Mmap)
        .with_context(|| format!("loading snapshot from {}", snapshot.display()))?;

    let mut provisional = 0usize;
    let mut glossless = 0usize;
    for entry in store.iter_entries() {
        if entry.status == EntryStatus::Provisional {
            provisional += 1;
        }
        if !entry.has_gloss() {
            glossless += 1;
        }
    }
    let word_links = store.iter_links().filter(|l| l.is_word()).count();

    println!("Snapshot: {}", snapshot.display());
    println!("Texts        : {}", store.text_count());
    println!("Entries      : {}", store.entry_count());
    println!("  provisional: {provisional}");
    println!("  no gloss   : {glossless}");
    println!("Forms        : {}", store.form_count());
    println!("Links        : {}", store.link_count());
    println!("  word links : {word_links}");
    println!("Annotations  : {}", store.annotation_count());

    Ok(())
}
