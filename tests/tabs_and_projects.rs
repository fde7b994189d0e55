//! Tab set, save and project persistence tests
//!
//! These exercise the document side end to end: tabs backed by real files,
//! guarded saves, crash-recovery snapshots and project sidecars.

use std::fs;
use std::io;
use std::path::PathBuf;

use chix::core::autosave::AutosaveStore;
use chix::core::document::Document;
use chix::core::error::FileError;
use chix::core::project::{ProjectManager, load_config};
use chix::core::save;
use chix::core::settings::{EditorSettings, ThemeMode};
use chix::core::tabs::{NoPrompt, TabSet};
use tempfile::TempDir;

fn tabs(dir: &TempDir) -> TabSet {
    TabSet::new(AutosaveStore::new(dir.path().join("autosave")))
}

fn assert_invariants(tabs: &TabSet) {
    assert!(!tabs.is_empty(), "tab set must never be empty");
    assert!(tabs.contains(tabs.active_id()), "active tab must exist");
    assert_eq!(tabs.ids().len(), tabs.len());
}

// =============================================================================
// TABS
// =============================================================================

#[test]
fn tab_set_survives_mixed_operations() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabs = tabs(&dir);
    let file = dir.path().join("a.c");
    fs::write(&file, "int a;\n").unwrap();

    for round in 0..50 {
        match round % 7 {
            0 => {
                tabs.create_tab(None, None);
            }
            1 => {
                tabs.open_file(&file);
            }
            2 => {
                tabs.close_tab(tabs.active_id());
            }
            3 => {
                tabs.next_tab();
            }
            4 => {
                tabs.create_tab(None, Some("scratch"));
            }
            5 => {
                let first = tabs.ids()[0];
                tabs.close_other_tabs(first);
            }
            _ => tabs.close_all_tabs(),
        }
        assert_invariants(&tabs);
    }
}

#[test]
fn opening_the_same_file_twice_reuses_the_tab() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabs = tabs(&dir);
    let file = dir.path().join("main.c");
    fs::write(&file, "int main(void){return 0;}\n").unwrap();

    let first = tabs.open_file(&file);
    tabs.create_tab(None, None);
    let again = tabs.open_file(&file);
    assert_eq!(first, again);
    assert_eq!(tabs.active_id(), first);
    assert_eq!(tabs.len(), 3);
}

#[test]
fn save_then_reload_round_trips_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabs = tabs(&dir);
    let target = dir.path().join("out.c");

    let id = tabs.active_id();
    tabs.active_mut().append("#include <stdio.h>\nint main(void){return 0;}\n");
    assert!(tabs.is_modified(id));

    let mut prompt = |_: &Document| Some(target.clone());
    assert!(tabs.save_tab(id, &mut prompt).unwrap());
    assert!(!tabs.is_modified(id));

    let reloaded = Document::load(tabs.active_id(), &target);
    assert_eq!(reloaded.text(), tabs.active().text());
}

#[test]
fn cancelled_prompt_keeps_tab_modified() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabs = tabs(&dir);
    let id = tabs.active_id();
    tabs.active_mut().append("x");
    assert!(!tabs.save_tab(id, &mut NoPrompt).unwrap());
    assert!(tabs.is_modified(id));
    assert!(tabs.has_unsaved_changes());
}

#[test]
fn failed_save_keeps_tab_modified() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabs = tabs(&dir);
    let file = dir.path().join("moved.c");
    fs::write(&file, "int a;\n").unwrap();

    let id = tabs.open_file(&file);
    tabs.active_mut().append("int b;\n");

    // The file was replaced by a directory behind the editor's back
    fs::remove_file(&file).unwrap();
    fs::create_dir(&file).unwrap();
    fs::write(file.join("inside.txt"), "keep").unwrap();

    let err = tabs.save_tab(id, &mut NoPrompt).unwrap_err();
    assert!(matches!(err, FileError::Write { .. }), "{:?}", err);
    assert!(tabs.is_modified(id));
    assert_eq!(tabs.get(id).unwrap().path.as_deref(), Some(file.as_path()));
    assert_eq!(fs::read_to_string(file.join("inside.txt")).unwrap(), "keep");
}

#[test]
fn failed_save_as_keeps_untitled_tab() {
    let dir = tempfile::tempdir().unwrap();
    let mut tabs = tabs(&dir);
    let id = tabs.active_id();
    tabs.active_mut().append("int c;\n");

    let target = dir.path().join("taken");
    fs::create_dir(&target).unwrap();
    let mut prompt = |_: &Document| Some(target.clone());
    assert!(tabs.save_tab_as(id, &mut prompt).is_err());

    assert!(tabs.is_modified(id));
    assert!(tabs.get(id).unwrap().path.is_none());
    assert!(target.is_dir());
}

// =============================================================================
// GUARDED SAVE
// =============================================================================

#[test]
fn failed_write_leaves_original_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.c");
    let original = b"/* original */\nint keep;\n";
    fs::write(&path, original).unwrap();

    let err = save::write_guarded(&path, |file| {
        use std::io::Write;
        file.write_all(b"/* half")?;
        Err(io::Error::other("disk full"))
    })
    .unwrap_err();

    assert!(matches!(err, FileError::Write { .. }));
    assert_eq!(fs::read(&path).unwrap(), original);

    // No backup copy left next to the file
    let leftovers: Vec<PathBuf> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p != &path)
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

// =============================================================================
// CRASH RECOVERY
// =============================================================================

#[test]
fn autosave_snapshot_can_be_recovered_by_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut session = tabs(&dir);
        session.active_mut().append("unsaved work");
        assert_eq!(session.autosave_all(), 1);
        // Session ends without saving or closing its tabs
    }

    let mut next = tabs(&dir);
    let snapshots = next.store().recoverable();
    assert_eq!(snapshots.len(), 1);

    let id = next.restore_snapshot(&snapshots[0]).unwrap();
    assert_eq!(next.get(id).unwrap().text(), "unsaved work");
    assert!(next.is_modified(id));
}

// =============================================================================
// PROJECTS
// =============================================================================

#[test]
fn project_state_is_restored_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("demo");

    let mut settings = EditorSettings::default();
    let mut tabs = tabs(&dir);
    let mut projects = ProjectManager::new();
    projects.create_project(&root, None, &settings).unwrap();
    assert!(root.join("src").join("main.c").is_file());
    assert!(root.join("Makefile").is_file());

    let main_c = root.join("src").join("main.c");
    tabs.open_file(&main_c);
    settings.theme_mode = ThemeMode::Light;
    settings.tab_size = 2;
    projects.close_project(&settings, &tabs);
    assert!(projects.current_root().is_none());

    let stored = load_config(&root).unwrap().unwrap();
    assert_eq!(stored.recent_files[0], PathBuf::from("src").join("main.c"));

    let mut fresh_settings = EditorSettings::default();
    let mut fresh_tabs = tabs_in(&dir, "autosave2");
    let mut reopened = ProjectManager::new();
    let opened = reopened
        .open_project(&root, &mut fresh_settings, &mut fresh_tabs)
        .unwrap();

    assert_eq!(fresh_settings.theme_mode, ThemeMode::Light);
    assert_eq!(fresh_settings.tab_size, 2);
    let id = opened.expect("most recent file reopened");
    assert_eq!(fresh_tabs.get(id).unwrap().path.as_deref(), Some(main_c.as_path()));
    assert_eq!(reopened.name(), Some("demo"));
}

#[test]
fn create_project_refuses_non_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("existing.txt"), "x").unwrap();
    let mut projects = ProjectManager::new();
    assert!(
        projects
            .create_project(dir.path(), None, &EditorSettings::default())
            .is_err()
    );
    assert!(projects.current_root().is_none());
}

fn tabs_in(dir: &TempDir, name: &str) -> TabSet {
    TabSet::new(AutosaveStore::new(dir.path().join(name)))
}
