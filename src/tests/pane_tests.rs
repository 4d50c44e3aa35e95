#[cfg(test)]
mod tests {
    use crate::errors::EngineError;
    use crate::models::*;
    use crate::services::*;
    use std::sync::Arc;

    const RATIO: u8 = DEFAULT_SPLIT_RATIO;

    fn resources(state: &PaneLayoutState, pane_id: &PaneId) -> Vec<String> {
        state
            .pane(pane_id)
            .expect("pane exists")
            .tabs
            .iter()
            .map(|tab| tab.resource.clone())
            .collect()
    }

    /// One pane holding the given resources, the last one active.
    fn pane_with(names: &[&str]) -> (PaneLayoutState, PaneId) {
        let mut state = PaneLayoutState::default();
        let mut pane_id = None;
        for name in names {
            let opened = state.open_tab(name, None, RATIO).expect("open succeeds");
            pane_id = Some(opened.pane_id);
        }
        (state, pane_id.expect("at least one resource"))
    }

    fn tab_id(state: &PaneLayoutState, pane_id: &PaneId, resource: &str) -> TabId {
        state
            .pane(pane_id)
            .and_then(|pane| pane.tab_for_resource(resource))
            .map(|tab| tab.id.clone())
            .expect("tab exists")
    }

    #[test]
    fn test_open_tab_creates_first_pane() {
        let mut state = PaneLayoutState::default();
        let opened = state.open_tab("a.md", None, RATIO).expect("open succeeds");

        assert!(opened.created_pane);
        assert!(opened.created_tab);
        assert_eq!(state.layout, Some(LayoutTree::leaf(opened.pane_id.clone())));
        assert_eq!(state.active_pane_id, Some(opened.pane_id.clone()));
        assert_eq!(resources(&state, &opened.pane_id), vec!["a.md"]);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_open_tab_reuses_existing_tab_for_resource() {
        let (mut state, pane_id) = pane_with(&["a.md", "b.md"]);
        let first = tab_id(&state, &pane_id, "a.md");

        let opened = state.open_tab("a.md", None, RATIO).expect("open succeeds");
        assert!(!opened.created_tab);
        assert_eq!(opened.tab_id, first);
        assert_eq!(resources(&state, &pane_id), vec!["a.md", "b.md"]);
        assert_eq!(state.pane(&pane_id).unwrap().active_tab_id, first);
    }

    #[test]
    fn test_open_tab_in_unknown_pane_appends_new_pane() {
        let (mut state, first) = pane_with(&["a.md"]);
        let opened = state
            .open_tab("b.md", Some(&PaneId::from("gone")), RATIO)
            .expect("open succeeds");

        assert!(opened.created_pane);
        assert_eq!(state.pane_order(), vec![first, opened.pane_id.clone()]);
        assert_eq!(state.active_pane_id, Some(opened.pane_id));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_close_active_middle_tab_activates_right_neighbour() {
        let (mut state, pane_id) = pane_with(&["a.md", "b.md", "c.md"]);
        let b = tab_id(&state, &pane_id, "b.md");
        let c = tab_id(&state, &pane_id, "c.md");
        state.activate_tab(&pane_id, &b).expect("b exists");

        let closed = state.close_tab(&pane_id, &b).expect("close succeeds");
        assert_eq!(closed.index, 1);
        assert!(!closed.pane_destroyed);
        assert_eq!(state.pane(&pane_id).unwrap().active_tab_id, c);
        assert_eq!(resources(&state, &pane_id), vec!["a.md", "c.md"]);
    }

    #[test]
    fn test_close_active_last_tab_activates_new_last() {
        let (mut state, pane_id) = pane_with(&["a.md", "b.md", "c.md"]);
        let b = tab_id(&state, &pane_id, "b.md");
        let c = tab_id(&state, &pane_id, "c.md");

        state.close_tab(&pane_id, &c).expect("close succeeds");
        assert_eq!(state.pane(&pane_id).unwrap().active_tab_id, b);
    }

    #[test]
    fn test_close_inactive_tab_keeps_active() {
        let (mut state, pane_id) = pane_with(&["a.md", "b.md", "c.md"]);
        let a = tab_id(&state, &pane_id, "a.md");
        let c = tab_id(&state, &pane_id, "c.md");

        state.close_tab(&pane_id, &a).expect("close succeeds");
        assert_eq!(state.pane(&pane_id).unwrap().active_tab_id, c);
    }

    #[test]
    fn test_close_unknown_tab_is_noop() {
        let (mut state, pane_id) = pane_with(&["a.md"]);
        let before = state.clone();
        assert!(state.close_tab(&pane_id, &TabId::from("nope")).is_none());
        assert!(state.close_tab(&PaneId::from("nope"), &TabId::from("nope")).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn test_split_then_close_collapses_layout() {
        let (mut state, p1) = pane_with(&["a.md"]);
        let p2 = state
            .split_pane(&p1, SplitDirection::Row, RATIO)
            .expect("split succeeds");

        assert_eq!(
            state.layout,
            Some(LayoutTree::branch(
                SplitDirection::Row,
                LayoutTree::leaf(p1.clone()),
                LayoutTree::leaf(p2.clone()),
                50
            ))
        );
        assert_eq!(resources(&state, &p2), vec!["a.md"]);
        assert_eq!(state.active_pane_id, Some(p2.clone()));
        assert!(state.check_invariants().is_ok());

        let a2 = tab_id(&state, &p2, "a.md");
        let closed = state.close_tab(&p2, &a2).expect("close succeeds");
        assert!(closed.pane_destroyed);
        assert_eq!(state.layout, Some(LayoutTree::leaf(p1.clone())));
        assert_eq!(state.active_pane_id, Some(p1));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_closing_last_pane_empties_layout() {
        let (mut state, pane_id) = pane_with(&["a.md"]);
        let a = tab_id(&state, &pane_id, "a.md");
        state.close_tab(&pane_id, &a).expect("close succeeds");

        assert!(state.layout.is_none());
        assert!(state.panes.is_empty());
        assert!(state.active_pane_id.is_none());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_pinned_tabs_stay_a_prefix() {
        let (mut state, pane_id) = pane_with(&["a.md", "b.md", "c.md"]);
        let a = tab_id(&state, &pane_id, "a.md");
        let b = tab_id(&state, &pane_id, "b.md");
        let c = tab_id(&state, &pane_id, "c.md");

        state.pin_tab(&pane_id, &c).expect("pin c");
        assert_eq!(resources(&state, &pane_id), vec!["c.md", "a.md", "b.md"]);
        state.pin_tab(&pane_id, &b).expect("pin b");
        assert_eq!(resources(&state, &pane_id), vec!["c.md", "b.md", "a.md"]);
        assert!(state.pin_tab(&pane_id, &b).is_none(), "already pinned");

        assert!(state.reorder_tab(&pane_id, &a, 0).is_none(), "a is unpinned");
        assert!(state.reorder_tab(&pane_id, &c, 2).is_none(), "c is pinned");
        state.reorder_tab(&pane_id, &b, 0).expect("reorder inside pinned prefix");
        assert_eq!(resources(&state, &pane_id), vec!["b.md", "c.md", "a.md"]);

        state.unpin_tab(&pane_id, &b).expect("unpin b");
        assert_eq!(resources(&state, &pane_id), vec!["c.md", "b.md", "a.md"]);
        let pane = state.pane(&pane_id).unwrap();
        assert_eq!(pane.pinned_count(), 1);
        assert!(pane.check_invariants().is_ok());
    }

    #[test]
    fn test_move_tab_to_pane_with_same_resource_focuses_existing() {
        let (mut state, p1) = pane_with(&["a.md"]);
        let p2 = state
            .split_pane(&p1, SplitDirection::Column, RATIO)
            .expect("split succeeds");
        let a1 = tab_id(&state, &p1, "a.md");
        let a2 = tab_id(&state, &p2, "a.md");

        let active = state.move_tab_to_pane(&p1, &a1, &p2).expect("move succeeds");
        assert_eq!(active, a2);
        assert!(state.pane(&p1).is_none(), "emptied source pane is destroyed");
        assert_eq!(resources(&state, &p2), vec!["a.md"]);
        assert_eq!(state.layout, Some(LayoutTree::leaf(p2.clone())));
        assert_eq!(state.active_pane_id, Some(p2));
    }

    #[test]
    fn test_move_tab_to_pane_keeps_tab_identity() {
        let (mut state, p1) = pane_with(&["a.md", "b.md"]);
        let p2 = state
            .open_tab("c.md", Some(&PaneId::from("elsewhere")), RATIO)
            .expect("open succeeds")
            .pane_id;
        let b = tab_id(&state, &p1, "b.md");

        assert_eq!(state.move_tab_to_pane(&p1, &b, &p2), Some(b.clone()));
        assert_eq!(resources(&state, &p1), vec!["a.md"]);
        assert_eq!(resources(&state, &p2), vec!["c.md", "b.md"]);
        assert_eq!(state.pane(&p2).unwrap().active_tab_id, b);
        assert!(state.move_tab_to_pane(&p2, &b, &p2).is_none());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_split_pane_with_only_tab_copies_it() {
        let (mut state, p1) = pane_with(&["a.md"]);
        let a = tab_id(&state, &p1, "a.md");

        let p2 = state
            .split_pane_with_tab(&p1, SplitDirection::Row, SplitPosition::First, &p1, &a, RATIO)
            .expect("split succeeds");
        assert_eq!(state.pane_order(), vec![p2.clone(), p1.clone()]);
        assert_eq!(resources(&state, &p1), vec!["a.md"]);
        assert_eq!(resources(&state, &p2), vec!["a.md"]);
        assert_ne!(tab_id(&state, &p2, "a.md"), a);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_split_pane_with_tab_moves_it() {
        let (mut state, p1) = pane_with(&["a.md", "b.md"]);
        let b = tab_id(&state, &p1, "b.md");

        let p2 = state
            .split_pane_with_tab(&p1, SplitDirection::Column, SplitPosition::Second, &p1, &b, RATIO)
            .expect("split succeeds");
        assert_eq!(resources(&state, &p1), vec!["a.md"]);
        assert_eq!(state.pane(&p2).unwrap().tabs[0].id, b);
        assert_eq!(state.active_pane_id, Some(p2));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_reopen_closed_tab_restores_pin() {
        let (mut state, pane_id) = pane_with(&["a.md", "b.md"]);
        let b = tab_id(&state, &pane_id, "b.md");
        state.pin_tab(&pane_id, &b).expect("pin b");
        state.close_tab(&pane_id, &b).expect("close b");

        let opened = state.reopen_closed_tab(&pane_id, RATIO).expect("reopen succeeds");
        let pane = state.pane(&pane_id).unwrap();
        assert_eq!(pane.tabs[0].resource, "b.md");
        assert!(pane.tabs[0].pinned);
        assert_eq!(pane.active_tab_id, opened.tab_id);
        assert!(pane.recently_closed.is_empty());
        assert!(state.reopen_closed_tab(&pane_id, RATIO).is_none());
    }

    #[test]
    fn test_recently_closed_history_is_bounded() {
        let names: Vec<String> = (0..12).map(|i| format!("note-{}.md", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (mut state, pane_id) = pane_with(&refs);

        for name in &names[..11] {
            let tab = tab_id(&state, &pane_id, name);
            state.close_tab(&pane_id, &tab).expect("close succeeds");
        }
        let pane = state.pane(&pane_id).unwrap();
        assert_eq!(pane.recently_closed.len(), RECENTLY_CLOSED_CAPACITY);
        assert_eq!(pane.recently_closed.front().unwrap().resource, "note-1.md");
        assert_eq!(pane.recently_closed.back().unwrap().resource, "note-10.md");
    }

    #[test]
    fn test_retarget_resource_merges_duplicates() {
        let (mut state, p1) = pane_with(&["old.md", "new.md"]);
        let p2 = state
            .open_tab("old.md", Some(&PaneId::from("elsewhere")), RATIO)
            .expect("open succeeds")
            .pane_id;

        assert_eq!(state.retarget_resource("old.md", "new.md"), Some(2));
        assert_eq!(resources(&state, &p1), vec!["new.md"]);
        assert_eq!(resources(&state, &p2), vec!["new.md"]);
        assert!(state.retarget_resource("missing.md", "x.md").is_none());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_close_resource_everywhere() {
        let (mut state, p1) = pane_with(&["a.md", "b.md"]);
        let p2 = state
            .open_tab("a.md", Some(&PaneId::from("elsewhere")), RATIO)
            .expect("open succeeds")
            .pane_id;

        assert_eq!(state.close_resource("a.md"), Some(2));
        assert_eq!(resources(&state, &p1), vec!["b.md"]);
        assert!(state.pane(&p2).is_none());
        assert_eq!(state.panes_with_resource("a.md"), Vec::<PaneId>::new());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_close_pane_moves_focus_only_when_active() {
        let (mut state, p1) = pane_with(&["a.md"]);
        let p2 = state.split_pane(&p1, SplitDirection::Row, RATIO).unwrap();
        let p3 = state.split_pane(&p2, SplitDirection::Column, RATIO).unwrap();

        state.focus_pane(&p2).expect("p2 exists");
        state.close_pane(&p3).expect("p3 exists");
        assert_eq!(state.active_pane_id, Some(p2.clone()));

        state.close_pane(&p2).expect("p2 exists");
        assert_eq!(state.active_pane_id, Some(p1));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_example_trace() {
        let manager = PaneManager::new();
        let p1 = manager
            .open_tab("a.md", None)
            .expect("no store")
            .expect("opened")
            .pane_id;

        let p2 = manager
            .split_pane(&p1, SplitDirection::Row)
            .expect("no store")
            .expect("split");
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.pane_order(), vec![p1.clone(), p2.clone()]);
        assert_eq!(resources(&snapshot, &p2), vec!["a.md"]);

        let tab = tab_id(&snapshot, &p2, "a.md");
        let closed = manager.close_tab(&p2, &tab).expect("no store").expect("closed");
        assert!(closed.pane_destroyed);
        assert_eq!(manager.snapshot().layout, Some(LayoutTree::leaf(p1.clone())));
        assert_eq!(manager.active_pane(), Some(p1));
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let manager = PaneManager::new();
        manager.open_tab("a.md", None).unwrap();
        let before = manager.snapshot();

        manager.open_tab("b.md", None).unwrap();
        let pane_id = before.active_pane_id.clone().unwrap();
        assert_eq!(resources(&before, &pane_id), vec!["a.md"]);
        assert_eq!(resources(&manager.snapshot(), &pane_id), vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_failed_write_leaves_state_unpublished() {
        let store = Arc::new(MemoryStore::new());
        let manager =
            PaneManager::new().with_persistence(Persistence::new(store.clone(), "editor-layout"));

        let opened = manager.open_tab("a.md", None).unwrap().unwrap();
        assert!(store.get("editor-layout").is_some());

        store.set_fail_saves(true);
        let result = manager.open_tab("b.md", None);
        assert!(matches!(result, Err(EngineError::PersistenceError { .. })));
        assert_eq!(resources(&manager.snapshot(), &opened.pane_id), vec!["a.md"]);

        store.set_fail_saves(false);
        manager.open_tab("b.md", None).unwrap().unwrap();
        assert_eq!(
            resources(&manager.snapshot(), &opened.pane_id),
            vec!["a.md", "b.md"]
        );
    }

    #[test]
    fn test_noop_does_not_write() {
        let store = Arc::new(MemoryStore::new());
        let manager =
            PaneManager::new().with_persistence(Persistence::new(store.clone(), "editor-layout"));
        assert_eq!(manager.focus_pane(&PaneId::from("ghost")), Ok(false));
        assert!(store.get("editor-layout").is_none());
    }

    #[test]
    fn test_manager_queries() {
        let manager = PaneManager::new();
        let opened = manager.open_tab("a.md", None).unwrap().unwrap();
        let p2 = manager
            .split_pane(&opened.pane_id, SplitDirection::Row)
            .unwrap()
            .unwrap();

        assert_eq!(manager.pane_for_tab(&opened.tab_id), Some(opened.pane_id.clone()));
        assert_eq!(
            manager.panes_with_resource("a.md"),
            vec![opened.pane_id.clone(), p2.clone()]
        );
        assert_eq!(
            manager.adjacent_pane(&opened.pane_id, FocusDirection::Right),
            Some(p2)
        );
    }
}
