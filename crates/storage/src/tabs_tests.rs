// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use sam_core::{TabKind, TabRecord};

use crate::Store;

fn tab(id: &str, sort_order: i64, kind: TabKind) -> TabRecord {
    TabRecord {
        workspace_id: "ws-1".into(),
        tab_id: id.into(),
        kind,
        title: id.to_string(),
        sort_order,
        acp_session_id: None,
        agent_id: None,
        created_at: Utc::now(),
    }
}

#[test]
fn tabs_list_in_sort_order() {
    let store = Store::open_in_memory().unwrap();
    store.upsert_tab(&tab("b", 2, TabKind::Terminal)).unwrap();
    store.upsert_tab(&tab("a", 1, TabKind::Chat)).unwrap();
    store.upsert_tab(&tab("c", 3, TabKind::Terminal)).unwrap();

    let tabs = store.list_tabs("ws-1").unwrap();
    let ids: Vec<&str> = tabs.iter().map(|t| t.tab_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[test]
fn acp_session_id_persists_and_clears() {
    let store = Store::open_in_memory().unwrap();
    store.upsert_tab(&tab("chat-1", 0, TabKind::Chat)).unwrap();

    store
        .set_tab_acp_session("ws-1", "chat-1", Some("acp-abc"), Some("claude"))
        .unwrap();
    let loaded = store.get_tab("ws-1", "chat-1").unwrap().unwrap();
    assert_eq!(loaded.acp_session_id.as_deref(), Some("acp-abc"));
    assert_eq!(loaded.agent_id.as_deref(), Some("claude"));

    store.set_tab_acp_session("ws-1", "chat-1", None, None).unwrap();
    let loaded = store.get_tab("ws-1", "chat-1").unwrap().unwrap();
    assert_eq!(loaded.acp_session_id, None);
}

#[test]
fn delete_tab_is_scoped_to_workspace() {
    let store = Store::open_in_memory().unwrap();
    store.upsert_tab(&tab("t", 0, TabKind::Terminal)).unwrap();

    store.delete_tab("other-ws", "t").unwrap();
    assert_eq!(store.list_tabs("ws-1").unwrap().len(), 1);

    store.delete_tab("ws-1", "t").unwrap();
    assert!(store.list_tabs("ws-1").unwrap().is_empty());
}
