//! Control-plane bridge.
//!
//! Maps named remote requests onto [`App`] operations and turns bus events
//! into named notifications. Every response carries `ok`, plus `error` on
//! failure.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::app::App;
use crate::error::{Error, OpResult, Result};
use crate::events::{Event, EventBus, Subscription};
use crate::types::{sanitize_id, GroupId, ItemId};

/// A remote request, tagged by `requestType` with arguments in `requestData`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "requestType", content = "requestData")]
pub enum Request {
    /// Every item with its visibility.
    ListLowerThirds,
    /// The visible set.
    GetVisible,
    /// Show or hide an item.
    SetVisible {
        /// Item id.
        id: String,
        /// Target visibility.
        visible: bool,
    },
    /// Flip an item.
    ToggleVisible {
        /// Item id.
        id: String,
    },
    /// Create an item with defaults.
    CreateLowerThird,
    /// Duplicate an item.
    CloneLowerThird {
        /// Source item id.
        id: String,
    },
    /// Delete an item.
    DeleteLowerThird {
        /// Item id.
        id: String,
    },
    /// Move an item in the sort order.
    MoveLowerThird {
        /// Item id.
        id: String,
        /// Signed number of places.
        delta: i64,
    },
    /// Every group with its run state.
    ListGroups,
    /// Start a group.
    StartGroup {
        /// Group id.
        id: String,
    },
    /// Stop a group.
    StopGroup {
        /// Group id.
        id: String,
    },
    /// Reload state from disk.
    Reload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary<'a> {
    id: &'a str,
    label: &'a str,
    title: &'a str,
    subtitle: &'a str,
    is_visible: bool,
    repeat_every_sec: u32,
    repeat_visible_sec: u32,
    hotkey: &'a str,
    group: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupSummary<'a> {
    id: &'a str,
    title: &'a str,
    members: Vec<&'a str>,
    running: bool,
    hotkey: &'a str,
}

fn item_id(raw: &str) -> Result<ItemId> {
    let id = sanitize_id(raw);
    if id.is_empty() {
        return Err(Error::Msg("Invalid id".to_string()));
    }
    Ok(ItemId::new(id))
}

fn group_id(raw: &str) -> Result<GroupId> {
    let id = sanitize_id(raw);
    if id.is_empty() {
        return Err(Error::Msg("Invalid id".to_string()));
    }
    Ok(GroupId::new(id))
}

fn id_list(ids: &[ItemId]) -> Value {
    Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("Failed to encode bridge payload: {e}");
        Value::Null
    })
}

fn dispatch(app: &mut App, request: Request, now: Instant) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    match request {
        Request::ListLowerThirds => {
            let items: Vec<ItemSummary<'_>> = app
                .store
                .items()
                .iter()
                .map(|item| ItemSummary {
                    id: item.id.as_str(),
                    label: &item.label,
                    title: &item.title,
                    subtitle: &item.subtitle,
                    is_visible: app.store.is_visible(&item.id),
                    repeat_every_sec: item.repeat_every_sec,
                    repeat_visible_sec: item.repeat_visible_sec,
                    hotkey: item.hotkey.as_deref().unwrap_or_default(),
                    group: app.store.group_of(&item.id).map(|g| g.id.as_str()),
                })
                .collect();
            out.insert("items".into(), to_value(&items));
        }
        Request::GetVisible => {
            out.insert("visibleIds".into(), id_list(&app.store.visible_ids()));
        }
        Request::SetVisible { id, visible } => {
            let id = item_id(&id)?;
            app.set_visible(&id, visible)?;
            out.insert("id".into(), json!(id));
            out.insert("visible".into(), json!(app.store.is_visible(&id)));
        }
        Request::ToggleVisible { id } => {
            let id = item_id(&id)?;
            let visible = app.toggle_visible(&id)?;
            out.insert("id".into(), json!(id));
            out.insert("visible".into(), json!(visible));
        }
        Request::CreateLowerThird => {
            let id = app.add_item()?;
            out.insert("id".into(), json!(id));
        }
        Request::CloneLowerThird { id } => {
            let source = item_id(&id)?;
            let copy = app.clone_item(&source)?;
            out.insert("id".into(), json!(copy));
            out.insert("sourceId".into(), json!(source));
        }
        Request::DeleteLowerThird { id } => {
            let id = item_id(&id)?;
            app.remove_item(&id)?;
            out.insert("id".into(), json!(id));
        }
        Request::MoveLowerThird { id, delta } => {
            let id = item_id(&id)?;
            app.move_item(&id, delta)?;
            let order: Vec<&str> = app.store.items().iter().map(|i| i.id.as_str()).collect();
            out.insert("id".into(), json!(id));
            out.insert("order".into(), json!(order));
        }
        Request::ListGroups => {
            let groups: Vec<GroupSummary<'_>> = app
                .store
                .groups()
                .iter()
                .map(|g| GroupSummary {
                    id: g.id.as_str(),
                    title: &g.title,
                    members: g.members.iter().map(ItemId::as_str).collect(),
                    running: app.scheduler.is_running(&g.id),
                    hotkey: g.hotkey.as_deref().unwrap_or_default(),
                })
                .collect();
            out.insert("groups".into(), to_value(&groups));
        }
        Request::StartGroup { id } => {
            let id = group_id(&id)?;
            let running = app.start_group(&id, now)?;
            out.insert("id".into(), json!(id));
            out.insert("running".into(), json!(running));
        }
        Request::StopGroup { id } => {
            let id = group_id(&id)?;
            app.stop_group(&id)?;
            out.insert("id".into(), json!(id));
            out.insert("running".into(), json!(false));
        }
        Request::Reload => {
            let ok = app.reload();
            out.insert("count".into(), json!(app.store.len()));
            if !ok {
                return Err(Error::Msg("State document unreadable, store reset to empty".into()));
            }
        }
    }
    Ok(out)
}

/// Run one request against the application.
pub fn handle(app: &mut App, request: Request, now: Instant) -> Value {
    tracing::debug!(request = ?request, "Bridge request");
    let result = dispatch(app, request, now);
    let status = OpResult::from_result(&result);
    let mut body = match result {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!("Bridge request failed: {e}");
            Map::new()
        }
    };
    if let Value::Object(status) = to_value(&status) {
        body.extend(status);
    }
    Value::Object(body)
}

/// Parse and run one JSON request; malformed input yields a failure response.
pub fn handle_json(app: &mut App, text: &str, now: Instant) -> Value {
    match serde_json::from_str::<Request>(text) {
        Ok(request) => handle(app, request, now),
        Err(e) => to_value(&OpResult::failure(format!("Invalid request: {e}"))),
    }
}

/// A bus event in remote form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification name.
    pub event_type: &'static str,
    /// Payload.
    pub event_data: Value,
}

impl From<&Event> for Notification {
    fn from(event: &Event) -> Self {
        match event {
            Event::VisibilityChanged { id, visible, visible_ids } => Self {
                event_type: "LowerThirdsVisibilityChanged",
                event_data: json!({ "id": id, "visible": visible, "visibleIds": id_list(visible_ids) }),
            },
            Event::ListChanged { reason, id, id2, count } => Self {
                event_type: "LowerThirdsListChanged",
                event_data: json!({ "reason": reason, "id": id, "id2": id2, "count": count }),
            },
            Event::Reloaded { ok, count } => Self {
                event_type: "LowerThirdsReloaded",
                event_data: json!({ "ok": ok, "count": count }),
            },
        }
    }
}

/// Forward every bus event to `sink` as a [`Notification`].
pub fn relay(bus: &EventBus, sink: impl Fn(Notification) + Send + Sync + 'static) -> Subscription {
    bus.subscribe(move |event: &Event| sink(Notification::from(event)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::Config;
    use crate::scheduler::Scheduler;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn app_in(dir: &std::path::Path) -> App {
        let mut config = Config::default();
        config.output_dir = Some(dir.to_path_buf());
        let mut app = App::with_scheduler(config, Scheduler::with_seed(3));
        app.open().unwrap();
        app
    }

    #[test]
    fn parses_request_names() {
        let req: Request = serde_json::from_str(r#"{"requestType":"ListLowerThirds"}"#).unwrap();
        assert_eq!(req, Request::ListLowerThirds);

        let req: Request =
            serde_json::from_str(r#"{"requestType":"SetVisible","requestData":{"id":"a","visible":true}}"#)
                .unwrap();
        assert_eq!(req, Request::SetVisible { id: "a".into(), visible: true });
    }

    #[test]
    fn set_visible_reports_state_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());
        let id = app.store.items()[0].id.to_string();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _relay = relay(app.bus(), move |n| sink.lock().push(n));

        let resp = handle(&mut app, Request::SetVisible { id: id.clone(), visible: true }, Instant::now());

        assert_eq!(resp["ok"], json!(true));
        assert_eq!(resp["visible"], json!(true));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type, "LowerThirdsVisibilityChanged");
        assert_eq!(seen[0].event_data["visibleIds"], json!([{ "id": id }]));
    }

    #[test]
    fn invalid_ids_fail_with_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());

        let resp = handle(&mut app, Request::ToggleVisible { id: "!!".into() }, Instant::now());
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"], json!("Invalid id"));

        let resp = handle(&mut app, Request::DeleteLowerThird { id: "ghost".into() }, Instant::now());
        assert_eq!(resp["ok"], json!(false));
        assert!(resp["error"].as_str().unwrap().contains("ghost"));
    }

    #[test]
    fn create_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());

        let created = handle_json(&mut app, r#"{"requestType":"CreateLowerThird"}"#, Instant::now());
        assert_eq!(created["ok"], json!(true));

        let listed = handle_json(&mut app, r#"{"requestType":"ListLowerThirds"}"#, Instant::now());
        let items = listed["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], created["id"]);
        assert_eq!(items[1]["isVisible"], json!(false));
    }

    #[test]
    fn malformed_json_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());
        let resp = handle_json(&mut app, "{", Instant::now());
        assert_eq!(resp["ok"], json!(false));
    }
}
