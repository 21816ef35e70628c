//! Decoding of the realtime database's server-sent event stream into full
//! presence snapshots.
use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    presence::PresenceSnapshot,
};

/// One change notification from the database.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    /// Replace the data at `path`.
    Put { path: String, data: Value },
    /// Merge the children of `data` into the data at `path`.
    Patch { path: String, data: Value },
    KeepAlive,
    /// The database stopped the subscription, e.g. because the security
    /// rules no longer allow reading the location.
    Cancel(String),
    AuthRevoked,
}

#[derive(Deserialize)]
struct ChangePayload {
    path: String,
    data: Value,
}

impl StreamEvent {
    /// Parses a raw event block (`event: <type>\ndata: <json>`).
    /// Returns `None` for blocks without an event type, like comments.
    pub(crate) fn parse(block: &str) -> Option<Result<Self>> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        for line in block.lines() {
            if let Some(value) = field(line, "event") {
                event_type = Some(value);
            } else if let Some(value) = field(line, "data") {
                data_lines.push(value);
            }
        }
        let data = data_lines.join("\n");

        let event = match event_type? {
            "put" => decode_change(&data).map(|c| StreamEvent::Put {
                path: c.path,
                data: c.data,
            }),
            "patch" => decode_change(&data).map(|c| StreamEvent::Patch {
                path: c.path,
                data: c.data,
            }),
            "keep-alive" => Ok(StreamEvent::KeepAlive),
            "cancel" => Ok(StreamEvent::Cancel(
                serde_json::from_str::<Option<String>>(&data)
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| data.clone()),
            )),
            "auth_revoked" => Ok(StreamEvent::AuthRevoked),
            other => Err(Error::InvalidEvent(format!("unknown event type {other}"))),
        };
        Some(event)
    }
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

fn decode_change(data: &str) -> Result<ChangePayload> {
    serde_json::from_str(data).map_err(|e| Error::InvalidEvent(e.to_string()))
}

/// Takes one complete event block off the front of the buffer.
pub(crate) fn extract_event(buffer: &mut Vec<u8>) -> Option<String> {
    let idx = buffer.windows(2).position(|w| w == b"\n\n")?;
    let block: Vec<u8> = buffer.drain(..idx + 2).collect();
    Some(String::from_utf8_lossy(&block[..idx]).into_owned())
}

/// The locally mirrored `users` collection, kept as raw JSON so that
/// changes at any depth can be applied before decoding.
#[derive(Debug, Default)]
pub(crate) struct PresenceTree {
    root: Value,
}

impl PresenceTree {
    pub(crate) fn put(&mut self, path: &str, data: Value) {
        let segments = segments(path);
        set_at(&mut self.root, &segments, data);
    }

    pub(crate) fn patch(&mut self, path: &str, data: Value) {
        let base = segments(path);
        match data {
            Value::Object(children) => {
                for (key, value) in children {
                    let mut segments = base.clone();
                    segments.push(&key);
                    set_at(&mut self.root, &segments, value);
                }
            }
            other => set_at(&mut self.root, &base, other),
        }
    }

    pub(crate) fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot::from_value(&self.root)
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Writes `value` at the given path, creating objects on the way. Writing
/// `null` deletes, and objects left empty are pruned like the database does.
fn set_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let prune = {
            let child = map.entry(first.to_string()).or_insert(Value::Null);
            set_at(child, rest, value);
            child.is_null() || child.as_object().map_or(false, Map::is_empty)
        };
        if prune {
            map.remove(*first);
        }
    }
}

/// Turns a raw event stream response into a stream of full snapshots, one
/// per `put` or `patch` event.
pub(crate) fn snapshots(
    response: reqwest::Response,
) -> impl Stream<Item = Result<PresenceSnapshot>> + Send + 'static {
    stream! {
        let mut tree = PresenceTree::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut byte_stream = Box::pin(response.bytes_stream());

        'read: while let Some(chunk) = byte_stream.next().await {
            let chunk: Bytes = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::Stream(e));
                    break 'read;
                }
            };
            buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

            while let Some(block) = extract_event(&mut buffer) {
                match StreamEvent::parse(&block) {
                    Some(Ok(StreamEvent::Put { path, data })) => {
                        tree.put(&path, data);
                        yield Ok(tree.snapshot());
                    }
                    Some(Ok(StreamEvent::Patch { path, data })) => {
                        tree.patch(&path, data);
                        yield Ok(tree.snapshot());
                    }
                    Some(Ok(StreamEvent::KeepAlive)) | None => {}
                    Some(Ok(StreamEvent::Cancel(reason))) => {
                        yield Err(Error::SubscriptionCancelled(reason));
                        break 'read;
                    }
                    Some(Ok(StreamEvent::AuthRevoked)) => {
                        yield Err(Error::SubscriptionCancelled("auth revoked".to_string()));
                        break 'read;
                    }
                    Some(Err(e)) => yield Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{Location, Status};
    use serde_json::json;

    #[test]
    fn test_extract_event() {
        let mut buffer = b"event: put\ndata: {}\n\nevent: keep-alive\ndata: null\n\nevent: pa".to_vec();

        let first = extract_event(&mut buffer).expect("first event");
        assert!(first.starts_with("event: put"));
        let second = extract_event(&mut buffer).expect("second event");
        assert!(second.contains("keep-alive"));
        assert!(extract_event(&mut buffer).is_none());
        assert_eq!(buffer, b"event: pa".to_vec());
    }

    #[test]
    fn test_parse_put() {
        let event = StreamEvent::parse("event: put\ndata: {\"path\":\"/\",\"data\":null}")
            .expect("an event")
            .expect("a valid event");
        assert_eq!(
            event,
            StreamEvent::Put {
                path: "/".to_string(),
                data: Value::Null
            }
        );
    }

    #[test]
    fn test_parse_control_events() {
        assert!(matches!(
            StreamEvent::parse("event: keep-alive\ndata: null"),
            Some(Ok(StreamEvent::KeepAlive))
        ));
        assert!(matches!(
            StreamEvent::parse("event: cancel\ndata: \"Permission denied\""),
            Some(Ok(StreamEvent::Cancel(reason))) if reason == "Permission denied"
        ));
        assert!(StreamEvent::parse(": just a comment").is_none());
        assert!(matches!(
            StreamEvent::parse("event: put\ndata: {oops"),
            Some(Err(Error::InvalidEvent(_)))
        ));
    }

    #[test]
    fn test_tree_applies_nested_changes() {
        let mut tree = PresenceTree::default();
        tree.put(
            "/",
            json!({
                "-Na": { "name": "Pak Joko", "role": "vendor", "status": "active" },
                "-Nb": { "name": "Sari", "role": "customer", "status": "active" }
            }),
        );
        tree.put("/-Na/location", json!({ "latitude": -6.2, "longitude": 106.8 }));
        tree.patch("/-Nb", json!({ "status": "inactive" }));

        let snapshot = tree.snapshot();
        assert_eq!(
            snapshot.get("-Na").and_then(|r| r.location),
            Some(Location::new(-6.2, 106.8))
        );
        assert_eq!(snapshot.get("-Nb").map(|r| r.status), Some(Status::Inactive));

        tree.put("/-Nb", Value::Null);
        let snapshot = tree.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("-Nb").is_none());
    }

    #[test]
    fn test_tree_patch_at_root_adds_records() {
        let mut tree = PresenceTree::default();
        tree.put("/", Value::Null);
        tree.patch(
            "/",
            json!({ "-Nc": { "name": "Bu Tini", "role": "vendor", "status": "active" } }),
        );
        assert_eq!(tree.snapshot().len(), 1);
    }
}
