//! Cumulative node status, published as one JSON object per line.
//!
//! Every update rewrites the whole object, so a reader only ever needs the
//! most recent line:
//!
//! ```ignore
//! status.update().child("interface").field("name", "tap0").write()?;
//! ```

pub mod json_stream;

use fakenet_core::error::{FakenetError, FakenetResult};
use json_stream::JsonStreamSink;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

type Sink = JsonStreamSink<Box<dyn Write + Send>>;

struct Inner {
    status: Map<String, Value>,
    sink: Sink,
}

/// Shared handle to the status object and the stream it is written to.
#[derive(Clone)]
pub struct StatusBoard {
    inner: Arc<Mutex<Inner>>,
}

impl StatusBoard {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                status: Map::new(),
                sink: JsonStreamSink::new(Box::new(writer)),
            })),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Keeps the status in memory only.
    pub fn detached() -> Self {
        Self::new(io::sink())
    }

    pub fn update(&self) -> UpdateBuilder<'_> {
        UpdateBuilder {
            board: self,
            path: Vec::new(),
            changes: Vec::new(),
            error: None,
        }
    }

    pub fn snapshot(&self) -> Value {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Value::Object(inner.status.clone())
    }
}

enum Change {
    Set {
        path: Vec<String>,
        name: String,
        value: Value,
    },
    Remove {
        path: Vec<String>,
        name: String,
    },
}

/// Collects changes at a path; nothing is applied until [`UpdateBuilder::write`].
#[must_use = "an update does nothing until written"]
pub struct UpdateBuilder<'a> {
    board: &'a StatusBoard,
    path: Vec<String>,
    changes: Vec<Change>,
    error: Option<FakenetError>,
}

impl UpdateBuilder<'_> {
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.path.push(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.changes.push(Change::Set {
                path: self.path.clone(),
                name: name.into(),
                value,
            }),
            Err(e) => {
                self.error.get_or_insert_with(|| {
                    FakenetError::Internal(format!("unserializable status field: {e}"))
                });
            }
        }
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.changes.push(Change::Remove {
            path: self.path.clone(),
            name: name.into(),
        });
        self
    }

    /// Applies all changes at once and writes the resulting object as one line.
    pub fn write(self) -> FakenetResult<()> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut inner = self
            .board
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for change in self.changes {
            match change {
                Change::Set { path, name, value } => {
                    object_at(&mut inner.status, &path).insert(name, value);
                }
                Change::Remove { path, name } => {
                    object_at(&mut inner.status, &path).remove(&name);
                }
            }
        }

        let Inner { status, sink } = &mut *inner;
        sink.write_row(status)?;
        Ok(())
    }
}

/// Walks `path` from `root`, creating objects (or replacing non-objects) on the way.
fn object_at<'m>(root: &'m mut Map<String, Value>, path: &[String]) -> &'m mut Map<String, Value> {
    let mut current = root;
    for elem in path {
        let entry = current
            .entry(elem.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just made an object"),
        };
    }
    current
}
