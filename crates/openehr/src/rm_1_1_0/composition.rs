//! RM 1.x `COMPOSITION` canonical JSON views.
//!
//! The repository returns compositions in the canonical (nested) JSON form:
//!
//! ```text
//! COMPOSITION
//! ├── uid.value
//! ├── archetype_details.template_id.value
//! ├── language / territory (CODE_PHRASE)
//! ├── category (DV_CODED_TEXT)
//! ├── composer.name
//! ├── context.start_time.value, context.setting (DV_CODED_TEXT)
//! └── content[]                      OBSERVATION, matched by name.value
//!     └── data.events[0].data.items[] ELEMENT, matched by name.value
//!         └── value                   DV_QUANTITY | DV_PROPORTION | DV_CODED_TEXT
//! ```
//!
//! Responsibilities:
//! - Read-only views over `serde_json::Value` that locate nodes by their human-readable name.
//! - Total accessors: every lookup returns `Option`, never panics and never errors.
//!
//! Notes:
//! - The tree shape is dictated by archetypes outside our control. Array order in `content[]`
//!   and `items[]` carries no meaning here; only names do.
//! - Views are deliberately untyped. A strict serde model would reject a whole composition
//!   because one observation has an unexpected shape, which would hide the rest of a patient's
//!   history.

use serde_json::Value;

use crate::data_types::{DataValue, DvCodedText};

/// Returns the `name.value` of a locatable node.
pub fn node_name(node: &Value) -> Option<&str> {
    node.get("name")?.get("value")?.as_str()
}

/// Finds the first node in `nodes` whose `name.value` equals `name` exactly.
pub fn find_named<'a>(nodes: &'a [Value], name: &str) -> Option<&'a Value> {
    nodes.iter().find(|n| node_name(n) == Some(name))
}

/// Read-only view over a canonical composition.
#[derive(Clone, Copy, Debug)]
pub struct CompositionView<'a> {
    root: &'a Value,
}

impl<'a> CompositionView<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Returns `true` if the root is a JSON object with both `content` and `context`.
    ///
    /// A composition missing either is structurally broken. Its remaining fields are still
    /// readable through the other accessors.
    pub fn is_well_formed(&self) -> bool {
        self.root.is_object()
            && self.root.get("content").is_some_and(Value::is_array)
            && self.root.get("context").is_some_and(Value::is_object)
    }

    pub fn uid(&self) -> Option<&'a str> {
        self.root.get("uid")?.get("value")?.as_str()
    }

    pub fn template_id(&self) -> Option<&'a str> {
        self.root
            .get("archetype_details")?
            .get("template_id")?
            .get("value")?
            .as_str()
    }

    pub fn start_time(&self) -> Option<&'a str> {
        self.root
            .get("context")?
            .get("start_time")?
            .get("value")?
            .as_str()
    }

    pub fn category(&self) -> Option<DvCodedText> {
        DvCodedText::from_json(self.root.get("category")?)
    }

    pub fn setting(&self) -> Option<DvCodedText> {
        DvCodedText::from_json(self.root.get("context")?.get("setting")?)
    }

    pub fn language(&self) -> Option<&'a str> {
        self.root.get("language")?.get("code_string")?.as_str()
    }

    pub fn territory(&self) -> Option<&'a str> {
        self.root.get("territory")?.get("code_string")?.as_str()
    }

    pub fn composer_name(&self) -> Option<&'a str> {
        self.root.get("composer")?.get("name")?.as_str()
    }

    /// Entries of `content[]`, or an empty slice if absent.
    pub fn content(&self) -> &'a [Value] {
        self.root
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The content entry named `name`, if any.
    pub fn entry(&self, name: &str) -> Option<EntryView<'a>> {
        find_named(self.content(), name).map(|root| EntryView { root })
    }
}

/// Read-only view over a content entry (typically an `OBSERVATION`).
#[derive(Clone, Copy, Debug)]
pub struct EntryView<'a> {
    root: &'a Value,
}

impl<'a> EntryView<'a> {
    pub fn name(&self) -> Option<&'a str> {
        node_name(self.root)
    }

    pub fn archetype_node_id(&self) -> Option<&'a str> {
        self.root.get("archetype_node_id")?.as_str()
    }

    /// Items of the first event: `data.events[0].data.items[]`.
    pub fn first_event_items(&self) -> &'a [Value] {
        self.root
            .get("data")
            .and_then(|d| d.get("events"))
            .and_then(Value::as_array)
            .and_then(|events| events.first())
            .and_then(|event| event.get("data"))
            .and_then(|d| d.get("items"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The raw `value` node of the first-event element named `name`.
    pub fn element_value(&self, name: &str) -> Option<&'a Value> {
        find_named(self.first_event_items(), name)?.get("value")
    }

    /// The classified value of the first-event element named `name`.
    pub fn element(&self, name: &str) -> Option<DataValue> {
        DataValue::from_json(self.element_value(name)?)
    }
}
