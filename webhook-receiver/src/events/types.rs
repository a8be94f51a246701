//! Delivery payload types.
//!
//! The platform nests events as `entry[] → changes[] → value`. Each value
//! belongs to one business phone number and carries optional `statuses`
//! (delivery receipts for sent messages) and `messages` (inbound messages).

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::WebhookError;

/// `object` value for WhatsApp Business Account deliveries.
pub const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";

/// Top-level wire shape. Nested arrays stay untyped so every change and
/// every event can be typed on its own.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    object: String,
    #[serde(default)]
    entry: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    changes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    #[serde(default)]
    field: Option<String>,
    value: RawValue,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    messaging_product: Option<String>,
    metadata: Metadata,
    #[serde(default)]
    statuses: Vec<Value>,
    #[serde(default)]
    messages: Vec<Value>,
}

/// Items dropped while typing a delivery because their shape did not match.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SkippedItems {
    pub entries: usize,
    pub changes: usize,
    pub statuses: usize,
    pub messages: usize,
}

impl SkippedItems {
    pub fn total(&self) -> usize {
        self.entries + self.changes + self.statuses + self.messages
    }
}

/// A parsed delivery.
#[derive(Debug, Clone)]
pub struct DeliveryEnvelope {
    /// The `object` field, e.g. `whatsapp_business_account`
    pub object_type: String,
    /// Entries in payload order, holding only the items that typed cleanly
    pub entries: Vec<Entry>,
    pub skipped: SkippedItems,
}

impl DeliveryEnvelope {
    /// Parse a raw delivery body.
    ///
    /// The top level fails closed: invalid JSON, a missing `object` or a
    /// non-array `entry` is [`WebhookError::MalformedPayload`]. Below that,
    /// business account deliveries are typed item by item (entry, change,
    /// status, message). A malformed item is logged, counted in
    /// [`SkippedItems`] and dropped; its siblings are kept.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEnvelope = serde_json::from_slice(body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let mut envelope = DeliveryEnvelope {
            object_type: raw.object,
            entries: Vec::new(),
            skipped: SkippedItems::default(),
        };

        if !envelope.is_business_account() {
            return Ok(envelope);
        }

        for (entry_index, value) in raw.entry.into_iter().enumerate() {
            let raw_entry = match serde_json::from_value::<RawEntry>(value) {
                Ok(e) => e,
                Err(e) => {
                    warn!(entry_index, error = %e, "delivery_entry_malformed");
                    envelope.skipped.entries += 1;
                    continue;
                }
            };

            let mut changes = Vec::with_capacity(raw_entry.changes.len());
            for (change_index, value) in raw_entry.changes.into_iter().enumerate() {
                let field = value.get("field").and_then(Value::as_str).map(str::to_string);
                match serde_json::from_value::<RawChange>(value) {
                    Ok(raw_change) => {
                        changes.push(type_change(raw_change, entry_index, &mut envelope.skipped))
                    }
                    Err(e) => {
                        warn!(
                            entry_index,
                            change_index,
                            field = ?field,
                            error = %e,
                            "delivery_change_malformed"
                        );
                        envelope.skipped.changes += 1;
                    }
                }
            }

            envelope.entries.push(Entry {
                id: raw_entry.id,
                changes,
            });
        }

        Ok(envelope)
    }

    pub fn is_business_account(&self) -> bool {
        self.object_type == BUSINESS_ACCOUNT_OBJECT
    }
}

/// Type the statuses and messages of one change, dropping the odd ones out.
fn type_change(raw: RawChange, entry_index: usize, skipped: &mut SkippedItems) -> Change {
    let phone_number_id = raw.value.metadata.phone_number_id.clone();

    let statuses = type_items::<StatusUpdate>(raw.value.statuses, |index, e| {
        warn!(
            entry_index,
            status_index = index,
            phone_number_id = %phone_number_id,
            error = %e,
            "delivery_status_malformed"
        );
        skipped.statuses += 1;
    });

    let messages = type_items::<InboundMessage>(raw.value.messages, |index, e| {
        warn!(
            entry_index,
            message_index = index,
            phone_number_id = %phone_number_id,
            error = %e,
            "delivery_message_malformed"
        );
        skipped.messages += 1;
    });

    Change {
        field: raw.field,
        value: EventValue {
            messaging_product: raw.value.messaging_product,
            metadata: raw.value.metadata,
            statuses,
            messages,
        },
    }
}

fn type_items<T: DeserializeOwned>(
    values: Vec<Value>,
    mut on_error: impl FnMut(usize, serde_json::Error),
) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                on_error(index, e);
                None
            }
        })
        .collect()
}

/// One notification batch, usually for one business account.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// Business Account ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub changes: Vec<Change>,
}

/// One field update within an entry.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    /// The field that changed, normally `messages`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub value: EventValue,
}

/// The event data of a change.
#[derive(Debug, Clone, Serialize)]
pub struct EventValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messaging_product: Option<String>,
    pub metadata: Metadata,
    pub statuses: Vec<StatusUpdate>,
    pub messages: Vec<InboundMessage>,
}

impl EventValue {
    pub fn phone_number_id(&self) -> &str {
        &self.metadata.phone_number_id
    }
}

/// The business phone number an event belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub phone_number_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_phone_number: Option<String>,
}

/// Delivery receipt for a message we sent (`sent`, `delivered`, `read`, `failed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// ID of the message this status refers to
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Remaining fields (`conversation`, `pricing`, `errors`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message received from a WhatsApp user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Sender's WhatsApp ID
    pub from: String,
    /// Message type (`text`, `image`, `interactive`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Type-specific content (`text`, `image`, `context`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn business_body(entries: Value) -> Vec<u8> {
        json!({"object": BUSINESS_ACCOUNT_OBJECT, "entry": entries})
            .to_string()
            .into_bytes()
    }

    fn valid_entry() -> Value {
        json!({
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550783881",
                        "phone_number_id": "106540352242922"
                    },
                    "messages": [{
                        "from": "16505551234",
                        "id": "wamid.HBgLMTY1MDM4Nzk0MzkVAgASGBQzQTRBNjU5OUFFRTAzODEwMTQ0RgA=",
                        "timestamp": "1749416383",
                        "type": "text",
                        "text": {"body": "Does it come in another color?"}
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_parse_business_account_delivery() {
        let envelope = DeliveryEnvelope::parse(&business_body(json!([valid_entry()]))).unwrap();

        assert!(envelope.is_business_account());
        assert_eq!(envelope.entries.len(), 1);
        assert_eq!(envelope.skipped, SkippedItems::default());

        let value = &envelope.entries[0].changes[0].value;
        assert_eq!(value.phone_number_id(), "106540352242922");
        assert!(value.statuses.is_empty());

        let message = &value.messages[0];
        assert_eq!(message.from, "16505551234");
        assert_eq!(message.kind, "text");
        assert_eq!(message.extra["text"]["body"], "Does it come in another color?");
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            DeliveryEnvelope::parse(b"{not json"),
            Err(WebhookError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_missing_object_is_malformed() {
        assert!(matches!(
            DeliveryEnvelope::parse(br#"{"entry":[]}"#),
            Err(WebhookError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_non_array_entry_is_malformed() {
        assert!(matches!(
            DeliveryEnvelope::parse(br#"{"object":"whatsapp_business_account","entry":{}}"#),
            Err(WebhookError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_unrecognized_object_keeps_no_entries() {
        let body = json!({"object": "other_type", "entry": [{"anything": true}]}).to_string();
        let envelope = DeliveryEnvelope::parse(body.as_bytes()).unwrap();

        assert!(!envelope.is_business_account());
        assert_eq!(envelope.object_type, "other_type");
        assert!(envelope.entries.is_empty());
    }

    #[test]
    fn test_non_object_entry_is_skipped_siblings_kept() {
        let body = business_body(json!([42, valid_entry()]));

        let envelope = DeliveryEnvelope::parse(&body).unwrap();

        assert_eq!(envelope.skipped.entries, 1);
        assert_eq!(envelope.entries.len(), 1);
        assert_eq!(
            envelope.entries[0].changes[0].value.phone_number_id(),
            "106540352242922"
        );
    }

    #[test]
    fn test_change_without_metadata_is_skipped_siblings_kept() {
        let entry = json!({
            "id": "WABA",
            "changes": [
                {"field": "message_template_status_update", "value": {"event": "APPROVED"}},
                {"field": "messages", "value": {
                    "metadata": {"phone_number_id": "P"},
                    "messages": [{"id": "m1", "from": "15551234567", "type": "text"}]
                }}
            ]
        });

        let envelope = DeliveryEnvelope::parse(&business_body(json!([entry]))).unwrap();

        assert_eq!(envelope.skipped.changes, 1);
        assert_eq!(envelope.skipped.total(), 1);
        let changes = &envelope.entries[0].changes;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field.as_deref(), Some("messages"));
        assert_eq!(changes[0].value.messages[0].id, "m1");
    }

    #[test]
    fn test_malformed_status_does_not_drop_messages() {
        let entry = json!({
            "changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "P"},
                "statuses": [{"id": "s1"}, {"id": "s2", "status": "read"}],
                "messages": [{"id": "m1", "from": "15551234567", "type": "text"}, {"id": "m2"}]
            }}]
        });

        let envelope = DeliveryEnvelope::parse(&business_body(json!([entry]))).unwrap();

        assert_eq!(
            envelope.skipped,
            SkippedItems {
                entries: 0,
                changes: 0,
                statuses: 1,
                messages: 1
            }
        );
        let value = &envelope.entries[0].changes[0].value;
        assert_eq!(value.statuses.len(), 1);
        assert_eq!(value.statuses[0].id, "s2");
        assert_eq!(value.messages.len(), 1);
        assert_eq!(value.messages[0].id, "m1");
    }

    #[test]
    fn test_status_update_preserves_extra_fields() {
        let status: StatusUpdate = serde_json::from_value(json!({
            "id": "wamid.abc",
            "status": "delivered",
            "timestamp": "1750263773",
            "recipient_id": "16505551234",
            "pricing": {"billable": true, "category": "marketing"}
        }))
        .unwrap();

        assert_eq!(status.status, "delivered");
        assert_eq!(status.recipient_id.as_deref(), Some("16505551234"));
        assert_eq!(status.extra["pricing"]["category"], "marketing");

        let back = serde_json::to_value(&status).unwrap();
        assert_eq!(back["pricing"]["billable"], true);
        assert_eq!(back["id"], "wamid.abc");
    }
}
