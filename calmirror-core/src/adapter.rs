//! The contract every calendar provider implements.
//!
//! Authentication, token refresh and the HTTP protocol all live behind this
//! trait; the synchronizer only ever sees wire payloads plus the serializer
//! bound to the adapter that produced them.

use async_trait::async_trait;

use crate::date_range::DateRange;
use crate::error::{CalMirrorError, CalMirrorResult};
use crate::serializer::{EventSerializer, Field, FieldValue, WirePayload};

#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    /// Human-readable name for logs and reports.
    fn name(&self) -> &str;

    /// The serializer for this provider's wire format.
    fn serializer(&self) -> &EventSerializer;

    /// List events in `range`, following pagination until `max_events`.
    async fn get_events(&self, range: &DateRange, max_events: usize)
    -> CalMirrorResult<Vec<WirePayload>>;

    /// Fetch a single event by id.
    async fn get_event(&self, event_id: &str) -> CalMirrorResult<WirePayload>;

    /// Create an event, embedding `source_event_id` as the provenance marker.
    async fn create_event(
        &self,
        payload: WirePayload,
        source_event_id: Option<&str>,
    ) -> CalMirrorResult<WirePayload>;

    /// Apply a partial payload to an existing event.
    ///
    /// With `is_copy`, implementations must refuse events that carry no
    /// provenance marker (see `ensure_copy`).
    async fn update_event(
        &self,
        event_id: &str,
        payload: WirePayload,
        is_copy: bool,
    ) -> CalMirrorResult<WirePayload>;

    /// Delete an event. With `is_copy`, refuses events without a provenance marker.
    async fn delete_event(&self, event_id: &str, is_copy: bool) -> CalMirrorResult<()>;
}

/// Check that `payload` is a copy made by calmirror.
pub fn require_provenance(
    serializer: &EventSerializer,
    payload: &WirePayload,
    event_id: &str,
    operation: &'static str,
) -> CalMirrorResult<String> {
    match serializer.deserialize(Field::SourceEventId, payload)? {
        Some(FieldValue::Text(source)) if !source.is_empty() => Ok(source),
        _ => Err(CalMirrorError::ProvenanceMissing {
            operation,
            event_id: event_id.to_string(),
        }),
    }
}

/// Fetch `event_id` from `adapter` and check it is a copy before a
/// destructive operation on the copy path.
pub async fn ensure_copy<A>(adapter: &A, event_id: &str, operation: &'static str) -> CalMirrorResult<String>
where
    A: CalendarAdapter + ?Sized,
{
    let payload = adapter.get_event(event_id).await?;
    require_provenance(adapter.serializer(), &payload, event_id, operation)
}
