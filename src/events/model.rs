use serde::{Deserialize, Serialize};

/// One event report as returned by the per-day source.
///
/// `date` is kept as the raw string the source sent. Formatting parses it
/// lazily and falls back to the raw text, so a malformed date never fails a
/// fetch or a synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prayer_requests: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_count: Option<u32>,
    #[serde(default)]
    pub did_not_meet: bool,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_deserialize_camel_case() {
        let record: EventRecord = serde_json::from_str(
            r#"{
                "eventId": "evt-1",
                "title": "Tuesday Group",
                "date": "2025-03-04",
                "link": "https://example.org/events/evt-1",
                "prayerRequests": "Healing for Sam",
                "headCount": 12,
                "didNotMeet": false,
                "attendees": [{"id": "a1", "name": "Ruth", "status": "Present"}]
            }"#,
        )
        .unwrap();

        assert_eq!(record.event_id, "evt-1");
        assert_eq!(record.prayer_requests.as_deref(), Some("Healing for Sam"));
        assert_eq!(record.head_count, Some(12));
        assert!(record.notes.is_none());
        assert_eq!(record.attendees.len(), 1);
        assert_eq!(record.attendees[0].name.as_deref(), Some("Ruth"));
    }

    #[test]
    fn test_event_record_minimal_defaults() {
        let record: EventRecord =
            serde_json::from_str(r#"{"eventId": "e", "title": "t", "date": "not a date"}"#)
                .unwrap();
        assert!(!record.did_not_meet);
        assert!(record.attendees.is_empty());
        assert_eq!(record.link, "");
        assert_eq!(record.date, "not a date");
    }

    #[test]
    fn test_negative_head_count_rejected() {
        let result = serde_json::from_str::<EventRecord>(
            r#"{"eventId": "e", "title": "t", "date": "2025-01-01", "headCount": -3}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_skips_absent_optionals() {
        let record = EventRecord {
            event_id: "e".into(),
            title: "t".into(),
            date: "2025-01-01".into(),
            link: String::new(),
            notes: None,
            prayer_requests: None,
            topic: None,
            head_count: None,
            did_not_meet: true,
            attendees: vec![],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("notes").is_none());
        assert_eq!(value["didNotMeet"], true);
        assert_eq!(value["eventId"], "e");
    }
}
