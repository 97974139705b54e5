//! Property-based tests for rendering invariants.

use event_template::{evaluate, Check, Event, ObjectMeta};
use proptest::prelude::*;
use uuid::Uuid;

fn event_with(name: &str, id: Vec<u8>) -> Event {
    Event {
        check: Some(Check {
            metadata: ObjectMeta {
                name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }),
        id: Some(id),
        ..Default::default()
    }
}

proptest! {
    /// Text with no template syntax comes back unchanged.
    #[test]
    fn literal_text_is_verbatim(text in "[a-zA-Z0-9 .,:;!?()\\-\n]{1,80}") {
        let event = event_with("check", vec![0; 16]);
        let output = evaluate("literal", &text, Some(&event)).unwrap();
        prop_assert_eq!(output, text);
    }

    /// Field values are substituted exactly, surrounding text preserved.
    #[test]
    fn field_substitution_is_exact(
        prefix in "[a-zA-Z ]{0,20}",
        name in "[a-zA-Z0-9_ -]{0,30}",
        suffix in "[a-zA-Z !]{0,20}",
    ) {
        let event = event_with(&name, vec![0; 16]);
        let source = format!("{prefix}{{{{ .Check.Name }}}}{suffix}");
        let output = evaluate("field", &source, Some(&event)).unwrap();
        prop_assert_eq!(output, format!("{prefix}{name}{suffix}"));
    }

    /// Any 16 bytes render as the UUID they encode.
    #[test]
    fn uuid_from_bytes_matches_uuid_crate(bytes in proptest::collection::vec(any::<u8>(), 16)) {
        let event = event_with("check", bytes.clone());
        let output = evaluate("uuid", "{{ UUIDFromBytes .ID }}", Some(&event)).unwrap();
        prop_assert_eq!(output, Uuid::from_slice(&bytes).unwrap().to_string());
    }

    /// Any other length fails with no output.
    #[test]
    fn uuid_from_bytes_rejects_other_lengths(
        bytes in proptest::collection::vec(any::<u8>(), 0..40)
            .prop_filter("not 16 bytes", |b| b.len() != 16)
    ) {
        let event = event_with("check", bytes);
        prop_assert!(evaluate("uuid", "{{ UUIDFromBytes .ID }}", Some(&event)).is_err());
    }
}
