//! Best-effort message synthesis. Records rarely embed their rendered
//! message, so this pulls one from the decoded data fields when possible
//! and otherwise falls back to canned phrases for well known event ids.
//! An absent message is a normal outcome.

use serde_json::{Map, Value};

/// Data field names that carry message text when present, in priority order.
const MESSAGE_KEYS: [&str; 5] = ["Message", "ErrorMessage", "Description", "Details", "Error"];

/// A string field at least this long with word breaks reads as prose.
const MIN_PROSE_LEN: usize = 40;

pub(crate) fn synthesize(event_id: u32, event_data: &Map<String, Value>) -> Option<String> {
    for key in MESSAGE_KEYS {
        let found = event_data.iter().find_map(|(name, value)| {
            if name.eq_ignore_ascii_case(key) {
                value.as_str().filter(|text| !text.trim().is_empty())
            } else {
                None
            }
        });
        if let Some(text) = found {
            return Some(text.trim().to_string());
        }
    }

    let prose = event_data.values().find_map(|value| {
        value
            .as_str()
            .filter(|text| text.len() >= MIN_PROSE_LEN && text.contains(' '))
    });
    if let Some(text) = prose {
        return Some(text.trim().to_string());
    }

    canned_message(event_id).map(str::to_string)
}

fn canned_message(event_id: u32) -> Option<&'static str> {
    match event_id {
        1102 => Some("The audit log was cleared"),
        4624 => Some("An account was successfully logged on"),
        4625 => Some("An account failed to log on"),
        4634 => Some("An account was logged off"),
        4648 => Some("A logon was attempted using explicit credentials"),
        4672 => Some("Special privileges assigned to new logon"),
        4688 => Some("A new process has been created"),
        7034 => Some("A service terminated unexpectedly"),
        7036 => Some("A service entered a new state"),
        7040 => Some("The start type of a service was changed"),
        7045 => Some("A service was installed in the system"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn named_message_fields_win_in_priority_order() {
        let fields = data(&[
            ("Description", "disk is failing"),
            ("Message", "controller reset"),
        ]);
        assert_eq!(
            synthesize(9999, &fields).as_deref(),
            Some("controller reset")
        );
    }

    #[test]
    fn message_keys_match_case_insensitively() {
        let fields = data(&[("errormessage", "access denied")]);
        assert_eq!(synthesize(9999, &fields).as_deref(), Some("access denied"));
    }

    #[test]
    fn long_prose_fields_are_picked_up() {
        let fields = data(&[(
            "Param1",
            "The service did not respond to the start request in a timely fashion",
        )]);
        assert_eq!(
            synthesize(9999, &fields).as_deref(),
            Some("The service did not respond to the start request in a timely fashion")
        );
    }

    #[test]
    fn short_opaque_fields_do_not_become_messages() {
        let fields = data(&[("TargetUserName", "SYSTEM")]);
        assert_eq!(synthesize(9999, &fields), None);
    }

    #[test]
    fn known_ids_get_a_canned_phrase() {
        assert_eq!(
            synthesize(4624, &Map::new()).as_deref(),
            Some("An account was successfully logged on")
        );
        assert_eq!(synthesize(2, &Map::new()), None);
    }
}
