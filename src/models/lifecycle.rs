use serde::{Deserialize, Serialize};
use tracing::debug;

/// One named, timestamped fact about an order's progress, decoded from the
/// gateway's `action*value*timestamp` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub action: String,
    pub value: String,
    pub timestamp: String,
}

/// Decodes a comma-separated event log. Tokens with fewer than two
/// `*`-fields are dropped without failing the batch; tokens with more than
/// three keep the first field as action and the last as timestamp, middle
/// extras beyond the value are undefined wire data and ignored.
pub fn parse_lifecycle(lifecycle: &str) -> Vec<LifecycleEvent> {
    lifecycle
        .split(',')
        .filter_map(|token| {
            let fields: Vec<&str> = token.split('*').map(str::trim).collect();
            if fields.len() < 2 {
                if !token.trim().is_empty() {
                    debug!(token, "dropping malformed lifecycle token");
                }
                return None;
            }
            Some(LifecycleEvent {
                action: fields[0].to_string(),
                value: if fields.len() >= 3 {
                    fields[1].to_string()
                } else {
                    String::new()
                },
                timestamp: fields[fields.len() - 1].to_string(),
            })
        })
        .collect()
}

/// First event whose action matches, case-insensitive and trimmed. Log
/// order encodes priority, so the first match wins even when the same
/// action appears again later.
pub fn event_for<'a>(events: &'a [LifecycleEvent], action: &str) -> Option<&'a LifecycleEvent> {
    let wanted = action.trim().to_lowercase();
    events.iter().find(|event| event.action.to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::{event_for, parse_lifecycle};

    #[test]
    fn parses_two_and_three_field_tokens() {
        let events = parse_lifecycle("received*3/1/2024 10:00:00 AM*10:00,allocated*10:05");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "received");
        assert_eq!(events[0].value, "3/1/2024 10:00:00 AM");
        assert_eq!(events[0].timestamp, "10:00");
        assert_eq!(events[1].action, "allocated");
        assert_eq!(events[1].value, "");
        assert_eq!(events[1].timestamp, "10:05");
    }

    #[test]
    fn drops_malformed_tokens_and_preserves_order() {
        let events = parse_lifecycle("received*a*t1,garbage,pickedup*t2");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "received");
        assert_eq!(events[1].action, "pickedup");
    }

    #[test]
    fn extra_middle_fields_are_ignored() {
        let events = parse_lifecycle("deliveryEta*eta-value*extra*t9");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value, "eta-value");
        assert_eq!(events[0].timestamp, "t9");
    }

    #[test]
    fn never_panics_on_junk() {
        assert!(parse_lifecycle("").is_empty());
        assert!(parse_lifecycle(",,,").is_empty());
        assert!(parse_lifecycle("***,*").len() <= 2);
    }

    #[test]
    fn lookup_is_case_insensitive_and_first_match_wins() {
        let events = parse_lifecycle("a*1*t1,a*2*t2");
        let hit = event_for(&events, " A ").expect("event");
        assert_eq!(hit.value, "1");
    }

    #[test]
    fn fields_are_trimmed() {
        let events = parse_lifecycle(" allocated * Dan Smith * 10:15 ");
        assert_eq!(events[0].action, "allocated");
        assert_eq!(events[0].value, "Dan Smith");
        assert_eq!(events[0].timestamp, "10:15");
    }
}
