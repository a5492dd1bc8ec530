use proptest::prelude::*;
use wabroker_core::events::BrokerEventType;

/// Strategy for generating event ids with optional surrounding whitespace
pub fn padded_id_strategy() -> impl Strategy<Value = (String, String)> {
    ("[a-zA-Z0-9_-]{1,32}", " {0,3}", " {0,3}")
        .prop_map(|(core, lead, trail)| (format!("{lead}{core}{trail}"), core))
}

/// Strategy for generating whitespace-only ids
pub fn blank_id_strategy() -> impl Strategy<Value = String> {
    "[ \t\n]{0,6}"
}

pub fn event_type_strategy() -> impl Strategy<Value = BrokerEventType> {
    prop::sample::select(BrokerEventType::ALL.to_vec())
}

/// A known type spelled with random letter casing
pub fn mixed_case_type_strategy() -> impl Strategy<Value = (String, BrokerEventType)> {
    (event_type_strategy(), prop::collection::vec(any::<bool>(), 32)).prop_map(
        |(event_type, flips)| {
            let spelled = event_type
                .as_str()
                .chars()
                .zip(flips.into_iter().cycle())
                .map(|(c, lower)| if lower { c.to_ascii_lowercase() } else { c })
                .collect();
            (spelled, event_type)
        },
    )
}

/// Type names that match none of the known types
pub fn unknown_type_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z_]{1,24}".prop_filter("must not name a known type", |s| {
        s.parse::<BrokerEventType>().is_err()
    })
}

/// Spellings the has-more and boolean coercion treat as true
pub fn truthy_token_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["true", "TRUE", "True", "1", "yes", "Yes", "y", "More", "pending"])
        .prop_map(str::to_string)
}
