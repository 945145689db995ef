//! Routing keys and topic matching.

/// Routing keys of the lifecycle events exchanged between services.
pub mod keys {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_PAID: &str = "order.paid";
    pub const ORDER_DELIVERED: &str = "order.delivered";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const PAYMENT_SUCCESS: &str = "payment.success";
    pub const PAYMENT_FAILED: &str = "payment.failed";
    pub const WALLET_COMMISSION_CREATED: &str = "wallet.commission.created";
    pub const WALLET_COMMISSION_UNLOCKED: &str = "wallet.commission.unlocked";
}

/// Returns the envelope event name for a routing key.
///
/// `order.delivered` becomes `ORDER_DELIVERED`.
pub fn event_name(routing_key: &str) -> String {
    routing_key
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Returns true if `routing_key` matches the topic `pattern`.
///
/// Words are separated by `.`; `*` matches exactly one word and `#`
/// matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&k, key_rest)) if word == "*" || word == k => match_words(rest, key_rest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_is_screaming_snake_case() {
        assert_eq!(event_name(keys::ORDER_DELIVERED), "ORDER_DELIVERED");
        assert_eq!(
            event_name(keys::WALLET_COMMISSION_UNLOCKED),
            "WALLET_COMMISSION_UNLOCKED"
        );
    }

    #[test]
    fn exact_keys_match() {
        assert!(topic_matches("order.created", "order.created"));
        assert!(!topic_matches("order.created", "order.paid"));
        assert!(!topic_matches("order.created", "order.created.v2"));
    }

    #[test]
    fn star_matches_exactly_one_word() {
        assert!(topic_matches("order.*", "order.delivered"));
        assert!(!topic_matches("order.*", "order"));
        assert!(!topic_matches("wallet.*", "wallet.commission.created"));
    }

    #[test]
    fn hash_matches_zero_or_more_words() {
        assert!(topic_matches("wallet.#", "wallet.commission.created"));
        assert!(topic_matches("wallet.#", "wallet"));
        assert!(topic_matches("#", "payment.success"));
        assert!(topic_matches("#.unlocked", "wallet.commission.unlocked"));
        assert!(!topic_matches("payment.#", "order.paid"));
    }
}
