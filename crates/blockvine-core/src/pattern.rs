//! Event pattern matching for subscriber registration.
//!
//! Patterns take the form `"ContractName:EventName"`; `*` is a wildcard for
//! either segment. A log from an address not pinned to any configured
//! contract has no contract name and only ever matches a wildcard or empty
//! contract segment.

/// Returns `true` if `(contract_name, event_name)` matches `pattern`.
///
/// The contract segment matches if it is `*`, empty, or equals the contract
/// name; the event segment matches if it is `*` or equals the event name
/// exactly (case-sensitive). Both segments must match.
pub fn matches_event_pattern(
    contract_name: Option<&str>,
    event_name: &str,
    pattern: &str,
) -> bool {
    let (contract_pattern, event_pattern) = match pattern.split_once(':') {
        Some(parts) => parts,
        None => return false,
    };

    let contract_matches = contract_pattern == "*"
        || contract_pattern.is_empty()
        || contract_name.is_some_and(|name| contract_pattern == name);

    let event_matches = event_pattern == "*" || event_pattern == event_name;

    contract_matches && event_matches
}

#[cfg(test)]
mod tests {
    use super::matches_event_pattern;

    #[test]
    fn exact_match() {
        assert!(matches_event_pattern(Some("Uniswap"), "Trade", "Uniswap:Trade"));
    }

    #[test]
    fn wrong_contract_rejected() {
        assert!(!matches_event_pattern(Some("Sushi"), "Trade", "Uniswap:Trade"));
    }

    #[test]
    fn wildcard_contract() {
        assert!(matches_event_pattern(Some("Uniswap"), "Transfer", "*:Transfer"));
        assert!(matches_event_pattern(None, "Transfer", "*:Transfer"));
    }

    #[test]
    fn wildcard_event() {
        assert!(matches_event_pattern(Some("Uniswap"), "Trade", "Uniswap:*"));
        assert!(!matches_event_pattern(Some("Sushi"), "Trade", "Uniswap:*"));
    }

    #[test]
    fn full_wildcard() {
        assert!(matches_event_pattern(Some("Any"), "Event", "*:*"));
        assert!(matches_event_pattern(None, "Event", "*:*"));
    }

    #[test]
    fn anonymous_contract_never_matches_concrete_name() {
        assert!(!matches_event_pattern(None, "Transfer", "Contract:Transfer"));
    }

    #[test]
    fn empty_contract_segment_matches_anonymous() {
        assert!(matches_event_pattern(None, "Transfer", ":Transfer"));
        assert!(matches_event_pattern(Some("Token"), "Transfer", ":Transfer"));
    }

    #[test]
    fn event_name_is_case_sensitive() {
        assert!(!matches_event_pattern(Some("Token"), "transfer", "Token:Transfer"));
    }

    #[test]
    fn pattern_without_separator_rejected() {
        assert!(!matches_event_pattern(Some("Token"), "Transfer", "Transfer"));
    }
}
