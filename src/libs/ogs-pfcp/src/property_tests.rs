//! Property-based tests for the rule lifecycle

use proptest::prelude::*;

use crate::rule::{Far, Pdr, RuleState};
use crate::session::SessionRequest;
use crate::types::{ApplyAction, Pdi, SourceInterface};

#[derive(Debug, Clone, Copy)]
enum RuleEvent {
    ChangeFar,
    TouchPdr,
    Confirm,
    Remove,
}

fn rule_event() -> impl Strategy<Value = RuleEvent> {
    prop_oneof![
        Just(RuleEvent::ChangeFar),
        Just(RuleEvent::TouchPdr),
        Just(RuleEvent::Confirm),
        Just(RuleEvent::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A fully synced PDR can never be placed into a request, and a PDR
    /// that needs sync always contributes at least one IE to a modification
    #[test]
    fn prop_request_content_follows_tags(events in prop::collection::vec(rule_event(), 0..20)) {
        let mut pdr = Pdr::new(1, 255, Pdi::new(SourceInterface::Core), Far::new(1, ApplyAction::forward()));
        let mut alive = true;

        for event in events {
            if !alive {
                break;
            }
            match event {
                RuleEvent::ChangeFar => pdr.far.set_apply_action(ApplyAction::buffer()),
                RuleEvent::TouchPdr => pdr.touch(),
                RuleEvent::Confirm => alive = pdr.confirm(),
                RuleEvent::Remove => pdr.mark_remove(),
            }
        }

        if alive {
            let mut req = SessionRequest::modification(std::net::Ipv4Addr::LOCALHOST, 1, 2);
            let result = req.add_pdr(&pdr);
            if pdr.is_synced() {
                prop_assert!(result.is_err());
                prop_assert!(req.is_empty());
            } else {
                prop_assert!(result.is_ok());
                prop_assert!(!req.is_empty());
            }
        }
    }

    /// Once removed, a rule never returns to a live tag before being dropped
    #[test]
    fn prop_remove_is_sticky(changes in 0usize..5) {
        let mut pdr = Pdr::new(1, 255, Pdi::new(SourceInterface::Access), Far::new(1, ApplyAction::forward()));
        pdr.confirm();
        pdr.mark_remove();
        for _ in 0..changes {
            pdr.touch();
            pdr.far.set_apply_action(ApplyAction::forward());
        }
        prop_assert_eq!(pdr.state, RuleState::Remove);
        prop_assert_eq!(pdr.far.state, RuleState::Remove);
        prop_assert!(!pdr.confirm());
    }
}
