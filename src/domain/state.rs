use super::OrderStatus;

impl OrderStatus {
    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            // Terminal states never move
            (Confirmed | Failed, _) => false,

            // Forward path
            (Pending, Routing) => true,
            (Routing, Building) => true,
            (Building, Submitted) => true,
            (Submitted, Confirmed) => true,

            // Retry re-entry restarts from routing
            (Routing | Building | Submitted, Routing) => true,

            // Bookkeeping on the current state (retry count, error message)
            (from, to) if *from == to => true,

            // Any live state may fail
            (_, Failed) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_forward_path() {
        assert!(Pending.can_transition_to(Routing));
        assert!(Routing.can_transition_to(Building));
        assert!(Building.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Confirmed));
        assert!(Submitted.can_transition_to(Failed));
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        assert!(!Pending.can_transition_to(Building));
        assert!(!Pending.can_transition_to(Confirmed));
        assert!(!Routing.can_transition_to(Submitted));
        assert!(!Building.can_transition_to(Confirmed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for target in [Pending, Routing, Building, Submitted, Confirmed, Failed] {
            assert!(!Confirmed.can_transition_to(target));
            assert!(!Failed.can_transition_to(target));
        }
    }

    #[test]
    fn test_retry_reentry() {
        assert!(Submitted.can_transition_to(Routing));
        assert!(Building.can_transition_to(Routing));
        assert!(Submitted.can_transition_to(Submitted));
    }
}
