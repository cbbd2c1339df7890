use chrono::Duration;
use room_types::RoomStatus;

/// The closed set of lifecycle edges. Everything not listed here is
/// rejected before any row is touched.
pub fn is_valid_transition(from: RoomStatus, to: RoomStatus) -> bool {
    use RoomStatus::*;
    matches!(
        (from, to),
        (Waiting, Active)
            | (Waiting, Expired)
            | (Active, Waiting)
            | (Active, Completed)
            | (Active, Expired)
            | (Completed, Expired)
    )
}

/// Thresholds driving the scheduled sweeps.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    /// Wall-clock age after which a WAITING/ACTIVE room is expired.
    pub max_age: Duration,
    /// Inactivity window after which a room is expired regardless of age.
    pub max_inactivity: Duration,
    /// How long an EXPIRED room is retained before hard deletion.
    pub retention: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::days(7),
            max_inactivity: Duration::hours(24),
            retention: Duration::days(30),
        }
    }
}

impl CleanupPolicy {
    pub fn new(max_age: Duration, max_inactivity: Duration, retention: Duration) -> Self {
        Self {
            max_age,
            max_inactivity,
            retention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RoomStatus::*;

    const ALL: [RoomStatus; 4] = [Waiting, Active, Completed, Expired];

    #[test]
    fn allowed_edges_match_table_exactly() {
        let allowed = [
            (Waiting, Active),
            (Waiting, Expired),
            (Active, Waiting),
            (Active, Completed),
            (Active, Expired),
            (Completed, Expired),
        ];

        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    is_valid_transition(from, to),
                    expected,
                    "transition {:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn expired_is_terminal() {
        for to in ALL {
            assert!(!is_valid_transition(Expired, to));
        }
    }

    #[test]
    fn default_policy_thresholds() {
        let policy = CleanupPolicy::default();
        assert_eq!(policy.max_age, Duration::days(7));
        assert_eq!(policy.retention, Duration::days(30));
    }
}
