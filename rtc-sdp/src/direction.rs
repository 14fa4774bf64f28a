use std::fmt;

/// Direction is a marker for transmission direction of an endpoint
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    #[default]
    Unspecified = 0,
    /// Direction::SendRecv is for bidirectional communication
    SendRecv = 1,
    /// Direction::SendOnly is for outgoing communication
    SendOnly = 2,
    /// Direction::RecvOnly is for incoming communication
    RecvOnly = 3,
    /// Direction::Inactive is for no communication
    Inactive = 4,
}

const DIRECTION_SEND_RECV_STR: &str = "sendrecv";
const DIRECTION_SEND_ONLY_STR: &str = "sendonly";
const DIRECTION_RECV_ONLY_STR: &str = "recvonly";
const DIRECTION_INACTIVE_STR: &str = "inactive";
const DIRECTION_UNSPECIFIED_STR: &str = "Unspecified";

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::SendRecv => DIRECTION_SEND_RECV_STR,
            Direction::SendOnly => DIRECTION_SEND_ONLY_STR,
            Direction::RecvOnly => DIRECTION_RECV_ONLY_STR,
            Direction::Inactive => DIRECTION_INACTIVE_STR,
            _ => DIRECTION_UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl Direction {
    /// new defines a procedure for creating a new direction from a raw string.
    pub fn new(raw: &str) -> Self {
        match raw {
            DIRECTION_SEND_RECV_STR => Direction::SendRecv,
            DIRECTION_SEND_ONLY_STR => Direction::SendOnly,
            DIRECTION_RECV_ONLY_STR => Direction::RecvOnly,
            DIRECTION_INACTIVE_STR => Direction::Inactive,
            _ => Direction::Unspecified,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_direction() {
        let passingtests = vec![
            ("sendrecv", Direction::SendRecv),
            ("sendonly", Direction::SendOnly),
            ("recvonly", Direction::RecvOnly),
            ("inactive", Direction::Inactive),
        ];

        let failingtests = vec!["", "notadirection"];

        for (i, (raw, expected)) in passingtests.into_iter().enumerate() {
            let dir = Direction::new(raw);
            assert_eq!(dir, expected, "{i}: {raw}");
        }
        for (i, raw) in failingtests.into_iter().enumerate() {
            let dir = Direction::new(raw);
            assert_eq!(dir, Direction::Unspecified, "{i}: {raw}");
        }
    }

    #[test]
    fn test_direction_string() {
        let tests = vec![
            (Direction::Unspecified, DIRECTION_UNSPECIFIED_STR),
            (Direction::SendRecv, "sendrecv"),
            (Direction::SendOnly, "sendonly"),
            (Direction::RecvOnly, "recvonly"),
            (Direction::Inactive, "inactive"),
        ];

        for (i, (d, expected_string)) in tests.into_iter().enumerate() {
            assert_eq!(d.to_string(), expected_string, "testCase: {i}: {d}")
        }
    }
}
