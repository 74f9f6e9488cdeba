//! Spot-request status vocabulary.
//!
//! The cloud reports request state as opaque strings. They partition
//! into fixed sets; membership checks are exact, and a code outside
//! every set is inert (neither pending nor running).

pub const PENDING_STATUS_CODES: [&str; 4] = [
    "pending-evaluation",
    "pending-fulfillment",
    "az-group-constraint",
    "price-too-low",
];

pub const RUNNING_STATUS_CODES: [&str; 2] =
    ["fulfilled", "request-canceled-and-instance-running"];

pub const TERMINATED_STATUS_CODES: [&str; 4] = [
    "capacity-oversubscribed",
    "capacity-not-available",
    "instance-terminated-capacity-oversubscribed",
    "bad-parameters",
];

pub const RETRY_STATUS_CODES: [&str; 4] = [
    "instance-terminated-by-price",
    "bad-parameters",
    "canceled-before-fulfillment",
    "instance-terminated-by-user",
];

pub fn is_pending(code: &str) -> bool {
    PENDING_STATUS_CODES.contains(&code)
}

pub fn is_running(code: &str) -> bool {
    RUNNING_STATUS_CODES.contains(&code)
}

/// Active requests occupy budget: anything running or still pending.
pub fn is_active(code: &str) -> bool {
    is_pending(code) || is_running(code)
}
